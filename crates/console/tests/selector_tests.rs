//! Integration tests for DeviceSelector
//!
//! Tests device discovery against mock USB hosts, including:
//! - VID:PID matching and enumeration order
//! - Serial number disambiguation and descriptor read fallback
//! - Interface and endpoint resolution failures
//! - Kernel driver detach and interface claim/release
//!
//! Run with: `cargo test -p usb-console --test selector_tests`

use common::Error;
use usb_console::test_utils::{DeviceCall, MockDevice, MockHost, bulk};
use usb_console::usb::{DeviceIdentity, DeviceSelector, InterfaceInfo, SerialStrategy};

fn default_identity() -> DeviceIdentity {
    DeviceIdentity::new(0x18d1, 0x501c, 0)
}

mod device_matching {
    use super::*;

    #[test]
    fn test_no_devices_is_device_not_found() {
        let selector = DeviceSelector::new(MockHost::new(vec![]));
        let err = selector.resolve(&default_identity()).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceNotFound {
                vendor_id: 0x18d1,
                product_id: 0x501c,
                serial: None
            }
        ));
    }

    #[test]
    fn test_other_vid_pid_is_device_not_found() {
        let host = MockHost::new(vec![
            MockDevice::console(0).with_ids(0x0483, 0x5740),
            MockDevice::console(0).with_ids(0x18d1, 0x5014),
        ]);
        let selector = DeviceSelector::new(host);
        assert!(matches!(
            selector.resolve(&default_identity()),
            Err(Error::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn test_enumeration_error_propagates() {
        let selector = DeviceSelector::new(MockHost::failing(rusb::Error::Access));
        assert!(matches!(
            selector.resolve(&default_identity()),
            Err(Error::Transport(rusb::Error::Access))
        ));
    }

    #[test]
    fn test_without_serial_first_device_wins() {
        let first = MockDevice::console(0).with_serial("FIRST");
        let second = MockDevice::console(0).with_serial("SECOND");
        let (first_calls, second_calls) = (first.calls(), second.calls());

        let selector = DeviceSelector::new(MockHost::new(vec![first, second]));
        selector.resolve(&default_identity()).unwrap();

        assert!(first_calls.contains(&DeviceCall::Claim(0)));
        assert!(second_calls.calls().is_empty());
        // No serial filter, no descriptor reads
        assert!(!first_calls.contains(&DeviceCall::ReadSerial(SerialStrategy::Language)));
    }

    #[test]
    fn test_default_device_scenario() {
        let device = MockDevice::console(0);
        let calls = device.calls();
        let selector = DeviceSelector::new(MockHost::new(vec![device]));

        let endpoints = selector.resolve(&default_identity()).unwrap();

        assert_eq!(endpoints.interface_number(), 0);
        assert_eq!(endpoints.read_address(), 0x81);
        assert_eq!(endpoints.write_address(), 0x01);
        assert_eq!(
            calls.calls(),
            vec![DeviceCall::SetConfiguration, DeviceCall::Claim(0)]
        );
    }
}

mod serial_selection {
    use super::*;

    #[test]
    fn test_selects_matching_serial() {
        let devices = vec![
            MockDevice::console(0).with_serial("AAAA"),
            MockDevice::console(0).with_serial("BBBB"),
            MockDevice::console(0).with_serial("CCCC"),
        ];
        let calls: Vec<_> = devices.iter().map(|d| d.calls()).collect();

        let selector = DeviceSelector::new(MockHost::new(devices));
        selector
            .resolve(&default_identity().with_serial("BBBB"))
            .unwrap();

        assert!(!calls[0].contains(&DeviceCall::Claim(0)));
        assert!(calls[1].contains(&DeviceCall::Claim(0)));
        // Enumeration stops at the first match
        assert!(calls[2].calls().is_empty());
    }

    #[test]
    fn test_no_matching_serial_is_device_not_found() {
        let host = MockHost::new(vec![
            MockDevice::console(0).with_serial("AAAA"),
            MockDevice::console(0),
        ]);
        let selector = DeviceSelector::new(host);

        let err = selector
            .resolve(&default_identity().with_serial("ZZZZ"))
            .unwrap_err();
        match err {
            Error::DeviceNotFound { serial, .. } => assert_eq!(serial.as_deref(), Some("ZZZZ")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_serial_match_is_exact() {
        let host = MockHost::new(vec![MockDevice::console(0).with_serial("ABCD1234")]);
        let selector = DeviceSelector::new(host);
        assert!(selector
            .resolve(&default_identity().with_serial("ABCD"))
            .is_err());
    }

    #[test]
    fn test_fallback_serial_read_is_used() {
        let device = MockDevice::console(0)
            .with_serial_results(Err(rusb::Error::Pipe), Ok(Some("ASCII".to_string())));
        let calls = device.calls();
        let selector = DeviceSelector::new(MockHost::new(vec![device]));

        selector
            .resolve(&default_identity().with_serial("ASCII"))
            .unwrap();

        let reads: Vec<_> = calls
            .calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::ReadSerial(_)))
            .collect();
        assert_eq!(
            reads,
            vec![
                DeviceCall::ReadSerial(SerialStrategy::Language),
                DeviceCall::ReadSerial(SerialStrategy::Ascii),
            ]
        );
    }

    #[test]
    fn test_unreadable_serial_is_skipped_not_fatal() {
        let broken = MockDevice::console(0)
            .with_serial_results(Err(rusb::Error::Io), Err(rusb::Error::Pipe));
        let good = MockDevice::console(0).with_serial("GOOD");
        let good_calls = good.calls();

        let selector = DeviceSelector::new(MockHost::new(vec![broken, good]));
        selector
            .resolve(&default_identity().with_serial("GOOD"))
            .unwrap();

        assert!(good_calls.contains(&DeviceCall::Claim(0)));
    }

    #[test]
    fn test_empty_serial_means_no_filter() {
        let host = MockHost::new(vec![MockDevice::console(0).with_serial("ANY")]);
        let selector = DeviceSelector::new(host);
        assert!(selector.resolve(&default_identity().with_serial("")).is_ok());
    }
}

mod interface_resolution {
    use super::*;

    #[test]
    fn test_missing_interface() {
        let host = MockHost::new(vec![MockDevice::console(0)]);
        let selector = DeviceSelector::new(host);

        let identity = DeviceIdentity::new(0x18d1, 0x501c, 3);
        assert!(matches!(
            selector.resolve(&identity),
            Err(Error::InterfaceNotFound { interface: 3 })
        ));
    }

    #[test]
    fn test_second_interface_uses_offset_endpoints() {
        let device = MockDevice::console(0).with_interface(InterfaceInfo {
            number: 2,
            endpoints: vec![bulk(0x83), bulk(0x03)],
        });
        let selector = DeviceSelector::new(MockHost::new(vec![device]));

        let endpoints = selector
            .resolve(&DeviceIdentity::new(0x18d1, 0x501c, 2))
            .unwrap();
        assert_eq!(endpoints.read_address(), 0x83);
        assert_eq!(endpoints.write_address(), 0x03);
    }

    #[test]
    fn test_missing_read_endpoint() {
        let device = MockDevice::console(0).with_endpoints(&[bulk(0x82), bulk(0x01)]);
        let calls = device.calls();
        let selector = DeviceSelector::new(MockHost::new(vec![device]));

        assert!(matches!(
            selector.resolve(&default_identity()),
            Err(Error::EndpointNotFound {
                interface: 0,
                address: 0x81
            })
        ));
        assert!(!calls.contains(&DeviceCall::Claim(0)));
    }

    #[test]
    fn test_missing_write_endpoint() {
        let device = MockDevice::console(0).with_endpoints(&[bulk(0x81), bulk(0x02)]);
        let selector = DeviceSelector::new(MockHost::new(vec![device]));

        assert!(matches!(
            selector.resolve(&default_identity()),
            Err(Error::EndpointNotFound {
                interface: 0,
                address: 0x01
            })
        ));
    }

    #[test]
    fn test_claim_error_propagates() {
        let device = MockDevice::console(0).with_claim_error(rusb::Error::Busy);
        let selector = DeviceSelector::new(MockHost::new(vec![device]));
        assert!(matches!(
            selector.resolve(&default_identity()),
            Err(Error::Transport(rusb::Error::Busy))
        ));
    }
}

mod kernel_driver {
    use super::*;

    #[test]
    fn test_active_driver_detached_before_claim() {
        let device = MockDevice::console(0).with_kernel_driver();
        let calls = device.calls();
        let selector = DeviceSelector::new(MockHost::new(vec![device]));

        let endpoints = selector.resolve(&default_identity()).unwrap();

        assert_eq!(
            calls.calls(),
            vec![
                DeviceCall::SetConfiguration,
                DeviceCall::DetachKernelDriver(0),
                DeviceCall::Claim(0),
            ]
        );

        // Releasing the endpoints releases the claim, nothing else
        drop(endpoints);
        assert_eq!(calls.calls().last(), Some(&DeviceCall::Release(0)));
    }

    #[test]
    fn test_missing_endpoint_leaves_kernel_driver_attached() {
        let device = MockDevice::console(0)
            .with_kernel_driver()
            .with_endpoints(&[bulk(0x01)]);
        let calls = device.calls();
        let selector =
            DeviceSelector::new(MockHost::new(vec![device])).reattach_kernel_driver(true);

        assert!(matches!(
            selector.resolve(&default_identity()),
            Err(Error::EndpointNotFound {
                interface: 0,
                address: 0x81
            })
        ));
        assert_eq!(calls.calls(), vec![DeviceCall::SetConfiguration]);
    }

    #[test]
    fn test_claim_failure_reattaches_when_enabled() {
        let device = MockDevice::console(0)
            .with_kernel_driver()
            .with_claim_error(rusb::Error::Busy);
        let calls = device.calls();
        let selector =
            DeviceSelector::new(MockHost::new(vec![device])).reattach_kernel_driver(true);

        assert!(matches!(
            selector.resolve(&default_identity()),
            Err(Error::Transport(rusb::Error::Busy))
        ));
        assert_eq!(
            calls.calls(),
            vec![
                DeviceCall::SetConfiguration,
                DeviceCall::DetachKernelDriver(0),
                DeviceCall::ReattachKernelDriver(0),
            ]
        );
    }

    #[test]
    fn test_claim_failure_keeps_driver_detached_by_default() {
        let device = MockDevice::console(0)
            .with_kernel_driver()
            .with_claim_error(rusb::Error::Busy);
        let calls = device.calls();
        let selector = DeviceSelector::new(MockHost::new(vec![device]));

        assert!(selector.resolve(&default_identity()).is_err());
        assert!(calls.contains(&DeviceCall::DetachKernelDriver(0)));
        assert!(!calls.contains(&DeviceCall::ReattachKernelDriver(0)));
    }

    #[test]
    fn test_release_without_reattach_by_default() {
        let device = MockDevice::console(0).with_kernel_driver();
        let calls = device.calls();
        let selector = DeviceSelector::new(MockHost::new(vec![device]));

        drop(selector.resolve(&default_identity()).unwrap());

        assert!(calls.contains(&DeviceCall::Release(0)));
        assert!(!calls.contains(&DeviceCall::ReattachKernelDriver(0)));
    }

    #[test]
    fn test_reattach_when_enabled() {
        let device = MockDevice::console(0).with_kernel_driver();
        let calls = device.calls();
        let selector =
            DeviceSelector::new(MockHost::new(vec![device])).reattach_kernel_driver(true);

        drop(selector.resolve(&default_identity()).unwrap());

        assert!(calls.contains(&DeviceCall::ReattachKernelDriver(0)));
    }

    #[test]
    fn test_no_reattach_when_nothing_was_detached() {
        let device = MockDevice::console(0);
        let calls = device.calls();
        let selector =
            DeviceSelector::new(MockHost::new(vec![device])).reattach_kernel_driver(true);

        drop(selector.resolve(&default_identity()).unwrap());

        assert!(calls.contains(&DeviceCall::Release(0)));
        assert!(!calls.contains(&DeviceCall::ReattachKernelDriver(0)));
    }
}
