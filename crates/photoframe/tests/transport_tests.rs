//! Device-level tests of the picture frame transport over the mock backend

use common::Diagnostic;
use common::test_utils::RecordingSink;
use photoframe::usb::PhotoFrame;
use photoframe::usb::mock::{MockBackend, MockCall};
use protocol::{
    BLOCK_SIZE, DeviceMode, FrameHeader, MODE_SWITCH, PRODUCT_ID_CUSTOM, PRODUCT_ID_STORAGE,
};
use std::sync::Arc;
use std::time::Duration;

fn frame_with(backend: &MockBackend) -> (PhotoFrame<MockBackend>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let frame = PhotoFrame::new(backend.clone(), sink.clone(), Duration::from_secs(1));
    (frame, sink)
}

fn is_switch(call: &MockCall) -> bool {
    matches!(call, MockCall::Control { request, .. } if *request == MODE_SWITCH)
}

#[test]
fn test_storage_mode_switched_once() {
    let backend = MockBackend::new();
    backend.attach(PRODUCT_ID_STORAGE, 1, 4);
    let (mut frame, sink) = frame_with(&backend);

    assert_eq!(frame.check_devices(), DeviceMode::CustomMode);
    assert_eq!(backend.count(is_switch), 1);
    assert!(backend.calls().contains(&MockCall::Control {
        request: MODE_SWITCH,
        len: 254
    }));
    assert!(sink.contains(&Diagnostic::ModeSwitched));

    // Second scan without a detach changes nothing
    assert_eq!(frame.check_devices(), DeviceMode::CustomMode);
    assert_eq!(backend.count(is_switch), 1);
    assert!(sink.contains(&Diagnostic::AlreadyOpen {
        mode: DeviceMode::CustomMode
    }));
}

#[test]
fn test_custom_mode_preferred_over_storage() {
    let backend = MockBackend::new();
    backend.attach(PRODUCT_ID_STORAGE, 1, 4);
    backend.attach(PRODUCT_ID_CUSTOM, 1, 5);
    let (mut frame, _sink) = frame_with(&backend);

    assert_eq!(frame.check_devices(), DeviceMode::CustomMode);
    assert_eq!(backend.count(is_switch), 0);
    assert_eq!(
        backend.calls(),
        vec![MockCall::Open {
            product_id: PRODUCT_ID_CUSTOM
        }]
    );
}

#[test]
fn test_display_writes_padded_frame() {
    let backend = MockBackend::new();
    backend.attach(PRODUCT_ID_CUSTOM, 1, 5);
    let (mut frame, sink) = frame_with(&backend);
    frame.check_devices();

    let image = vec![0xabu8; 100_000];
    assert!(frame.display(&image));

    let written = backend.last_frame().unwrap();
    assert_eq!(written.len(), 7 * BLOCK_SIZE);
    assert_eq!(&written[4..8], &[0xa0, 0x86, 0x01, 0x00]);
    assert_eq!(FrameHeader::parse(&written).unwrap().payload_len, 100_000);
    assert_eq!(&written[12..100_012], image.as_slice());
    assert!(written[100_012..].iter().all(|&b| b == 0));
    assert_eq!(
        sink.count(|e| matches!(e, Diagnostic::FrameSent { frame_len: 114_688, .. })),
        1
    );
}

#[test]
fn test_interface_released_after_bulk_error() {
    let backend = MockBackend::new();
    backend.attach(PRODUCT_ID_CUSTOM, 1, 5);
    let (mut frame, sink) = frame_with(&backend);
    frame.check_devices();
    backend.clear_calls();

    backend.set_bulk_error(Some(rusb::Error::Timeout));
    assert!(!frame.display(b"jpeg"));

    assert_eq!(
        backend.calls(),
        vec![
            MockCall::Claim { interface: 0 },
            MockCall::Bulk {
                endpoint: 0x02,
                len: BLOCK_SIZE
            },
            MockCall::Release { interface: 0 },
        ]
    );
    assert_eq!(
        sink.count(|e| matches!(e, Diagnostic::TransferFailed { .. })),
        1
    );
    // A timeout is not a detach
    assert!(frame.is_available());

    backend.set_bulk_error(None);
    assert!(frame.display(b"jpeg"));
}

#[test]
fn test_interface_released_when_transfer_panics() {
    let backend = MockBackend::new();
    backend.attach(PRODUCT_ID_CUSTOM, 1, 5);
    let (mut frame, _sink) = frame_with(&backend);
    frame.check_devices();
    backend.clear_calls();

    backend.set_panic_on_bulk(true);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| frame.display(b"jpeg")));
    assert!(result.is_err());

    assert_eq!(
        backend.count(|c| matches!(c, MockCall::Release { interface: 0 })),
        1
    );
}

#[test]
fn test_hotplug_detach_and_reattach() {
    let backend = MockBackend::new();
    let (mut frame, sink) = frame_with(&backend);
    assert!(frame.register_hotplug_callbacks());

    backend.attach(PRODUCT_ID_CUSTOM, 2, 9);
    assert_eq!(frame.process_hotplug_events(), 1);
    assert!(frame.is_available());

    backend.detach(PRODUCT_ID_CUSTOM);
    assert_eq!(frame.process_hotplug_events(), 1);
    assert!(!frame.is_available());
    assert_eq!(frame.mode(), DeviceMode::None);
    assert!(sink.contains(&Diagnostic::DeviceDetached {
        mode: DeviceMode::CustomMode
    }));

    // Replugged frame comes back in storage mode and is switched again
    backend.attach(PRODUCT_ID_STORAGE, 2, 10);
    frame.process_hotplug_events();
    assert!(frame.is_available());
    assert_eq!(backend.count(is_switch), 1);
}

#[test]
fn test_reenumeration_after_switch() {
    let backend = MockBackend::new();
    backend.set_reenumerate_on_switch(true);
    backend.attach(PRODUCT_ID_STORAGE, 3, 1);
    let (mut frame, _sink) = frame_with(&backend);
    assert!(frame.register_hotplug_callbacks());

    assert_eq!(frame.check_devices(), DeviceMode::CustomMode);
    // Storage device left, custom device arrived
    assert_eq!(frame.process_hotplug_events(), 2);

    assert!(frame.is_available());
    assert_eq!(backend.count(is_switch), 1);
    assert_eq!(
        backend.count(|c| matches!(
            c,
            MockCall::Open {
                product_id: PRODUCT_ID_CUSTOM
            }
        )),
        1
    );

    assert!(frame.display(b"jpeg"));
}

#[test]
fn test_unrelated_detach_keeps_handle() {
    let backend = MockBackend::new();
    backend.attach(PRODUCT_ID_CUSTOM, 1, 5);
    backend.attach(PRODUCT_ID_STORAGE, 1, 6);
    let (mut frame, _sink) = frame_with(&backend);
    assert!(frame.register_hotplug_callbacks());
    frame.check_devices();

    backend.detach(PRODUCT_ID_STORAGE);
    frame.process_hotplug_events();

    assert!(frame.is_available());
}

#[test]
fn test_no_device_transfer_is_detach() {
    let backend = MockBackend::new();
    backend.set_hotplug_supported(false);
    backend.attach(PRODUCT_ID_CUSTOM, 1, 5);
    let (mut frame, sink) = frame_with(&backend);
    assert!(!frame.register_hotplug_callbacks());
    frame.check_devices();

    backend.detach(PRODUCT_ID_CUSTOM);
    assert!(!frame.display(b"jpeg"));

    assert_eq!(frame.mode(), DeviceMode::None);
    assert!(sink.contains(&Diagnostic::HotplugUnavailable));
    assert!(sink.contains(&Diagnostic::DeviceDetached {
        mode: DeviceMode::CustomMode
    }));
}
