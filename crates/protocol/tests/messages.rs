//! Serialization tests for bus messages
//!
//! Messages cross process boundaries as JSON; these tests pin the field
//! names and the destination spelling that front-ends depend on.

use protocol::{Message, MessageDestination, UsbError};

#[test]
fn test_message_json_shape() {
    let msg = Message::new(MessageDestination::Driver, 0x28bd, 0x091b, vec![1, 2, 3]);
    let value = serde_json::to_value(&msg).unwrap();

    assert_eq!(value["destination"], "driver");
    assert_eq!(value["vendor"], 0x28bd);
    assert_eq!(value["device"], 0x091b);
    assert_eq!(value["payload"], serde_json::json!([1, 2, 3]));
}

#[test]
fn test_message_from_gui_json() {
    let json = r#"{"destination":"gui","vendor":10429,"device":2331,"payload":[]}"#;
    let msg: Message = serde_json::from_str(json).unwrap();

    assert_eq!(msg.destination, MessageDestination::Gui);
    assert_eq!(msg.vendor, 0x28bd);
    assert_eq!(msg.device, 2331);
    assert!(msg.payload.is_empty());
}

#[test]
fn test_unknown_destination_rejected() {
    let json = r#"{"destination":"kernel","vendor":1,"device":2,"payload":[]}"#;
    assert!(serde_json::from_str::<Message>(json).is_err());
}

#[test]
fn test_usb_error_serializes() {
    let err = UsbError::Other {
        message: "stall".to_string(),
    };
    let json = serde_json::to_string(&err).unwrap();
    let back: UsbError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
}
