//! Integration tests for the halremote-core wire layer.
//!
//! These tests drive the codec, the update-channel topic framing, and the
//! serial tracker together the way the two endpoints use them: an authority
//! encodes status messages and wraps them in publication frames, a
//! subscriber unwraps and decodes them, applies them to a value table, and
//! watches the serial stream for losses.

use std::collections::HashMap;

use halremote_core::protocol::framing::{
    decode_publication, decode_subscription, encode_publication, encode_subscription,
    SubscriptionAction,
};
use halremote_core::protocol::messages::{HalMessage, PinDelta, PinSnapshot};
use halremote_core::{
    decode_message, encode_message, PinHandle, PinValue, SerialCheck, SerialTracker,
};
use uuid::Uuid;

/// Builds the encoded publication frame an authority would send on `topic`.
fn publish(topic: &str, msg: &HalMessage, serial: u64) -> Vec<u8> {
    let bytes = encode_message(msg, serial, 0).expect("encode must succeed");
    encode_publication(topic, &bytes)
}

/// Unwraps a publication frame the way a subscriber does.
fn receive(frame: &[u8]) -> (String, HalMessage, u64) {
    let (topic, offset) = decode_publication(frame).expect("topic must decode");
    let (decoded, consumed) = decode_message(&frame[offset..]).expect("message must decode");
    assert_eq!(offset + consumed, frame.len(), "no trailing bytes allowed");
    (topic, decoded.message, decoded.serial)
}

fn snapshot(handle: PinHandle, name: &str, value: PinValue) -> PinSnapshot {
    PinSnapshot {
        handle,
        name: name.to_string(),
        pin_type: value.pin_type(),
        linked: false,
        value,
    }
}

fn delta(handle: PinHandle, value: PinValue) -> PinDelta {
    PinDelta {
        handle,
        linked: false,
        value,
    }
}

#[test]
fn test_snapshot_then_deltas_rebuild_authority_state() {
    // Authority-side truth after three mutations.
    let instance = Uuid::new_v4();
    let full = HalMessage::FullUpdate {
        instance,
        pins: vec![
            snapshot(1, "demo.speed", PinValue::S32(0)),
            snapshot(2, "demo.running", PinValue::Bit(false)),
        ],
    };
    let updates = vec![
        HalMessage::IncrementalUpdate {
            pins: vec![delta(1, PinValue::S32(100))],
        },
        HalMessage::IncrementalUpdate {
            pins: vec![delta(2, PinValue::Bit(true))],
        },
        HalMessage::IncrementalUpdate {
            pins: vec![delta(1, PinValue::S32(250))],
        },
    ];

    // Wire transfer: full at serial 0, deltas at 1..=3.
    let mut frames = vec![publish("demo", &full, 0)];
    for (i, update) in updates.iter().enumerate() {
        frames.push(publish("demo", update, (i + 1) as u64));
    }

    // Subscriber-side replay into a plain handle→value table.
    let mut mirror: HashMap<PinHandle, PinValue> = HashMap::new();
    let mut tracker = SerialTracker::new();

    for frame in &frames {
        let (topic, message, serial) = receive(frame);
        assert_eq!(topic, "demo");
        match message {
            HalMessage::FullUpdate { pins, .. } => {
                tracker.seed(serial);
                mirror = pins.into_iter().map(|p| (p.handle, p.value)).collect();
            }
            HalMessage::IncrementalUpdate { pins } => {
                assert_eq!(tracker.observe(serial), SerialCheck::Synced);
                for p in pins {
                    mirror.insert(p.handle, p.value);
                }
            }
            other => panic!("unexpected message on status channel: {other:?}"),
        }
    }

    assert_eq!(mirror[&1], PinValue::S32(250));
    assert_eq!(mirror[&2], PinValue::Bit(true));
}

#[test]
fn test_dropped_frame_is_detected_not_applied() {
    let full = HalMessage::FullUpdate {
        instance: Uuid::new_v4(),
        pins: vec![snapshot(1, "demo.speed", PinValue::S32(0))],
    };
    let first = HalMessage::IncrementalUpdate {
        pins: vec![delta(1, PinValue::S32(1))],
    };
    let third = HalMessage::IncrementalUpdate {
        pins: vec![delta(1, PinValue::S32(3))],
    };

    // Serial 2 is never delivered.
    let frames = vec![
        publish("demo", &full, 0),
        publish("demo", &first, 1),
        publish("demo", &third, 3),
    ];

    let mut tracker = SerialTracker::new();
    let mut applied = Vec::new();
    let mut gaps = Vec::new();

    for frame in &frames {
        let (_, message, serial) = receive(frame);
        match message {
            HalMessage::FullUpdate { .. } => tracker.seed(serial),
            HalMessage::IncrementalUpdate { pins } => match tracker.observe(serial) {
                SerialCheck::Synced => applied.extend(pins),
                SerialCheck::Gap { expected, got } => gaps.push((expected, got)),
            },
            other => panic!("unexpected message: {other:?}"),
        }
    }

    assert_eq!(applied.len(), 1, "only the in-sequence delta may be applied");
    assert_eq!(gaps, vec![(2, 3)], "the loss of serial 2 must be flagged");
}

#[test]
fn test_subscription_frames_round_trip_like_the_publisher_sees_them() {
    // A subscriber joins, then leaves; the publisher reads both frames off
    // the same buffer.
    let mut buf = encode_subscription(&SubscriptionAction::Subscribe("demo".to_string()));
    buf.extend(encode_subscription(&SubscriptionAction::Unsubscribe(
        "demo".to_string(),
    )));

    let (first, n) = decode_subscription(&buf).unwrap();
    let (second, m) = decode_subscription(&buf[n..]).unwrap();
    assert_eq!(first, SubscriptionAction::Subscribe("demo".to_string()));
    assert_eq!(second, SubscriptionAction::Unsubscribe("demo".to_string()));
    assert_eq!(n + m, buf.len());
}

#[test]
fn test_instance_uuid_survives_the_wire() {
    // Clients use the instance id on full updates to detect an authority
    // restart; it has to survive encoding intact.
    let instance = Uuid::new_v4();
    let msg = HalMessage::FullUpdate {
        instance,
        pins: vec![],
    };
    let (_, decoded, _) = {
        let frame = publish("demo", &msg, 0);
        receive(&frame)
    };
    match decoded {
        HalMessage::FullUpdate { instance: got, .. } => assert_eq!(got, instance),
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn test_value_types_survive_mixed_incremental_updates() {
    let msg = HalMessage::IncrementalUpdate {
        pins: vec![
            delta(1, PinValue::Bit(true)),
            delta(2, PinValue::Float(-2.5)),
            delta(3, PinValue::S32(i32::MIN)),
            delta(4, PinValue::U32(u32::MAX)),
        ],
    };
    let frame = publish("mixed", &msg, 9);
    let (topic, decoded, serial) = receive(&frame);
    assert_eq!(topic, "mixed");
    assert_eq!(serial, 9);
    assert_eq!(decoded, msg);
}
