use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use empennage::avec::packet::{Alarm, FrameError, Kind, Packet, Text};
use empennage::avec::{Clock, Decoder, Port, SlicePort};
use empennage::sans::check::compute_crc;
use empennage::sans::cipher::descramble;

const TEXT: u8 = 0;
const DATA: u8 = 1;
const MESSAGE: u8 = 2;

const SERIAL: u32 = 0x0042_AA55;

#[derive(Clone, Default)]
struct TestClock(Rc<Cell<u64>>);

impl TestClock {
    fn advance(&self, millis: u64) {
        self.0.set(self.0.get() + millis);
    }
}

impl Clock for TestClock {
    fn now(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Clone, Default)]
struct QueuePort(Rc<RefCell<VecDeque<u8>>>);

impl QueuePort {
    fn push(&self, bytes: &[u8]) {
        self.0.borrow_mut().extend(bytes.iter().copied());
    }
}

impl Port for QueuePort {
    fn read(&mut self) -> Option<u16> {
        self.0.borrow_mut().pop_front().map(u16::from)
    }
}

/// Assemble an EX frame: start and identifier bytes, combined length and
/// kind byte, payload, and the trailing check byte.
fn ex_frame(kind: u8, payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() + 1) as u8;
    let head = length | kind << 6;

    let mut bytes = vec![0x7E, 0x9F, head];
    bytes.extend_from_slice(payload);
    bytes.push(compute_crc(compute_crc(0, &[head]), payload));
    bytes
}

fn name_payload(serial_id: u32, name: &str) -> Vec<u8> {
    let mut payload = serial_id.to_le_bytes().to_vec();
    payload.push(0); // key
    payload.push(0); // names use the zero identifier
    payload.push((name.len() as u8) << 3);
    payload.extend_from_slice(name.as_bytes());
    payload
}

fn label_payload(serial_id: u32, id: u8, label: &str, unit: &[u8]) -> Vec<u8> {
    let mut payload = serial_id.to_le_bytes().to_vec();
    payload.push(0);
    payload.push(id);
    payload.push((label.len() as u8) << 3 | unit.len() as u8);
    payload.extend_from_slice(label.as_bytes());
    payload.extend_from_slice(unit);
    payload
}

fn values_payload(serial_id: u32, records: &[u8]) -> Vec<u8> {
    let mut payload = serial_id.to_le_bytes().to_vec();
    payload.push(0);
    payload.extend_from_slice(records);
    payload
}

/// Feed a capture byte-by-byte, collecting every packet.
fn run(capture: &[u8]) -> (Vec<Packet>, Decoder<SlicePort<'_>, TestClock>) {
    let mut decoder = Decoder::new(SlicePort::new(capture), TestClock::default());

    let mut packets = Vec::new();
    for _ in 0..capture.len() * 2 + 8 {
        if let Some(packet) = decoder.poll() {
            packets.push(packet);
        }
    }

    (packets, decoder)
}

#[test]
fn resolves_values_against_streamed_metadata() {
    let mut capture = Vec::new();
    capture.extend(ex_frame(TEXT, &name_payload(SERIAL, "MVario")));
    capture.extend(ex_frame(TEXT, &label_payload(SERIAL, 1, "Altitude", b"m")));
    capture.extend(ex_frame(DATA, &values_payload(SERIAL, &[0x11, 0x05, 0x00])));

    let (packets, _) = run(&capture);
    assert_eq!(packets.len(), 3);

    let Packet::Name(name) = &packets[0] else {
        panic!("expected a name packet, got {:?}", packets[0]);
    };
    assert_eq!(name.serial_id, SERIAL);
    assert_eq!(name.name.as_deref(), Some("MVario"));

    let Packet::Label(label) = &packets[1] else {
        panic!("expected a label packet, got {:?}", packets[1]);
    };
    assert_eq!(label.serial_id, SERIAL);
    assert_eq!(label.id, 1);
    assert_eq!(label.label.as_deref(), Some("Altitude"));
    assert_eq!(label.unit.as_deref(), Some("m"));

    let Packet::Value(value) = &packets[2] else {
        panic!("expected a value packet, got {:?}", packets[2]);
    };
    assert_eq!(value.serial_id, SERIAL);
    assert_eq!(value.id, 1);
    assert_eq!(value.kind, Kind::Bits14);
    assert_eq!(value.value, 5);

    let reference = value.label.as_ref().unwrap();
    assert_eq!(reference.label.as_deref(), Some("Altitude"));
    assert_eq!(reference.unit.as_deref(), Some("m"));
    assert_eq!(reference.sensor.as_deref(), Some("MVario"));
    assert!(value.is_complete());
}

#[test]
fn values_before_metadata_stay_unresolved() {
    let capture = ex_frame(DATA, &values_payload(SERIAL, &[0x11, 0x05, 0x00]));

    let (packets, _) = run(&capture);
    assert_eq!(packets.len(), 1);

    let Packet::Value(value) = &packets[0] else {
        panic!("expected a value packet, got {:?}", packets[0]);
    };
    assert!(value.label.is_none());
    assert!(!value.is_complete());
}

#[test]
fn descrambles_keyed_frames() {
    let key = 0x2B;

    let mut payload = values_payload(SERIAL, &[0x11, 0x05, 0x00]);
    payload[4] = key;

    // The transform is an involution, so applying it to the plain payload
    // yields the scrambled form a sensor would transmit. The check byte
    // covers the scrambled bytes.
    let mut buffer = [0u8; 32];
    buffer[..payload.len()].copy_from_slice(&payload);
    descramble(key, &mut buffer, payload.len() + 1);

    let capture = ex_frame(DATA, &buffer[..payload.len()]);

    let (packets, _) = run(&capture);
    assert_eq!(packets.len(), 1);

    let Packet::Value(value) = &packets[0] else {
        panic!("expected a value packet, got {:?}", packets[0]);
    };
    assert_eq!(value.serial_id, SERIAL);
    assert_eq!(value.id, 1);
    assert_eq!(value.value, 5);
}

#[test]
fn decodes_alarms_amid_line_noise() {
    let (packets, _) = run(&[0x00, 0x55, 0x13, 0x7E, 0x02, 0x01, 0x42]);

    assert_eq!(
        packets,
        vec![Packet::Alarm(Alarm {
            sound: true,
            code: 0x42
        })]
    );
}

#[test]
fn decodes_silent_alarms() {
    let (packets, _) = run(&[0x7E, 0x42, 0x00, 0x07]);

    assert_eq!(
        packets,
        vec![Packet::Alarm(Alarm {
            sound: false,
            code: 0x07
        })]
    );
}

#[test]
fn decodes_plain_text_messages() {
    let mut capture = vec![0xFE];
    capture.extend_from_slice(b"Hello");
    capture.push(0xFF);

    let (packets, _) = run(&capture);

    assert_eq!(
        packets,
        vec![Packet::Text(Text {
            content: String::from("Hello")
        })]
    );
}

#[test]
fn overlong_plain_text_is_rejected() {
    let mut capture = vec![0xFE];
    capture.extend_from_slice(&[b'x'; 40]);

    let (packets, _) = run(&capture);

    assert_eq!(packets, vec![Packet::Error(FrameError::TextOverflow)]);
}

#[test]
fn unrecognized_identifiers_recover() {
    let mut capture = vec![0x7E, 0x10];
    capture.extend(ex_frame(TEXT, &name_payload(SERIAL, "MVario")));

    let (packets, _) = run(&capture);

    assert_eq!(packets.len(), 2);
    assert_eq!(
        packets[0],
        Packet::Error(FrameError::UnrecognizedPacket(0x10))
    );
    assert!(matches!(&packets[1], Packet::Name(name) if name.name.as_deref() == Some("MVario")));
}

#[test]
fn undersized_lengths_are_rejected() {
    let (packets, _) = run(&[0x7E, 0x0F, 0x05]);

    assert_eq!(packets, vec![Packet::Error(FrameError::InvalidLength(5))]);
}

#[test]
fn corrupt_frames_resync_on_the_next_start_byte() {
    let mut corrupt = ex_frame(DATA, &values_payload(SERIAL, &[0x11, 0x05, 0x00]));
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;

    let mut capture = corrupt;
    capture.extend(ex_frame(TEXT, &name_payload(SERIAL, "MVario")));

    let (packets, _) = run(&capture);

    assert_eq!(packets.len(), 2);
    assert!(matches!(
        packets[0],
        Packet::Error(FrameError::CyclicRedundancyCheck { .. })
    ));
    assert!(matches!(&packets[1], Packet::Name(name) if name.name.as_deref() == Some("MVario")));
}

#[test]
fn repeated_names_echo_the_stored_entry() {
    let mut capture = Vec::new();
    capture.extend(ex_frame(TEXT, &name_payload(SERIAL, "First")));
    capture.extend(ex_frame(TEXT, &name_payload(SERIAL, "Second")));

    let (packets, decoder) = run(&capture);

    assert_eq!(packets.len(), 2);
    for packet in &packets {
        assert!(matches!(packet, Packet::Name(name) if name.name.as_deref() == Some("First")));
    }

    assert_eq!(decoder.registry().sensors().count(), 1);
}

#[test]
fn repeated_labels_echo_the_stored_entry() {
    let mut capture = Vec::new();
    capture.extend(ex_frame(TEXT, &label_payload(SERIAL, 1, "Altitude", b"m")));
    capture.extend(ex_frame(TEXT, &label_payload(SERIAL, 1, "Renamed", b"x")));

    let (packets, decoder) = run(&capture);

    assert_eq!(packets.len(), 2);
    for packet in &packets {
        assert!(
            matches!(packet, Packet::Label(label) if label.label.as_deref() == Some("Altitude"))
        );
    }

    let sensor = decoder.registry().find_sensor(SERIAL).unwrap();
    assert_eq!(sensor.labels().count(), 1);
}

#[test]
fn labels_ahead_of_names_create_a_placeholder() {
    let mut capture = Vec::new();
    capture.extend(ex_frame(TEXT, &label_payload(SERIAL, 1, "Altitude", b"m")));
    capture.extend(ex_frame(TEXT, &name_payload(SERIAL, "MVario")));

    let (packets, decoder) = run(&capture);

    assert_eq!(packets.len(), 2);
    assert!(matches!(&packets[0], Packet::Label(_)));
    assert!(matches!(&packets[1], Packet::Name(name) if name.name.as_deref() == Some("MVario")));

    let sensor = decoder.registry().find_sensor(SERIAL).unwrap();
    assert_eq!(sensor.name(), Some("MVario"));
    assert_eq!(sensor.labels().count(), 1);
}

#[test]
fn degree_units_surface_as_unicode() {
    let capture = ex_frame(TEXT, &label_payload(SERIAL, 2, "Temp", b"\xB0C"));

    let (packets, _) = run(&capture);

    assert!(matches!(&packets[0], Packet::Label(label) if label.unit.as_deref() == Some("°C")));
}

#[test]
fn complete_value_supplies_metadata_out_of_band() {
    let capture = ex_frame(DATA, &values_payload(SERIAL, &[0x11, 0x05, 0x00]));
    let (packets, mut decoder) = run(&capture);

    let Packet::Value(value) = &packets[0] else {
        panic!("expected a value packet, got {:?}", packets[0]);
    };
    assert!(value.label.is_none());

    assert!(
        decoder
            .registry_mut()
            .complete_value(value, "MVario", "Altitude", "m")
    );
    // A second completion for the same serial and id is a no-op.
    assert!(
        !decoder
            .registry_mut()
            .complete_value(value, "Other", "Other", "x")
    );

    let label = decoder.registry().find_label(SERIAL, 1).unwrap();
    assert_eq!(label.label(), Some("Altitude"));
    assert_eq!(label.unit(), Some("m"));

    let sensor = decoder.registry().find_sensor(SERIAL).unwrap();
    assert_eq!(sensor.name(), Some("MVario"));
}

#[test]
fn data_kind_emits_its_first_value_immediately() {
    let capture = ex_frame(DATA, &values_payload(SERIAL, &[0x11, 0x05, 0x00]));
    let mut decoder = Decoder::new(SlicePort::new(&capture), TestClock::default());

    for _ in 0..capture.len() - 1 {
        assert_eq!(decoder.poll(), None);
    }
    assert!(matches!(decoder.poll(), Some(Packet::Value(_))));
    assert_eq!(decoder.poll(), None);
}

#[test]
fn message_kind_defers_its_first_value() {
    let capture = ex_frame(MESSAGE, &values_payload(SERIAL, &[0x11, 0x05, 0x00]));
    let mut decoder = Decoder::new(SlicePort::new(&capture), TestClock::default());

    for _ in 0..capture.len() {
        assert_eq!(decoder.poll(), None);
    }
    assert!(matches!(decoder.poll(), Some(Packet::Value(_))));
    assert_eq!(decoder.poll(), None);
}

#[test]
fn buffered_values_drain_one_per_poll() {
    let capture = ex_frame(DATA, &values_payload(SERIAL, &[0x20, 0x07, 0x11, 0x05, 0x00]));
    let mut decoder = Decoder::new(SlicePort::new(&capture), TestClock::default());

    for _ in 0..capture.len() - 1 {
        assert_eq!(decoder.poll(), None);
    }

    let Some(Packet::Value(first)) = decoder.poll() else {
        panic!("expected the first value with the final frame byte");
    };
    assert_eq!(first.id, 2);
    assert_eq!(first.value, 7);

    let Some(Packet::Value(second)) = decoder.poll() else {
        panic!("expected the second value on the following poll");
    };
    assert_eq!(second.id, 1);
    assert_eq!(second.value, 5);

    assert_eq!(decoder.poll(), None);
}

#[test]
fn stalled_sources_resynchronize_silently() {
    let port = QueuePort::default();
    let clock = TestClock::default();
    let mut decoder = Decoder::new(port.clone(), clock.clone());

    let frame = ex_frame(DATA, &values_payload(SERIAL, &[0x11, 0x05, 0x00]));

    port.push(&frame[..4]);
    for _ in 0..4 {
        assert_eq!(decoder.poll(), None);
    }

    clock.advance(1500);
    assert_eq!(decoder.poll(), None);

    port.push(&frame);
    let mut packets = Vec::new();
    for _ in 0..frame.len() + 2 {
        if let Some(packet) = decoder.poll() {
            packets.push(packet);
        }
    }

    assert!(matches!(packets.as_slice(), [Packet::Value(_)]));
}

#[test]
fn reset_discards_a_partial_frame() {
    let port = QueuePort::default();
    let mut decoder = Decoder::new(port.clone(), TestClock::default());

    let frame = ex_frame(DATA, &values_payload(SERIAL, &[0x11, 0x05, 0x00]));

    port.push(&frame[..6]);
    for _ in 0..6 {
        assert_eq!(decoder.poll(), None);
    }

    decoder.reset();

    port.push(&frame);
    let mut packets = Vec::new();
    for _ in 0..frame.len() + 2 {
        if let Some(packet) = decoder.poll() {
            packets.push(packet);
        }
    }

    assert!(matches!(packets.as_slice(), [Packet::Value(_)]));
}
