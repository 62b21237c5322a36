use canbits::{
    bits_from_ascii, stuff, Bit, CanFrame, Control, CrcField, Event, ExtendedId, Field, Frame,
    FrameSink, Mode, Node, Recovery, StandardId, Violation,
};
use heapless::Vec;

// id 0x123, data 01 02, stuffed, SOF through CRC sequence
const STANDARD: &[u8] = b"000100100011000001100000100010000010101101001111101110";
// id 0x555, dlc 1, data 00: SOF, id, RTR/IDE/r0 and two DLC bits, stuff bit,
// two more DLC bits, five dominant data bits
const DOMINANT_RUN: &[u8] = b"010101010101 00000 1 01 00000";

#[derive(Default)]
struct Log {
    frames: Vec<Frame, 8>,
    violations: Vec<(Violation, Field), 8>,
    transitions: usize,
    wire: Vec<Bit, 512>,
}

impl FrameSink for Log {
    fn frame(&mut self, frame: &Frame, _raw: &[Bit]) {
        self.frames.push(frame.clone()).unwrap();
    }

    fn event(&mut self, event: Event) {
        match event {
            Event::Violation {
                violation, field, ..
            } => self.violations.push((violation, field)).unwrap(),
            Event::Transition { .. } => self.transitions += 1,
            _ => {}
        }
    }

    fn transmitted(&mut self, bit: Bit) {
        self.wire.push(bit).unwrap();
    }
}

fn feed(node: &mut Node, ascii: &[u8], log: &mut Log) {
    let bits: Vec<Bit, 256> = bits_from_ascii(ascii).unwrap();

    for bit in bits {
        node.advance(bit, log);
    }
}

#[test]
fn malformed_crc_delimiter() {
    let mut node = Node::default();
    let mut log = Log::default();

    feed(&mut node, STANDARD, &mut log);
    feed(&mut node, b"0", &mut log);

    assert_eq!(
        log.violations.as_slice(),
        &[(
            Violation::Framing {
                field: Field::Crc(CrcField::Delimiter)
            },
            Field::Crc(CrcField::Delimiter)
        )]
    );
    assert_eq!(node.mode(), Mode::Normal(Field::Error(Recovery::Flag)));

    // Error flag, error delimiter
    feed(&mut node, b"000000 11111111", &mut log);
    assert_eq!(node.field(), Field::INTERMISSION);

    feed(&mut node, b"111", &mut log);
    assert_eq!(node.field(), Field::BUS_IDLE);
    assert!(log.frames.is_empty());

    // The next well-formed frame goes through
    feed(&mut node, STANDARD, &mut log);
    feed(&mut node, b"1 0 1 1111111", &mut log);
    assert_eq!(log.frames.len(), 1);
    assert_eq!(log.violations.len(), 1);
}

#[test]
fn overload_limit() {
    let mut node = Node::default();
    let mut log = Log::default();

    feed(&mut node, STANDARD, &mut log);
    feed(&mut node, b"1 0 1 1111111", &mut log);

    for _ in 0..2 {
        feed(&mut node, b"0", &mut log);
        assert_eq!(node.field(), Field::Overload(Recovery::Flag));

        feed(&mut node, b"00000 11111111", &mut log);
        assert_eq!(node.field(), Field::INTERMISSION);
    }
    assert!(log.violations.is_empty());

    feed(&mut node, b"0", &mut log);
    assert_eq!(
        log.violations.as_slice(),
        &[(Violation::OverloadLimit, Field::INTERMISSION)]
    );
    assert_eq!(node.field(), Field::Error(Recovery::Flag));
}

#[test]
fn stuffing_violation() {
    let mut node = Node::default();
    let mut log = Log::default();

    feed(&mut node, DOMINANT_RUN, &mut log);
    assert!(node.mode().is_stuffing());
    assert_eq!(node.field(), Field::Data);

    feed(&mut node, b"0", &mut log);
    assert_eq!(
        log.violations.as_slice(),
        &[(Violation::Stuffing, Field::Data)]
    );

    feed(&mut node, b"000000 11111111 111", &mut log);
    assert_eq!(node.field(), Field::BUS_IDLE);
    assert!(log.frames.is_empty());
    assert_eq!(node.frame(), &Frame::default());
}

#[test]
fn stuffing_violation_reports_field_of_the_run() {
    let mut node = Node::default();
    let mut log = Log::default();

    // id 0x558, dlc 0: the second run of five dominant bits ends on the last
    // DLC bit, so the stuff bit is due right before the CRC sequence
    feed(&mut node, b"0 10101011000 00 1 0 0000", &mut log);
    assert_eq!(
        node.mode(),
        Mode::Stuffing {
            saved: Field::Crc(CrcField::Sequence)
        }
    );

    feed(&mut node, b"0", &mut log);
    assert_eq!(
        log.violations.as_slice(),
        &[(
            Violation::Stuffing,
            Field::Control(Control::DataLengthCode)
        )]
    );
    assert_eq!(node.field(), Field::Error(Recovery::Flag));
}

#[test]
fn two_nodes_on_one_wire() {
    let frames = [
        Frame::new(StandardId::new(0x123).unwrap(), &[0x01, 0x02]).unwrap(),
        Frame::new(ExtendedId::new(0x1ABC_DE12).unwrap(), &[0xA5]).unwrap(),
        Frame::new(ExtendedId::MAX, &[0xFF; 8]).unwrap(),
        Frame::new_remote(StandardId::ZERO, 0).unwrap(),
        Frame::new(StandardId::ZERO, &[0x00; 8]).unwrap(),
    ];

    for frame in frames {
        let mut sender = Node::default();
        let mut receiver = Node::default();
        let mut sender_log = Log::default();
        let mut receiver_log = Log::default();

        sender.queue(frame.clone());

        while let Some(bit) = sender.transmit(&mut sender_log) {
            receiver.advance(bit, &mut receiver_log);
        }

        assert!(receiver_log.violations.is_empty());
        assert_eq!(receiver_log.frames.len(), 1);

        let received = &receiver_log.frames[0];
        assert_eq!(received.id(), frame.id());
        assert_eq!(received.is_remote_frame(), frame.is_remote_frame());
        assert_eq!(received.dlc(), frame.dlc());
        assert_eq!(received.data(), frame.data());
        assert_eq!(received.srr(), frame.srr());
        assert_eq!(received.r1(), frame.r1());

        // The wire carries the frame's own serialisation, stuffed, followed
        // by the fixed-form trailer
        let stuffed: Vec<Bit, 256> = stuff(&frame.unstuffed_bits().unwrap()).unwrap();
        let trailer: Vec<Bit, 16> = bits_from_ascii(b"1 0 1 1111111").unwrap();
        assert_eq!(&sender_log.wire[..stuffed.len()], stuffed.as_slice());
        assert_eq!(&sender_log.wire[stuffed.len()..], trailer.as_slice());

        assert!(receiver_log.transitions > 0);
    }
}
