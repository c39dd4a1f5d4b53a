//! Cross-thread tests for the stdin ring and the blocking reader

use assert_matches::assert_matches;
use runbox_common::{BufferLayout, LayoutError, SharedRegion};
use runbox_sandbox::{
    Consumer, InputFeeder, KeyInput, Producer, RingBuffer, StdinError, StdinReader,
};
use runbox_tests::common::setup_test_logging;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn pair(capacity: u32) -> (Producer, Consumer) {
    let ring = RingBuffer::allocate(capacity).unwrap();
    let consumer = Consumer::attach(ring.region().clone(), ring.layout()).unwrap();
    (Producer::new(ring), consumer)
}

#[test]
fn test_spsc_preserves_order_through_wraparound() {
    setup_test_logging();
    let (mut producer, mut consumer) = pair(8);
    let text: String = (0..5_000)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut stdin = StdinReader::new(&mut consumer);
            (0..5_000)
                .map(|_| stdin.read_char().unwrap())
                .collect::<String>()
        });

        for c in text.chars() {
            while producer.write_char(c).is_err() {
                thread::yield_now();
            }
        }

        assert_eq!(reader.join().unwrap(), text);
    });
}

#[test]
fn test_interrupt_wakes_reader_even_when_ring_is_full() {
    setup_test_logging();
    let (mut producer, mut consumer) = pair(4);
    for c in "abc".chars() {
        producer.write_char(c).unwrap();
    }
    assert!(producer.ring().is_full());

    // Sentinel cannot be queued, the flag alone must stop the reader.
    assert!(!producer.interrupt());
    let mut stdin = StdinReader::new(&mut consumer);
    assert_eq!(stdin.read_char(), Err(StdinError::Interrupted));
}

#[test]
fn test_feeder_interrupt_unblocks_parked_reader() {
    setup_test_logging();
    let (producer, mut consumer) = pair(16);
    let mut feeder = InputFeeder::new(producer);
    let (done_tx, done_rx) = mpsc::channel();

    thread::scope(|scope| {
        scope.spawn(|| {
            let mut stdin = StdinReader::new(&mut consumer);
            let mut lines = 0;
            let result = loop {
                match stdin.read_line() {
                    Ok(_) => lines += 1,
                    Err(e) => break e,
                }
            };
            done_tx.send((lines, result)).unwrap();
        });

        for key in [KeyInput::Char('1'), KeyInput::Enter, KeyInput::Char('2'), KeyInput::Enter] {
            feeder.on_key(key).unwrap();
        }
        thread::sleep(Duration::from_millis(100));
        feeder.on_key(KeyInput::Interrupt).unwrap();

        let (lines, result) = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("reader still blocked after interrupt");
        assert_eq!(lines, 2);
        assert_eq!(result, StdinError::Interrupted);
    });
}

#[test]
fn test_attach_rejects_layout_that_does_not_fit_region() {
    let region = SharedRegion::new(8);
    let layout = BufferLayout::standard(256);
    assert_matches!(
        Consumer::attach(region, layout),
        Err(LayoutError::OutOfBounds { .. })
    );
}

#[test]
fn test_attach_rejects_overlapping_control_words() {
    let mut layout = BufferLayout::standard(8);
    layout.tail_index = layout.head_index;
    let region = SharedRegion::new(layout.region_len() as usize);
    assert_matches!(
        Consumer::attach(region, layout),
        Err(LayoutError::OverlappingControl { .. })
    );
}
