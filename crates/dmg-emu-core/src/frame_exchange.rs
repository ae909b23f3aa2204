use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::ppu::FRAME_BYTES;

/// Set in `latest` when the slot it names has not been taken yet.
const FRESH: u8 = 0x04;
const INDEX_MASK: u8 = 0x03;

/// Triple buffer handing finished frames from the emulator thread to a
/// display thread without locks.
///
/// Each side owns one slot outright; the third is parked in `latest`. The
/// producer never waits and the consumer always sees a whole frame, the most
/// recent one published.
struct Inner {
    slots: [UnsafeCell<Box<[u8]>>; 3],
    latest: AtomicU8,
}

// Safe because:
// - The producer only touches the slot in its `back` index.
// - The consumer only touches the slot in its `front` index.
// - Ownership of the parked slot changes hands through `latest` with
//   acquire/release ordering.
unsafe impl Sync for Inner {}

pub struct FrameProducer {
    inner: Arc<Inner>,
    back: u8,
}

pub struct FrameConsumer {
    inner: Arc<Inner>,
    front: u8,
}

pub fn frame_exchange() -> (FrameProducer, FrameConsumer) {
    let slot = || UnsafeCell::new(vec![0xFF; FRAME_BYTES].into_boxed_slice());
    let inner = Arc::new(Inner {
        slots: [slot(), slot(), slot()],
        latest: AtomicU8::new(1),
    });
    (
        FrameProducer {
            inner: Arc::clone(&inner),
            back: 0,
        },
        FrameConsumer { inner, front: 2 },
    )
}

impl FrameProducer {
    /// Copy `frame` into the back slot and make it the latest frame.
    pub fn publish(&mut self, frame: &[u8]) {
        // SAFETY: `back` is owned by this producer until it is swapped out.
        let slot = unsafe { &mut *self.inner.slots[self.back as usize].get() };
        let n = frame.len().min(slot.len());
        slot[..n].copy_from_slice(&frame[..n]);

        let prev = self.inner.latest.swap(self.back | FRESH, Ordering::AcqRel);
        self.back = prev & INDEX_MASK;
    }
}

impl FrameConsumer {
    /// The newest frame published since the last call, if any.
    pub fn take(&mut self) -> Option<&[u8]> {
        if self.inner.latest.load(Ordering::Acquire) & FRESH == 0 {
            return None;
        }
        let prev = self.inner.latest.swap(self.front, Ordering::AcqRel);
        self.front = prev & INDEX_MASK;
        // SAFETY: `front` now belongs to this consumer alone.
        Some(unsafe { &*self.inner.slots[self.front as usize].get() })
    }

    pub fn has_new_frame(&self) -> bool {
        self.inner.latest.load(Ordering::Acquire) & FRESH != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(fill: u8) -> Vec<u8> {
        vec![fill; FRAME_BYTES]
    }

    #[test]
    fn nothing_to_take_before_publish() {
        let (_producer, mut consumer) = frame_exchange();
        assert!(!consumer.has_new_frame());
        assert!(consumer.take().is_none());
    }

    #[test]
    fn consumer_sees_only_newest_frame() {
        let (mut producer, mut consumer) = frame_exchange();
        producer.publish(&frame(1));
        producer.publish(&frame(2));
        producer.publish(&frame(3));

        let taken = consumer.take().map(<[u8]>::to_vec);
        assert_eq!(taken, Some(frame(3)));
        assert!(consumer.take().is_none());

        producer.publish(&frame(4));
        assert_eq!(consumer.take().map(|f| f[0]), Some(4));
    }

    #[test]
    fn frames_cross_threads_whole() {
        let (mut producer, mut consumer) = frame_exchange();
        let writer = std::thread::spawn(move || {
            for i in 1..=200u8 {
                producer.publish(&frame(i));
            }
        });

        let mut last = 0u8;
        while !writer.is_finished() || consumer.has_new_frame() {
            if let Some(f) = consumer.take() {
                assert!(f.iter().all(|&b| b == f[0]), "torn frame");
                assert!(f[0] > last);
                last = f[0];
            }
        }
        writer.join().unwrap();
        assert_eq!(last, 200);
    }
}
