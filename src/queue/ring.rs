//! Bounded power-of-two ring buffer of envelopes.
//!
//! Publishers claim a free slot (a semaphore permit) before writing, so a full
//! ring makes `publish` wait and `try_publish` fail; nothing is overwritten.
//! A single consumer drains slots in sequence order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{Notify, Semaphore, TryAcquireError};

use crate::queue::envelope::Envelope;
use crate::queue::QueueError;

#[derive(Default)]
struct Slot {
    envelope: Envelope,
    filled: bool,
}

pub struct RingBuffer {
    slots: Box<[Mutex<Slot>]>,
    mask: u64,
    /// One permit per free slot.
    free: Semaphore,
    next_write: AtomicU64,
    /// Consumer cursor; only the consumer side takes this lock.
    next_read: Mutex<u64>,
    readable: Notify,
    closed: AtomicBool,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if !capacity.is_power_of_two() {
            return Err(QueueError::InvalidCapacity(capacity));
        }

        let slots = (0..capacity)
            .map(|_| Mutex::new(Slot::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            slots,
            mask: capacity as u64 - 1,
            free: Semaphore::new(capacity),
            next_write: AtomicU64::new(0),
            next_read: Mutex::new(0),
            readable: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Publish, waiting for a free slot when the ring is full.
    pub async fn publish(&self, mut envelope: Envelope) -> Result<(), QueueError> {
        let permit = self.free.acquire().await.map_err(|_| QueueError::Closed)?;
        permit.forget();
        self.write(&mut envelope);
        Ok(())
    }

    /// Publish without waiting.
    pub fn try_publish(&self, mut envelope: Envelope) -> Result<(), QueueError> {
        match self.free.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(TryAcquireError::NoPermits) => return Err(QueueError::Full),
            Err(TryAcquireError::Closed) => return Err(QueueError::Closed),
        }
        self.write(&mut envelope);
        Ok(())
    }

    fn write(&self, envelope: &mut Envelope) {
        let sequence = self.next_write.fetch_add(1, Ordering::AcqRel);
        let mut slot = self.slot(sequence);
        debug_assert!(!slot.filled, "publisher overran an unconsumed slot");
        slot.envelope.become_from(envelope);
        slot.filled = true;
        drop(slot);
        self.readable.notify_one();
    }

    /// Take the next envelope if it has been written.
    pub fn try_next(&self) -> Option<Envelope> {
        let mut next_read = self.next_read.lock().expect("ring cursor mutex poisoned");
        let mut slot = self.slot(*next_read);
        if !slot.filled {
            return None;
        }
        let envelope = slot.envelope.take();
        slot.filled = false;
        drop(slot);

        *next_read += 1;
        self.free.add_permits(1);
        Some(envelope)
    }

    /// Wait for the next envelope. `None` once the ring is closed.
    ///
    /// Envelopes still in the ring at close are left for [`drain`](Self::drain).
    pub async fn next(&self) -> Option<Envelope> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(envelope) = self.try_next() {
                return Some(envelope);
            }
            self.readable.notified().await;
        }
    }

    /// Stop accepting publishes and wake the consumer. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.free.close();
            self.readable.notify_one();
        }
    }

    /// Remove every envelope still in the ring.
    pub fn drain(&self) -> Vec<Envelope> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots claimed by publishers and not yet consumed.
    pub fn len(&self) -> usize {
        self.capacity() - self.free.available_permits()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, sequence: u64) -> MutexGuard<'_, Slot> {
        self.slots[(sequence & self.mask) as usize]
            .lock()
            .expect("ring slot mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::envelope::Event;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_capacity_must_be_power_of_two() {
        assert!(matches!(RingBuffer::new(6), Err(QueueError::InvalidCapacity(6))));
        assert_eq!(RingBuffer::new(8).unwrap().capacity(), 8);
    }

    #[test]
    fn test_try_publish_full_then_free() {
        let ring = RingBuffer::new(2).unwrap();
        ring.try_publish(Envelope::new(Event::Noop)).unwrap();
        ring.try_publish(Envelope::new(Event::Noop)).unwrap();
        assert!(matches!(ring.try_publish(Envelope::new(Event::Noop)), Err(QueueError::Full)));
        assert_eq!(ring.len(), 2);

        assert!(ring.try_next().is_some());
        ring.try_publish(Envelope::new(Event::Noop)).unwrap();
        assert_eq!(ring.drain().len(), 2);
        assert!(ring.is_empty());
    }

    #[tokio::test]
    async fn test_publisher_blocks_until_slot_frees() {
        let ring = Arc::new(RingBuffer::new(4).unwrap());
        for _ in 0..4 {
            ring.publish(Envelope::new(Event::Noop)).await.unwrap();
        }

        let blocked = {
            let ring = Arc::clone(&ring);
            tokio::spawn(async move { ring.publish(Envelope::new(Event::Noop)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        assert!(ring.next().await.is_some());
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("publisher still blocked after a slot was freed")
            .unwrap()
            .unwrap();
        assert_eq!(ring.len(), 4);
    }

    #[tokio::test]
    async fn test_close_wakes_consumer_and_rejects_publishers() {
        let ring = Arc::new(RingBuffer::new(2).unwrap());
        let consumer = {
            let ring = Arc::clone(&ring);
            tokio::spawn(async move { ring.next().await.is_none() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        ring.close();
        assert!(consumer.await.unwrap());
        assert!(matches!(
            ring.publish(Envelope::new(Event::Noop)).await,
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_sequence_order_preserved() {
        let ring = RingBuffer::new(8).unwrap();
        let kinds = [Event::Noop, Event::Noop, Event::Noop];
        for event in kinds {
            ring.publish(Envelope::new(event)).await.unwrap();
        }
        let mut stamps = Vec::new();
        while let Some(envelope) = ring.try_next() {
            stamps.push(envelope.published_at().unwrap());
        }
        assert_eq!(stamps.len(), 3);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }
}
