//! Ordered per-session event queue.
//!
//! One queue per session, one consumer (the engine), any number of
//! producers. Producers only ever enqueue; all state mutation happens
//! on the consumer side. The queue assigns the global sequence number
//! at enqueue time, which defines the happens-before order for the
//! whole session.
//!
//! ```text
//! VAD ──┐
//! STT ──┤
//! LLM ──┼── EventSender::enqueue ──► [seq n, n+1, …] ──► EventQueue::recv
//! TTS ──┤        (never blocks)                            (engine, single
//! Tool ─┤                                                   consumer)
//! Timer ┘
//! ```
//!
//! Synthetic events emitted during transition processing go through a
//! cloned [`EventSender`], so they land at the tail of the same queue
//! and obey the same ordering and replay guarantees as external events.

use crate::{Event, EventError};
use confab_types::SequenceNumber;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default queue depth above which enqueues are warn-logged.
pub const DEFAULT_WARN_DEPTH: usize = 1024;

/// Producer handle for a session's event queue.
///
/// Cloneable and cheap; `enqueue` is fire-and-forget and never blocks.
/// The handle stamps the sequence number and enqueue timestamp, making
/// the event immutable from that point on.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
    counter: Arc<AtomicU64>,
    depth: Arc<AtomicUsize>,
    warn_depth: usize,
}

impl EventSender {
    /// Enqueues an event, stamping its sequence number.
    ///
    /// A zero timestamp is stamped with the current wall clock; a
    /// nonzero one is preserved, so events replayed from trace logs
    /// keep their recorded times.
    ///
    /// Returns the assigned sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::QueueClosed`] if the consumer has shut
    /// down.
    pub fn enqueue(&self, mut event: Event) -> Result<SequenceNumber, EventError> {
        let seq = SequenceNumber(self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        event.seq = seq;
        if event.timestamp_ms == 0 {
            event.timestamp_ms = chrono::Utc::now().timestamp_millis() as u64;
        }

        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        if depth > self.warn_depth {
            warn!(depth, warn_depth = self.warn_depth, "event queue depth above threshold");
        }

        self.tx.send(event).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            EventError::QueueClosed
        })?;

        debug!(%seq, "event enqueued");
        Ok(seq)
    }

    /// Returns the number of events enqueued but not yet consumed.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Returns the last assigned sequence number.
    #[must_use]
    pub fn last_seq(&self) -> SequenceNumber {
        SequenceNumber(self.counter.load(Ordering::SeqCst))
    }
}

/// Consumer side of a session's event queue.
///
/// Held exclusively by the session engine.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<Event>,
    depth: Arc<AtomicUsize>,
}

impl EventQueue {
    /// Creates a queue and its producer handle.
    #[must_use]
    pub fn new() -> (Self, EventSender) {
        Self::with_warn_depth(DEFAULT_WARN_DEPTH)
    }

    /// Creates a queue with a custom warn threshold.
    #[must_use]
    pub fn with_warn_depth(warn_depth: usize) -> (Self, EventSender) {
        Self::resume_from(SequenceNumber::ZERO, warn_depth)
    }

    /// Creates a queue whose sequence numbering continues after
    /// `last`.
    ///
    /// Used when resuming a session from a checkpoint: new events must
    /// sort after every event the checkpoint already covers.
    #[must_use]
    pub fn resume_from(last: SequenceNumber, warn_depth: usize) -> (Self, EventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let sender = EventSender {
            tx,
            counter: Arc::new(AtomicU64::new(last.value())),
            depth: Arc::clone(&depth),
            warn_depth,
        };
        (Self { rx, depth }, sender)
    }

    /// Receives the next event in sequence order.
    ///
    /// Returns `None` when every sender has been dropped and the queue
    /// is drained — the session's shutdown condition, not an error.
    pub async fn recv(&mut self) -> Option<Event> {
        let event = self.rx.recv().await;
        if event.is_some() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        event
    }

    /// Receives without waiting; `None` if the queue is momentarily
    /// empty.
    pub fn try_recv(&mut self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(event) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Some(event)
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventKind;
    use confab_types::{EventSource, TraceId};

    fn event(kind: EventKind) -> Event {
        Event::new(kind, EventSource::Operator, TraceId::new())
    }

    #[tokio::test]
    async fn sequence_numbers_are_monotonic() {
        let (mut queue, sender) = EventQueue::new();

        let s1 = sender.enqueue(event(EventKind::CallStart)).unwrap();
        let s2 = sender.enqueue(event(EventKind::TtsComplete)).unwrap();
        let s3 = sender.enqueue(event(EventKind::CallEnd)).unwrap();

        assert!(s1 < s2 && s2 < s3);
        assert_eq!(queue.recv().await.unwrap().seq, s1);
        assert_eq!(queue.recv().await.unwrap().seq, s2);
        assert_eq!(queue.recv().await.unwrap().seq, s3);
    }

    #[tokio::test]
    async fn recv_preserves_enqueue_order() {
        let (mut queue, sender) = EventQueue::new();

        for burst_id in 0..10 {
            sender
                .enqueue(event(EventKind::SpeechStarted { burst_id }))
                .unwrap();
        }

        for expected in 0..10 {
            match queue.recv().await.unwrap().kind {
                EventKind::SpeechStarted { burst_id } => assert_eq!(burst_id, expected),
                other => panic!("unexpected kind: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn concurrent_producers_get_unique_sequences() {
        let (mut queue, sender) = EventQueue::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sender = sender.clone();
            handles.push(tokio::spawn(async move {
                let mut seqs = Vec::new();
                for _ in 0..50 {
                    seqs.push(sender.enqueue(event(EventKind::TtsComplete)).unwrap());
                }
                seqs
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 400, "sequence numbers must be unique");

        // Consumer sees strictly ascending sequence numbers.
        let mut last = SequenceNumber::ZERO;
        while let Some(e) = queue.try_recv() {
            assert!(e.seq > last);
            last = e.seq;
        }
        assert_eq!(last.value(), 400);
    }

    #[tokio::test]
    async fn depth_tracks_outstanding_events() {
        let (mut queue, sender) = EventQueue::new();
        assert_eq!(sender.depth(), 0);

        sender.enqueue(event(EventKind::CallStart)).unwrap();
        sender.enqueue(event(EventKind::CallEnd)).unwrap();
        assert_eq!(sender.depth(), 2);

        queue.recv().await.unwrap();
        assert_eq!(sender.depth(), 1);
        queue.recv().await.unwrap();
        assert_eq!(sender.depth(), 0);
    }

    #[tokio::test]
    async fn enqueue_after_consumer_drop_is_closed() {
        let (queue, sender) = EventQueue::new();
        drop(queue);

        let err = sender.enqueue(event(EventKind::CallStart)).unwrap_err();
        assert!(matches!(err, EventError::QueueClosed));
    }

    #[tokio::test]
    async fn recv_returns_none_when_senders_gone() {
        let (mut queue, sender) = EventQueue::new();
        sender.enqueue(event(EventKind::CallEnd)).unwrap();
        drop(sender);

        assert!(queue.recv().await.is_some());
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn enqueue_stamps_unset_timestamp() {
        let (mut queue, sender) = EventQueue::new();
        sender.enqueue(event(EventKind::CallStart)).unwrap();
        let received = queue.recv().await.unwrap();
        assert!(received.timestamp_ms > 0);
    }

    #[tokio::test]
    async fn enqueue_preserves_replayed_timestamp() {
        let (mut queue, sender) = EventQueue::new();
        let mut replayed = event(EventKind::CallStart);
        replayed.timestamp_ms = 12_345;
        sender.enqueue(replayed).unwrap();

        let received = queue.recv().await.unwrap();
        assert_eq!(received.timestamp_ms, 12_345);
    }

    #[tokio::test]
    async fn resume_continues_sequence_numbering() {
        let (mut queue, sender) = EventQueue::resume_from(SequenceNumber(41), 64);
        let seq = sender.enqueue(event(EventKind::CallStart)).unwrap();
        assert_eq!(seq.value(), 42);
        assert_eq!(queue.recv().await.unwrap().seq.value(), 42);
    }
}
