//! Ack/nack handling for outstanding publishes.

use crate::{ConfirmListener, OutstandingSet};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// One confirm delivered by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmEvent {
    /// Sequence number the confirm refers to.
    pub sequence: u64,
    /// Covers every unresolved sequence number up to and including `sequence`.
    pub multiple: bool,
    /// Ack when true, nack when false.
    pub positive: bool,
}

impl ConfirmEvent {
    pub fn ack(sequence: u64, multiple: bool) -> Self {
        Self {
            sequence,
            multiple,
            positive: true,
        }
    }

    pub fn nack(sequence: u64, multiple: bool) -> Self {
        Self {
            sequence,
            multiple,
            positive: false,
        }
    }
}

/// Sink for nack diagnostics.
///
/// Called once per nack event, before the nacked entries are removed. For a
/// cumulative nack only the boundary descriptor is looked up; entries below it
/// may already be gone.
pub trait NackReporter<D>: Send + Sync {
    fn report_nack(&self, descriptor: Option<&D>, sequence: u64, multiple: bool);
}

/// Writes nacks to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNackReporter;

impl<D: fmt::Display> NackReporter<D> for LogNackReporter {
    fn report_nack(&self, descriptor: Option<&D>, sequence: u64, multiple: bool) {
        match descriptor {
            Some(body) => warn!(
                body = %body,
                sequence,
                multiple,
                "Message has been nack-ed"
            ),
            None => warn!(sequence, multiple, "Message has been nack-ed (body unknown)"),
        }
    }
}

/// A nack captured by [`CollectingNackReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NackedMessage<D> {
    pub sequence: u64,
    pub multiple: bool,
    pub descriptor: Option<D>,
}

/// Keeps nacked messages so the caller can re-publish them.
pub struct CollectingNackReporter<D> {
    nacked: Mutex<Vec<NackedMessage<D>>>,
}

impl<D> Default for CollectingNackReporter<D> {
    fn default() -> Self {
        Self {
            nacked: Mutex::new(Vec::new()),
        }
    }
}

impl<D> CollectingNackReporter<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything collected so far.
    pub fn take(&self) -> Vec<NackedMessage<D>> {
        std::mem::take(&mut *self.nacked.lock())
    }

    pub fn len(&self) -> usize {
        self.nacked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nacked.lock().is_empty()
    }
}

impl<D: Clone + Send> NackReporter<D> for CollectingNackReporter<D> {
    fn report_nack(&self, descriptor: Option<&D>, sequence: u64, multiple: bool) {
        self.nacked.lock().push(NackedMessage {
            sequence,
            multiple,
            descriptor: descriptor.cloned(),
        });
    }
}

/// Counters kept by [`ConfirmationHandler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfirmStats {
    /// Ack events received.
    pub acks: u64,
    /// Nack events received.
    pub nacks: u64,
    /// Outstanding entries removed by any event.
    pub resolved: u64,
}

/// Applies broker confirms to an [`OutstandingSet`].
pub struct ConfirmationHandler<D> {
    outstanding: Arc<OutstandingSet<D>>,
    reporter: Arc<dyn NackReporter<D>>,
    acks: AtomicU64,
    nacks: AtomicU64,
    resolved: AtomicU64,
}

impl<D: Clone> ConfirmationHandler<D> {
    pub fn new(outstanding: Arc<OutstandingSet<D>>, reporter: Arc<dyn NackReporter<D>>) -> Self {
        Self {
            outstanding,
            reporter,
            acks: AtomicU64::new(0),
            nacks: AtomicU64::new(0),
            resolved: AtomicU64::new(0),
        }
    }

    /// Apply one confirm.
    ///
    /// Nacks are reported first and then resolved through the same path as
    /// acks, so a nacked range never lingers in the set.
    pub fn on_event(&self, event: ConfirmEvent) {
        if event.positive {
            self.acks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.nacks.fetch_add(1, Ordering::Relaxed);
            let descriptor = self.outstanding.descriptor(event.sequence);
            self.reporter
                .report_nack(descriptor.as_ref(), event.sequence, event.multiple);
        }

        let removed = if event.multiple {
            self.outstanding.resolve_up_to(event.sequence)
        } else {
            usize::from(self.outstanding.resolve_one(event.sequence))
        };
        self.resolved.fetch_add(removed as u64, Ordering::Relaxed);

        debug!(
            sequence = event.sequence,
            multiple = event.multiple,
            positive = event.positive,
            removed,
            "Confirm applied"
        );
    }

    pub fn stats(&self) -> ConfirmStats {
        ConfirmStats {
            acks: self.acks.load(Ordering::Relaxed),
            nacks: self.nacks.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
        }
    }

    pub fn outstanding(&self) -> &Arc<OutstandingSet<D>> {
        &self.outstanding
    }
}

impl<D: Clone + Send + Sync> ConfirmListener for ConfirmationHandler<D> {
    fn on_ack(&self, sequence: u64, multiple: bool) {
        self.on_event(ConfirmEvent::ack(sequence, multiple));
    }

    fn on_nack(&self, sequence: u64, multiple: bool) {
        self.on_event(ConfirmEvent::nack(sequence, multiple));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler_with(
        keys: impl IntoIterator<Item = u64>,
    ) -> (
        ConfirmationHandler<String>,
        Arc<OutstandingSet<String>>,
        Arc<CollectingNackReporter<String>>,
    ) {
        let set = Arc::new(OutstandingSet::new());
        for key in keys {
            set.insert(key, key.to_string()).unwrap();
        }
        let reporter = Arc::new(CollectingNackReporter::new());
        let handler = ConfirmationHandler::new(set.clone(), reporter.clone());
        (handler, set, reporter)
    }

    #[test]
    fn test_single_ack_removes_one_entry() {
        let (handler, set, reporter) = handler_with(1..=3);

        handler.on_event(ConfirmEvent::ack(2, false));

        assert!(!set.contains(2));
        assert_eq!(set.len(), 2);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_cumulative_ack_removes_prefix() {
        let (handler, set, _) = handler_with(1..=10);

        handler.on_event(ConfirmEvent::ack(6, true));

        assert_eq!(set.len(), 4);
        assert_eq!(set.first_outstanding(), Some(7));
        assert_eq!(handler.stats().resolved, 6);
    }

    #[test]
    fn test_mixed_cumulative_nack_then_single_ack() {
        let (handler, set, reporter) = handler_with(1..=5);

        handler.on_event(ConfirmEvent::nack(3, true));
        assert!(!set.contains(1));
        assert!(!set.contains(2));
        assert!(!set.contains(3));
        assert!(set.contains(4));
        assert!(set.contains(5));

        handler.on_event(ConfirmEvent::ack(5, false));
        assert_eq!(set.len(), 1);
        assert!(set.contains(4));

        let nacked = reporter.take();
        assert_eq!(
            nacked,
            vec![NackedMessage {
                sequence: 3,
                multiple: true,
                descriptor: Some("3".to_string()),
            }]
        );
    }

    #[test]
    fn test_nack_for_already_resolved_sequence_reports_unknown_body() {
        let (handler, set, reporter) = handler_with(1..=4);
        handler.on_event(ConfirmEvent::ack(2, true));

        handler.on_event(ConfirmEvent::nack(2, false));

        let nacked = reporter.take();
        assert_eq!(nacked.len(), 1);
        assert_eq!(nacked[0].descriptor, None);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_repeated_events_are_noops() {
        let (handler, set, _) = handler_with(1..=4);

        handler.on_event(ConfirmEvent::ack(2, true));
        handler.on_event(ConfirmEvent::ack(2, true));
        handler.on_event(ConfirmEvent::ack(3, false));
        handler.on_event(ConfirmEvent::ack(3, false));

        assert_eq!(set.len(), 1);
        assert_eq!(
            handler.stats(),
            ConfirmStats {
                acks: 4,
                nacks: 0,
                resolved: 3,
            }
        );
    }

    #[test]
    fn test_listener_callbacks_route_to_on_event() {
        let (handler, set, reporter) = handler_with(1..=3);
        let listener: &dyn ConfirmListener = &handler;

        listener.on_ack(1, false);
        listener.on_nack(3, true);

        assert!(set.is_empty());
        assert_eq!(reporter.len(), 1);
        assert_eq!(handler.stats().nacks, 1);
    }

    #[test]
    fn test_collecting_reporter_take_drains() {
        let reporter: CollectingNackReporter<String> = CollectingNackReporter::new();
        reporter.report_nack(Some(&"a".to_string()), 1, false);

        assert_eq!(reporter.take().len(), 1);
        assert!(reporter.take().is_empty());
    }
}
