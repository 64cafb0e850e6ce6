//! Best-effort progress broadcast.
//!
//! Events are sent without blocking; with no subscriber attached they are
//! dropped, and a subscriber that falls behind loses the oldest events.

use crate::model::FlowEvent;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: broadcast::Sender<FlowEvent>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: FlowEvent) {
        tracing::debug!(step = %event.step, status = ?event.status, "progress");
        if self.tx.send(event).is_err() {
            tracing::trace!("no progress subscribers; event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StepId, StepStatus};

    #[test]
    fn emit_without_subscribers_is_dropped() {
        let channel = ProgressChannel::new();
        channel.emit(FlowEvent::running(StepId::Build));

        // A late subscriber sees nothing from before it joined.
        let mut rx = channel.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn subscribers_receive_in_order() {
        let channel = ProgressChannel::new();
        let mut rx = channel.subscribe();
        channel.emit(FlowEvent::running(StepId::Build));
        channel.emit(FlowEvent::running(StepId::Inject));

        assert_eq!(rx.try_recv().unwrap().step, StepId::Build);
        let next = rx.try_recv().unwrap();
        assert_eq!(next.step, StepId::Inject);
        assert_eq!(next.status, StepStatus::Running);
    }
}
