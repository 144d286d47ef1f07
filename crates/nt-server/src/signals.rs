//! Signal fan-out (C8, spec §4.8/§5).
//!
//! Signals notify other subsystems (chunk manager, scheduler, operator
//! tooling) of lifecycle transitions. They are fired synchronously, in
//! the order the causing mutations committed in — spec §5's "Signals are
//! fired synchronously from the mutation handler in the order of the
//! causing mutations." [`SignalBus::publish`] turns one batch of
//! [`nt_core::Effect`]s into the matching [`Signal`]s and hands each to
//! every subscriber in registration order, so no subscriber can observe
//! signal `k+1` before another subscriber has finished handling signal
//! `k`.

use nt_core::Effect;
use nt_types::{HostId, NodeId, NodeState};

/// One of the 7 signals named in spec §4.8.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    NodeRegistered(NodeId),
    NodeUnregistered(NodeId),
    NodeRemoved(NodeId),
    NodeConfigUpdated(NodeId),
    FullHeartbeat { node_id: NodeId },
    IncrementalHeartbeat { node_id: NodeId, alerts: Vec<String> },
    AggregatedStateChanged { node_id: NodeId, new_state: NodeState },
    /// Not one of the spec's 7 node signals; carried through so a
    /// subscriber interested in per-host configuration refresh doesn't
    /// have to reconstruct it from `NodeConfigUpdated`s itself.
    ConfigurationRefresh { hosts: Vec<HostId> },
}

pub trait SignalSubscriber {
    fn on_signal(&mut self, signal: &Signal);
}

/// Fans effects out to every subscriber, in subscription order, one
/// effect at a time. No subscriber sees signal `k+1` until every
/// subscriber has returned from signal `k`.
#[derive(Default)]
pub struct SignalBus {
    subscribers: Vec<Box<dyn SignalSubscriber + Send>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn SignalSubscriber + Send>) {
        self.subscribers.push(subscriber);
    }

    /// Converts each effect to its signal (dropping `AttributeTreeTouch`,
    /// which is handled separately as a best-effort write, not a signal)
    /// and publishes it to every subscriber before moving to the next.
    pub fn publish(&mut self, effects: &[Effect]) {
        for effect in effects {
            let Some(signal) = Self::effect_to_signal(effect) else {
                continue;
            };
            tracing::debug!(?signal, "publishing signal");
            for subscriber in &mut self.subscribers {
                subscriber.on_signal(&signal);
            }
        }
    }

    fn effect_to_signal(effect: &Effect) -> Option<Signal> {
        match effect {
            Effect::NodeRegistered(id) => Some(Signal::NodeRegistered(*id)),
            Effect::NodeUnregistered(id) => Some(Signal::NodeUnregistered(*id)),
            Effect::NodeRemoved(id) => Some(Signal::NodeRemoved(*id)),
            Effect::NodeConfigUpdated(id) => Some(Signal::NodeConfigUpdated(*id)),
            Effect::FullHeartbeat { node_id, .. } => Some(Signal::FullHeartbeat { node_id: *node_id }),
            Effect::IncrementalHeartbeat { node_id, alerts } => Some(Signal::IncrementalHeartbeat {
                node_id: *node_id,
                alerts: alerts.clone(),
            }),
            Effect::AggregatedStateChanged { node_id, new_state } => {
                Some(Signal::AggregatedStateChanged { node_id: *node_id, new_state: *new_state })
            }
            Effect::ConfigurationRefresh { hosts } => {
                Some(Signal::ConfigurationRefresh { hosts: hosts.clone() })
            }
            Effect::LeaseTimeoutSet { .. } | Effect::AttributeTreeTouch { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(std::sync::Arc<std::sync::Mutex<Vec<Signal>>>);

    impl SignalSubscriber for Recorder {
        fn on_signal(&mut self, signal: &Signal) {
            self.0.lock().unwrap().push(signal.clone());
        }
    }

    #[test]
    fn publishes_in_commit_order_and_skips_internal_effects() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut bus = SignalBus::new();
        bus.subscribe(Box::new(Recorder(seen.clone())));

        let effects = vec![
            Effect::NodeUnregistered(NodeId::from(1)),
            Effect::AttributeTreeTouch { node_id: NodeId::from(1) },
            Effect::NodeRemoved(NodeId::from(1)),
            Effect::NodeRegistered(NodeId::from(2)),
        ];
        bus.publish(&effects);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                Signal::NodeUnregistered(NodeId::from(1)),
                Signal::NodeRemoved(NodeId::from(1)),
                Signal::NodeRegistered(NodeId::from(2)),
            ]
        );
    }

    #[test]
    fn fans_out_to_every_subscriber() {
        let seen_a = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_b = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut bus = SignalBus::new();
        bus.subscribe(Box::new(Recorder(seen_a.clone())));
        bus.subscribe(Box::new(Recorder(seen_b.clone())));

        bus.publish(&[Effect::NodeRegistered(NodeId::from(1))]);

        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert_eq!(seen_b.lock().unwrap().len(), 1);
    }
}
