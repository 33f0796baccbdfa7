//! Event bus for simulation diagnostics and session statistics.

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorState;
use crate::group::GroupKind;
use muster_common::{ActorId, ClientId, GroupId, SlotId};

/// Event types published by the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// Actor spawned
    ActorSpawned {
        /// Actor ID
        actor: ActorId,
    },
    /// Actor killed (death animation started)
    ActorKilled {
        /// Actor ID
        actor: ActorId,
    },
    /// Actor removed from the simulation
    ActorDespawned {
        /// Actor ID
        actor: ActorId,
    },
    /// Behavior state changed
    BehaviorChanged {
        /// Actor ID
        actor: ActorId,
        /// Previous state
        from: BehaviorState,
        /// New state
        to: BehaviorState,
    },
    /// A forming group was created
    GroupCreated {
        /// Group ID
        group: GroupId,
        /// Intended formation
        kind: GroupKind,
        /// Founding leader
        leader: ActorId,
    },
    /// Actor joined a group
    MemberJoined {
        /// Group ID
        group: GroupId,
        /// Actor ID
        actor: ActorId,
    },
    /// Actor left a group
    MemberLeft {
        /// Group ID
        group: GroupId,
        /// Actor ID
        actor: ActorId,
    },
    /// Leadership moved to another member
    LeaderChanged {
        /// Group ID
        group: GroupId,
        /// New leader
        leader: ActorId,
    },
    /// Forming group reached its minimum size and committed
    GroupCommitted {
        /// Group ID
        group: GroupId,
        /// Member count at commit
        size: usize,
    },
    /// Group dissolved with members still in it
    GroupDisbanded {
        /// Group ID
        group: GroupId,
        /// Members released
        released: usize,
    },
    /// Group deleted after its last member left
    GroupRemoved {
        /// Group ID
        group: GroupId,
    },
    /// Lobby slot granted
    SlotGranted {
        /// Slot
        slot: SlotId,
        /// New owner
        client: ClientId,
    },
    /// Lobby slot request denied
    SlotDenied {
        /// Slot
        slot: SlotId,
        /// Requesting client
        client: ClientId,
    },
    /// Lobby slot released
    SlotReleased {
        /// Slot
        slot: SlotId,
        /// Previous owner
        client: ClientId,
    },
}

/// Event bus for broadcasting events to subscribers.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<SimEvent>,
    /// Receiver for collecting events
    receiver: Receiver<SimEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: SimEvent) {
        // Non-blocking send - if full, event is dropped
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<SimEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<SimEvent> {
        self.sender.clone()
    }
}

/// Publishes through an optional sender, dropping the event when the channel
/// is full or absent.
pub(crate) fn emit(sender: Option<&Sender<SimEvent>>, event: SimEvent) {
    if let Some(sender) = sender {
        let _ = sender.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_drain() {
        let bus = EventBus::new(8);
        bus.publish(SimEvent::ActorSpawned {
            actor: ActorId::from_raw(1),
        });
        bus.publish(SimEvent::GroupRemoved {
            group: GroupId::from_raw(3),
        });
        assert_eq!(bus.pending_count(), 2);

        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops_events() {
        let bus = EventBus::new(1);
        let sender = bus.sender();
        emit(Some(&sender), SimEvent::ActorKilled { actor: ActorId::from_raw(1) });
        emit(Some(&sender), SimEvent::ActorKilled { actor: ActorId::from_raw(2) });
        emit(None, SimEvent::ActorKilled { actor: ActorId::from_raw(3) });
        assert_eq!(
            bus.drain(),
            vec![SimEvent::ActorKilled {
                actor: ActorId::from_raw(1)
            }]
        );
    }
}
