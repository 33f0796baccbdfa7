//! Lobby character selection: exclusive slots with server-side arbitration.
//!
//! Each slot's owner is a server-written [`ReplicatedField`]. Any client may
//! ask for a slot, but every request is resolved by the single
//! [`SlotArbiter`] in arrival order: the first valid claim wins, a client's
//! previous slot is vacated before its new one is granted, and only the
//! owner can release. Requests from connection threads arrive either through
//! the [`SlotRequest`] queue or through a locked [`LobbyHandle`].

use crate::config::LobbyConfig;
use crate::events::{emit, SimEvent};
use crate::replicated::ReplicatedField;
use crate::scheduler::Scheduler;
use ahash::AHashMap;
use crossbeam_channel::{unbounded, Receiver, Sender};
use muster_common::{ClientId, ReplicationError, Role, SlotId, WriterRole};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a claim was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    /// Another client owns the slot
    Taken,
    /// The slot does not exist
    NoSuchSlot,
    /// The requester does not own the slot it tried to release
    NotOwner,
}

/// Result of a slot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotDecision {
    /// Request applied
    Granted,
    /// Request refused
    Denied(DenyReason),
}

impl SlotDecision {
    /// Whether the request was applied.
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// A slot change committed at a tick boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotChange {
    /// Slot
    pub slot: SlotId,
    /// Owner before the tick
    pub previous: Option<ClientId>,
    /// Owner after the tick
    pub current: Option<ClientId>,
}

/// The single arbitration point for slot ownership.
#[derive(Debug)]
pub struct SlotArbiter {
    slots: Vec<ReplicatedField<Option<ClientId>>>,
}

impl SlotArbiter {
    /// Creates `count` empty slots.
    #[must_use]
    pub fn new(count: u16) -> Self {
        Self {
            slots: (0..count)
                .map(|_| ReplicatedField::server("slot_owner", None))
                .collect(),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of owned slots.
    #[must_use]
    pub fn taken_count(&self) -> usize {
        self.slots.iter().filter(|s| s.read().is_some()).count()
    }

    /// Current owner of `slot`.
    #[must_use]
    pub fn owner(&self, slot: SlotId) -> Option<ClientId> {
        self.slots.get(slot.index()).and_then(|s| *s.read())
    }

    /// Slot owned by `client`.
    #[must_use]
    pub fn slot_of(&self, client: ClientId) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|s| *s.read() == Some(client))
            .map(|i| SlotId::new(i as u16))
    }

    /// Lowest-numbered free slot.
    #[must_use]
    pub fn first_free(&self) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|s| s.read().is_none())
            .map(|i| SlotId::new(i as u16))
    }

    /// Resolves a claim of `slot` by `client`.
    ///
    /// Claiming a slot already held by the same client is granted again.
    pub fn claim(&mut self, slot: SlotId, client: ClientId) -> SlotDecision {
        let Some(field) = self.slots.get(slot.index()) else {
            return SlotDecision::Denied(DenyReason::NoSuchSlot);
        };
        match *field.read() {
            Some(owner) if owner == client => return SlotDecision::Granted,
            Some(_) => return SlotDecision::Denied(DenyReason::Taken),
            None => {},
        }
        if let Some(previous) = self.slot_of(client) {
            self.write(previous, None);
        }
        self.write(slot, Some(client));
        SlotDecision::Granted
    }

    /// Releases `slot` if `client` owns it.
    pub fn release(&mut self, slot: SlotId, client: ClientId) -> SlotDecision {
        match self.owner(slot) {
            Some(owner) if owner == client => {
                self.write(slot, None);
                SlotDecision::Granted
            },
            _ if slot.index() >= self.slots.len() => SlotDecision::Denied(DenyReason::NoSuchSlot),
            _ => SlotDecision::Denied(DenyReason::NotOwner),
        }
    }

    /// Releases whatever `client` holds.
    pub fn release_all(&mut self, client: ClientId) -> Option<SlotId> {
        let slot = self.slot_of(client)?;
        self.write(slot, None);
        Some(slot)
    }

    /// Closes the tick and returns the per-slot changes.
    pub fn commit(&mut self) -> Vec<SlotChange> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, field)| {
                field.commit().map(|c| SlotChange {
                    slot: SlotId::new(i as u16),
                    previous: c.previous,
                    current: c.current,
                })
            })
            .collect()
    }

    fn write(&mut self, slot: SlotId, owner: Option<ClientId>) {
        if let Some(field) = self.slots.get_mut(slot.index()) {
            if let Err(e) = field.write(Role::Server, owner) {
                warn!("Slot {}: {e}", slot.raw());
            }
        }
    }
}

/// What a queued request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotAction {
    /// Claim a slot
    Claim(SlotId),
    /// Release a slot
    Release(SlotId),
}

/// A client request funneled to the arbiter.
#[derive(Debug, Clone)]
pub struct SlotRequest {
    /// Requesting client
    pub client: ClientId,
    /// Requested action
    pub action: SlotAction,
    /// Where to send the decision
    pub reply: Option<Sender<SlotDecision>>,
}

#[derive(Debug)]
struct LobbyClient {
    ready: ReplicatedField<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LobbyTask {
    AutoAssign(ClientId),
}

/// Lobby state owned by the server.
#[derive(Debug)]
pub struct Lobby {
    arbiter: SlotArbiter,
    clients: AHashMap<ClientId, LobbyClient>,
    scheduler: Scheduler<LobbyTask>,
    auto_assign_delay: u64,
    requests: Receiver<SlotRequest>,
    submit: Sender<SlotRequest>,
    events: Option<Sender<SimEvent>>,
}

impl Lobby {
    /// Creates a lobby.
    #[must_use]
    pub fn new(config: &LobbyConfig) -> Self {
        let (submit, requests) = unbounded();
        Self {
            arbiter: SlotArbiter::new(config.slot_count),
            clients: AHashMap::new(),
            scheduler: Scheduler::new(),
            auto_assign_delay: config.auto_assign_delay_ticks,
            requests,
            submit,
            events: None,
        }
    }

    /// Publishes slot events through `sender`.
    pub fn set_event_sender(&mut self, sender: Sender<SimEvent>) {
        self.events = Some(sender);
    }

    /// Sender for queued requests from connection threads.
    #[must_use]
    pub fn submitter(&self) -> Sender<SlotRequest> {
        self.submit.clone()
    }

    /// Slot arbiter (read-only).
    #[must_use]
    pub const fn arbiter(&self) -> &SlotArbiter {
        &self.arbiter
    }

    /// Number of joined clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Registers a client and schedules its auto-assignment.
    pub fn join(&mut self, client: ClientId) {
        if self.clients.contains_key(&client) {
            return;
        }
        self.clients.insert(
            client,
            LobbyClient {
                ready: ReplicatedField::new("ready", WriterRole::Owner(client), false),
            },
        );
        self.scheduler
            .schedule_in(self.auto_assign_delay, LobbyTask::AutoAssign(client));
        info!("Client {} joined lobby", client.raw());
    }

    /// Removes a client, releasing its slot and pending auto-assignment.
    pub fn disconnect(&mut self, client: ClientId) {
        if self.clients.remove(&client).is_none() {
            return;
        }
        self.scheduler
            .cancel_where(|t| *t == LobbyTask::AutoAssign(client));
        if let Some(slot) = self.arbiter.release_all(client) {
            emit(
                self.events.as_ref(),
                SimEvent::SlotReleased { slot, client },
            );
        }
        info!("Client {} left lobby", client.raw());
    }

    /// Requests ownership of `slot` for `client`. Unknown clients are joined
    /// first.
    pub fn request_slot(&mut self, slot: SlotId, client: ClientId) -> SlotDecision {
        self.join(client);
        let decision = self.arbiter.claim(slot, client);
        let event = if decision.is_granted() {
            SimEvent::SlotGranted { slot, client }
        } else {
            SimEvent::SlotDenied { slot, client }
        };
        debug!("Client {} slot {}: {decision:?}", client.raw(), slot.raw());
        emit(self.events.as_ref(), event);
        decision
    }

    /// Releases `slot` if `client` owns it.
    pub fn release_slot(&mut self, slot: SlotId, client: ClientId) -> SlotDecision {
        let decision = self.arbiter.release(slot, client);
        if decision.is_granted() {
            emit(
                self.events.as_ref(),
                SimEvent::SlotReleased { slot, client },
            );
        }
        decision
    }

    /// Owner write of a client's ready flag.
    pub fn set_ready(&mut self, role: Role, client: ClientId, ready: bool) -> Result<(), ReplicationError> {
        match self.clients.get_mut(&client) {
            Some(c) => c.ready.write(role, ready),
            None => Ok(()),
        }
    }

    /// Whether `client` has marked itself ready.
    #[must_use]
    pub fn is_ready(&self, client: ClientId) -> bool {
        self.clients.get(&client).is_some_and(|c| *c.ready.read())
    }

    /// Resolves every queued request in arrival order.
    pub fn process_requests(&mut self) -> usize {
        let pending: Vec<SlotRequest> = self.requests.try_iter().collect();
        for request in &pending {
            let decision = match request.action {
                SlotAction::Claim(slot) => self.request_slot(slot, request.client),
                SlotAction::Release(slot) => self.release_slot(slot, request.client),
            };
            if let Some(reply) = &request.reply {
                let _ = reply.send(decision);
            }
        }
        pending.len()
    }

    /// Runs one lobby tick: queued requests, due auto-assignments, then
    /// commits slot changes.
    pub fn tick(&mut self) -> Vec<SlotChange> {
        self.process_requests();
        for task in self.scheduler.advance() {
            match task {
                LobbyTask::AutoAssign(client) => self.auto_assign(client),
            }
        }
        for client in self.clients.values_mut() {
            client.ready.commit();
        }
        self.arbiter.commit()
    }

    fn auto_assign(&mut self, client: ClientId) {
        if !self.clients.contains_key(&client) || self.arbiter.slot_of(client).is_some() {
            return;
        }
        match self.arbiter.first_free() {
            Some(slot) => {
                info!("Auto-assigning slot {} to client {}", slot.raw(), client.raw());
                self.request_slot(slot, client);
            },
            None => warn!("No free slot for client {}", client.raw()),
        }
    }
}

/// A lobby shared by connection threads.
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    inner: Arc<Mutex<Lobby>>,
}

impl LobbyHandle {
    /// Wraps a lobby.
    #[must_use]
    pub fn new(lobby: Lobby) -> Self {
        Self {
            inner: Arc::new(Mutex::new(lobby)),
        }
    }

    /// Requests a slot under the lobby lock.
    pub fn request_slot(&self, slot: SlotId, client: ClientId) -> SlotDecision {
        self.inner.lock().request_slot(slot, client)
    }

    /// Releases a slot under the lobby lock.
    pub fn release_slot(&self, slot: SlotId, client: ClientId) -> SlotDecision {
        self.inner.lock().release_slot(slot, client)
    }

    /// Current owner of `slot`.
    #[must_use]
    pub fn owner(&self, slot: SlotId) -> Option<ClientId> {
        self.inner.lock().arbiter().owner(slot)
    }

    /// Runs one lobby tick.
    pub fn tick(&self) -> Vec<SlotChange> {
        self.inner.lock().tick()
    }

    /// Runs `f` with the lobby locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Lobby) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
