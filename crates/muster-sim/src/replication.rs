//! Server side of the replication bridge.
//!
//! Committed field changes are gathered into one [`ReplicationFrame`] per
//! tick, encoded once with bincode, and pushed to every connected observer
//! over a bounded channel. Observers never read server memory; they only see
//! the frames they are sent.
//!
//! Wire layout: the 4 magic bytes `MSTR` followed by the bincode encoding of
//! the frame, whose first field is the [`ProtocolVersion`].

use crate::actor::{ActorSnapshot, FieldUpdate};
use ahash::AHashMap;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use muster_common::{ActorId, MagicBytes, ObserverId, ProtocolVersion, ReplicationError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Everything that changed during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationFrame {
    /// Protocol version of the writer
    pub protocol: ProtocolVersion,
    /// Server tick the frame closes
    pub tick: u64,
    /// Full state of actors that became visible
    pub spawned: Vec<ActorSnapshot>,
    /// Committed field changes, in commit order
    pub updates: Vec<FieldUpdate>,
    /// Actors removed this tick
    pub despawned: Vec<ActorId>,
    /// When true, `spawned` lists every live actor and anything else the
    /// receiver holds is gone
    pub full_snapshot: bool,
}

impl ReplicationFrame {
    /// Creates an empty delta frame.
    #[must_use]
    pub fn new(tick: u64) -> Self {
        Self {
            protocol: ProtocolVersion::REPLICATION,
            tick,
            spawned: Vec::new(),
            updates: Vec::new(),
            despawned: Vec::new(),
            full_snapshot: false,
        }
    }

    /// Creates a full-snapshot frame.
    #[must_use]
    pub fn snapshot(tick: u64, actors: Vec<ActorSnapshot>) -> Self {
        Self {
            spawned: actors,
            full_snapshot: true,
            ..Self::new(tick)
        }
    }

    /// Whether the frame carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.full_snapshot
            && self.spawned.is_empty()
            && self.updates.is_empty()
            && self.despawned.is_empty()
    }

    /// Encodes the frame for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, ReplicationError> {
        let body = bincode::serialize(self).map_err(|e| ReplicationError::Codec(e.to_string()))?;
        let mut bytes = Vec::with_capacity(MagicBytes::FRAME.0.len() + body.len());
        bytes.extend_from_slice(&MagicBytes::FRAME.0);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decodes a frame, checking the header and protocol version.
    pub fn decode(bytes: &[u8]) -> Result<Self, ReplicationError> {
        let magic = MagicBytes::FRAME.0;
        if bytes.len() < magic.len() || bytes[..magic.len()] != magic {
            return Err(ReplicationError::BadMagic);
        }
        let frame: Self = bincode::deserialize(&bytes[magic.len()..])
            .map_err(|e| ReplicationError::Codec(e.to_string()))?;
        if !ProtocolVersion::REPLICATION.can_read(&frame.protocol) {
            return Err(ReplicationError::ProtocolMismatch {
                expected: ProtocolVersion::REPLICATION.to_string(),
                actual: frame.protocol.to_string(),
            });
        }
        Ok(frame)
    }
}

/// Receiving end of an observer link.
#[derive(Debug)]
pub struct ObserverEndpoint {
    id: ObserverId,
    receiver: Receiver<Vec<u8>>,
}

impl ObserverEndpoint {
    /// Observer ID.
    #[must_use]
    pub const fn id(&self) -> ObserverId {
        self.id
    }

    /// Number of queued frames.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Takes the next frame without blocking.
    pub fn try_recv(&self) -> Option<Result<ReplicationFrame, ReplicationError>> {
        self.receiver
            .try_recv()
            .ok()
            .map(|bytes| ReplicationFrame::decode(&bytes))
    }

    /// Takes every queued frame. Undecodable frames are logged and skipped.
    pub fn drain(&self) -> Vec<ReplicationFrame> {
        self.receiver
            .try_iter()
            .filter_map(|bytes| match ReplicationFrame::decode(&bytes) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!("Observer {}: dropping frame: {e}", self.id.raw());
                    None
                },
            })
            .collect()
    }
}

#[derive(Debug)]
struct ObserverLink {
    sender: Sender<Vec<u8>>,
    needs_snapshot: bool,
}

/// Counters from one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Frames handed to observer queues
    pub frames_sent: usize,
    /// Bytes handed to observer queues
    pub bytes_sent: usize,
    /// Observers removed because they disconnected
    pub observers_dropped: usize,
}

/// Server-side fan-out of committed changes.
#[derive(Debug)]
pub struct ReplicationServer {
    observers: AHashMap<ObserverId, ObserverLink>,
    next_observer: u32,
    queue_capacity: usize,
    pending: ReplicationFrame,
    frames_sent: u64,
}

impl ReplicationServer {
    /// Creates a server whose observer queues hold `queue_capacity` frames.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            observers: AHashMap::new(),
            next_observer: 1,
            queue_capacity: queue_capacity.max(1),
            pending: ReplicationFrame::new(0),
            frames_sent: 0,
        }
    }

    /// Connects a new observer. Its first frame is a full snapshot.
    pub fn connect(&mut self) -> ObserverEndpoint {
        let id = ObserverId::new(self.next_observer);
        self.next_observer += 1;
        let (sender, receiver) = bounded(self.queue_capacity);
        self.observers.insert(
            id,
            ObserverLink {
                sender,
                needs_snapshot: true,
            },
        );
        info!("Observer {} connected", id.raw());
        ObserverEndpoint { id, receiver }
    }

    /// Disconnects an observer. Returns false if it was unknown.
    pub fn disconnect(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Number of connected observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Total frames delivered since start.
    #[must_use]
    pub const fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Whether any observer is waiting for a full snapshot.
    #[must_use]
    pub fn needs_snapshot(&self) -> bool {
        self.observers.values().any(|o| o.needs_snapshot)
    }

    /// Changes gathered for the next flush.
    #[must_use]
    pub fn pending(&self) -> &ReplicationFrame {
        &self.pending
    }

    /// Records a newly spawned actor.
    pub fn record_spawn(&mut self, snapshot: ActorSnapshot) {
        self.pending.spawned.push(snapshot);
    }

    /// Records committed field changes.
    pub fn record_updates(&mut self, updates: impl IntoIterator<Item = FieldUpdate>) {
        self.pending.updates.extend(updates);
    }

    /// Records a despawn and suppresses anything still queued for the actor.
    pub fn record_despawn(&mut self, actor: ActorId) {
        self.pending.updates.retain(|u| u.actor != actor);
        let before = self.pending.spawned.len();
        self.pending.spawned.retain(|s| s.id != actor);
        if self.pending.spawned.len() == before {
            self.pending.despawned.push(actor);
        }
    }

    /// Sends the gathered frame for `tick` to every observer.
    ///
    /// Observers still waiting for their first frame (or resynchronizing after
    /// an overflow) get a full snapshot built from `live` instead. Observers
    /// whose channel is closed are dropped; the tick continues regardless.
    pub fn flush(&mut self, tick: u64, live: &[ActorSnapshot]) -> FlushStats {
        let mut frame = std::mem::replace(&mut self.pending, ReplicationFrame::new(tick));
        frame.tick = tick;

        let mut stats = FlushStats::default();
        let delta = if frame.is_empty() {
            None
        } else {
            encode_or_log(&frame)
        };
        let snapshot = if self.needs_snapshot() {
            encode_or_log(&ReplicationFrame::snapshot(tick, live.to_vec()))
        } else {
            None
        };

        let mut closed = Vec::new();
        for (id, link) in &mut self.observers {
            let bytes = if link.needs_snapshot {
                snapshot.as_ref()
            } else {
                delta.as_ref()
            };
            let Some(bytes) = bytes else {
                continue;
            };
            match link.sender.try_send(bytes.clone()) {
                Ok(()) => {
                    link.needs_snapshot = false;
                    stats.frames_sent += 1;
                    stats.bytes_sent += bytes.len();
                },
                Err(TrySendError::Full(_)) => {
                    warn!("Observer {} queue full at tick {tick}, resyncing", id.raw());
                    link.needs_snapshot = true;
                },
                Err(TrySendError::Disconnected(_)) => closed.push(*id),
            }
        }
        for id in closed {
            self.observers.remove(&id);
            stats.observers_dropped += 1;
            warn!("Observer {} disconnected, dropped", id.raw());
        }

        self.frames_sent += stats.frames_sent as u64;
        if stats.frames_sent > 0 {
            debug!(
                "Tick {tick}: {} updates to {} observers ({} bytes)",
                frame.updates.len(),
                stats.frames_sent,
                stats.bytes_sent
            );
        }
        stats
    }
}

fn encode_or_log(frame: &ReplicationFrame) -> Option<Vec<u8>> {
    match frame.encode() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Failed to encode frame for tick {}: {e}", frame.tick);
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::FieldValue;
    use glam::Vec3;
    use muster_common::{Color, GroupId};

    fn snap(n: u64) -> ActorSnapshot {
        ActorSnapshot {
            id: ActorId::from_raw(n),
            position: Vec3::new(n as f32, 0.0, 0.0),
            movement_intent: Vec3::ZERO,
            is_moving: false,
            tint: Color::WHITE,
            alive: true,
            group_id: GroupId::NONE,
        }
    }

    #[test]
    fn test_frame_wire_round_trip() {
        let mut frame = ReplicationFrame::new(7);
        frame.spawned.push(snap(1));
        frame.updates.push(FieldUpdate::new(
            ActorId::from_raw(1),
            FieldValue::IsMoving(true),
        ));
        frame.despawned.push(ActorId::from_raw(2));

        let bytes = frame.encode().expect("encode");
        assert_eq!(&bytes[..4], b"MSTR");
        assert_eq!(ReplicationFrame::decode(&bytes).expect("decode"), frame);
    }

    #[test]
    fn test_decode_rejects_bad_header_and_version() {
        assert_eq!(
            ReplicationFrame::decode(b"NOPE1234"),
            Err(ReplicationError::BadMagic)
        );
        assert_eq!(ReplicationFrame::decode(b"MS"), Err(ReplicationError::BadMagic));

        let mut frame = ReplicationFrame::new(1);
        frame.protocol = ProtocolVersion::new(9, 0, 0);
        let bytes = frame.encode().expect("encode");
        assert!(matches!(
            ReplicationFrame::decode(&bytes),
            Err(ReplicationError::ProtocolMismatch { .. })
        ));

        frame.protocol = ProtocolVersion::new(1, 3, 0);
        let bytes = frame.encode().expect("encode");
        assert!(ReplicationFrame::decode(&bytes).is_ok(), "minor bumps stay readable");

        let truncated = &ReplicationFrame::new(1).encode().expect("encode")[..6];
        assert!(matches!(
            ReplicationFrame::decode(truncated),
            Err(ReplicationError::Codec(_))
        ));
    }

    #[test]
    fn test_new_observer_gets_snapshot_then_deltas() {
        let mut server = ReplicationServer::new(8);
        let live = vec![snap(1), snap(2)];
        let observer = server.connect();

        server.flush(1, &live);
        let first = observer.drain();
        assert_eq!(first.len(), 1);
        assert!(first[0].full_snapshot);
        assert_eq!(first[0].spawned.len(), 2);

        server.flush(2, &live);
        assert!(observer.drain().is_empty(), "empty deltas are not sent");

        server.record_updates([FieldUpdate::new(
            ActorId::from_raw(1),
            FieldValue::Position(Vec3::ONE),
        )]);
        server.flush(3, &live);
        let frames = observer.drain();
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].full_snapshot);
        assert_eq!(frames[0].tick, 3);
        assert_eq!(frames[0].updates.len(), 1);
    }

    #[test]
    fn test_despawn_suppresses_pending_updates() {
        let mut server = ReplicationServer::new(8);
        let a = ActorId::from_raw(1);
        server.record_updates([FieldUpdate::new(a, FieldValue::Alive(false))]);
        server.record_despawn(a);
        assert!(server.pending().updates.is_empty());
        assert_eq!(server.pending().despawned, vec![a]);

        let b = ActorId::from_raw(2);
        server.record_spawn(snap(2));
        server.record_despawn(b);
        assert!(server.pending().spawned.is_empty());
        assert!(!server.pending().despawned.contains(&b));
    }

    #[test]
    fn test_disconnected_observer_dropped() {
        let mut server = ReplicationServer::new(4);
        let keep = server.connect();
        let gone = server.connect();
        drop(gone);

        let stats = server.flush(1, &[snap(1)]);
        assert_eq!(stats.observers_dropped, 1);
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(server.observer_count(), 1);
        assert_eq!(keep.drain().len(), 1);
    }

    #[test]
    fn test_full_queue_resyncs_with_snapshot() {
        let mut server = ReplicationServer::new(1);
        let observer = server.connect();
        let live = vec![snap(1)];
        server.flush(1, &live);

        server.record_updates([FieldUpdate::new(
            ActorId::from_raw(1),
            FieldValue::Tint(Color::rgb(1.0, 0.0, 0.0)),
        )]);
        let stats = server.flush(2, &live);
        assert_eq!(stats.frames_sent, 0);

        assert_eq!(observer.drain().len(), 1);
        server.flush(3, &live);
        let frames = observer.drain();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].full_snapshot);
    }
}
