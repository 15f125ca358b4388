//! Room session — one room plus its journal and snapshots.
//!
//! Every mutation runs on a clone of the room. Commit order:
//!   1. sequence the clone's pending events
//!   2. append them to the journal (fsync each)
//!   3. write a snapshot of the clone, prune old ones
//!   4. swap the clone in
//!   5. publish the events
//! A failure before step 4 leaves the live room untouched.
//! Concurrency: one Mutex per room, no global mutable state.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info};

use crate::clock::Clock;
use crate::error::{Result, RoomError};
use crate::event_store::EventStore;
use crate::events::{EventEnvelope, EventSink};
use crate::proto_bridge::{envelope_to_proto, proto_to_envelope};
use crate::replay;
use crate::room::Room;
use crate::snapshot;

/// On-disk half of a persistent room:
///   <rooms_dir>/<room_id>/journal.log
///   <rooms_dir>/<room_id>/snapshots/
pub struct RoomStorage {
    dir: PathBuf,
    journal: EventStore,
    retention: usize,
}

impl RoomStorage {
    pub fn open(rooms_dir: &Path, room_id: &str, retention: usize) -> Result<Self> {
        let dir = rooms_dir.join(room_id);
        let journal = EventStore::open(&dir.join("journal.log"))?;
        Ok(Self {
            dir,
            journal,
            retention,
        })
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.dir.join("snapshots")
    }

    pub fn journal(&self) -> &EventStore {
        &self.journal
    }

    pub fn load_events(&self, after: u64) -> Result<Vec<EventEnvelope>> {
        self.journal
            .load_since(after)?
            .iter()
            .map(proto_to_envelope)
            .collect()
    }

    fn persist(&mut self, envelopes: &[EventEnvelope], room: &Room) -> Result<()> {
        for e in envelopes {
            self.journal.append_event(&envelope_to_proto(e)?)?;
        }
        let dir = self.snapshot_dir();
        snapshot::save_snapshot(&dir, room)?;
        snapshot::prune(&dir, self.retention)?;
        Ok(())
    }
}

pub struct RoomSession {
    room: Room,
    storage: Option<RoomStorage>,
    /// Delivered events, kept only for in-memory rooms.
    log: Vec<EventEnvelope>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl RoomSession {
    /// Wrap a freshly created room and commit its creation events.
    pub fn create(
        room: Room,
        storage: Option<RoomStorage>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut session = Self {
            room: room.clone(),
            storage,
            log: Vec::new(),
            sink,
            clock,
        };
        session.commit(room)?;
        Ok(session)
    }

    /// Restore from disk:
    ///   1. newest snapshot that verifies
    ///   2. optionally reconcile with a replay of the journal
    pub fn restore(
        storage: RoomStorage,
        verify: bool,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut room = snapshot::load_latest_verified(&storage.snapshot_dir())?.ok_or_else(|| {
            RoomError::Storage(format!("{}: no usable snapshot", storage.dir.display()))
        })?;
        if verify {
            let events = storage.load_events(0)?;
            replay::reconcile(&mut room, &events)?;
        }
        if storage.journal.last_sequence() > room.last_sequence {
            room.last_sequence = storage.journal.last_sequence();
        }
        info!(room = %room.id, phase = %room.phase, turn = room.state.current_turn, "room restored");
        Ok(Self {
            room,
            storage: Some(storage),
            log: Vec::new(),
            sink,
            clock,
        })
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Run `f` on a clone of the room and commit the clone if it produced
    /// events. An `Err` from `f` discards the clone.
    pub fn transact<R>(&mut self, f: impl FnOnce(&mut Room, i64) -> Result<R>) -> Result<R> {
        let now = self.clock.now_ms();
        let mut next = self.room.clone();
        let out = f(&mut next, now)?;
        if !next.pending_events().is_empty() {
            self.commit(next)?;
        }
        Ok(out)
    }

    fn commit(&mut self, mut next: Room) -> Result<Vec<EventEnvelope>> {
        let now = self.clock.now_ms();
        let pending = next.take_pending();
        let mut envelopes = Vec::with_capacity(pending.len());
        for p in pending {
            next.last_sequence += 1;
            envelopes.push(EventEnvelope {
                room_id: next.id.clone(),
                sequence: next.last_sequence,
                turn: p.turn,
                phase: p.phase,
                timestamp_ms: now,
                event: p.event,
            });
        }

        match &mut self.storage {
            Some(storage) => {
                if let Err(e) = storage.persist(&envelopes, &next) {
                    error!(room = %next.id, error = %e, "commit failed, room unchanged");
                    return Err(e);
                }
            }
            None => self.log.extend(envelopes.iter().cloned()),
        }

        self.room = next;
        for e in &envelopes {
            self.sink.publish(e);
        }
        Ok(envelopes)
    }

    /// Events with sequence > `after`, from the journal when there is one.
    pub fn events_since(&self, after: u64) -> Result<Vec<EventEnvelope>> {
        match &self.storage {
            Some(storage) => storage.load_events(after),
            None => Ok(self
                .log
                .iter()
                .filter(|e| e.sequence > after)
                .cloned()
                .collect()),
        }
    }
}

/// Thread-safe room handle.
pub struct SharedRoom {
    inner: Mutex<RoomSession>,
}

impl SharedRoom {
    pub fn new(session: RoomSession) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RoomSession>> {
        self.inner.lock().map_err(|_| RoomError::LockPoisoned)
    }

    /// Transaction under the room lock.
    pub fn transact<R>(&self, f: impl FnOnce(&mut Room, i64) -> Result<R>) -> Result<R> {
        self.lock()?.transact(f)
    }

    /// Read under the room lock.
    pub fn read<R>(&self, f: impl FnOnce(&Room) -> R) -> Result<R> {
        let session = self.lock()?;
        Ok(f(session.room()))
    }

    pub fn events_since(&self, after: u64) -> Result<Vec<EventEnvelope>> {
        self.lock()?.events_since(after)
    }
}
