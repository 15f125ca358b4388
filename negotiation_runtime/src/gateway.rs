//! Session gateway — the request surface over all rooms.
//!
//! Registry: `RwLock` map of room id -> `Arc<SharedRoom>`, plus a code
//! index. Registry locks are held only to look a room up; all room work
//! happens under that room's own lock, so rooms never block each other.
//! Lock order when both registry locks are needed: codes, then rooms.

use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, RwLock};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use negotiation_engine::catalog::PlannedAction;
use negotiation_engine::domain::Role;
use negotiation_engine::summary::TurnSummary;

use crate::clock::{rfc3339, Clock, SystemClock};
use crate::config::RuntimeConfig;
use crate::error::{Result, RoomError};
use crate::events::{EventEnvelope, EventSink, NullSink};
use crate::room::{Resolution, Room, RoomId, RoomInfo, RoomView};
use crate::session::{RoomSession, RoomStorage, SharedRoom};

/// Room-code alphabet. No I, O, 0 or 1.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRoom {
    pub room_id: RoomId,
    pub code: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedRoom {
    pub room_id: RoomId,
    pub role: Role,
    /// The game is over; only views are available.
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Turn the submission was stored for.
    pub turn: u32,
    /// False when the list equalled the stored one.
    pub changed: bool,
    /// Set when this submission completed the turn.
    pub resolved: Option<TurnSummary>,
}

pub fn random_code(rng: &mut impl Rng) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn random_room_id(rng: &mut impl Rng) -> RoomId {
    format!("room-{:016x}", rng.gen::<u64>())
}

pub struct Gateway {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    rooms: RwLock<BTreeMap<RoomId, Arc<SharedRoom>>>,
    codes: RwLock<BTreeMap<String, RoomId>>,
}

impl Gateway {
    /// Empty gateway. Does not look at `data_dir`; see `open`.
    pub fn new(config: RuntimeConfig, clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            clock,
            sink,
            rooms: RwLock::new(BTreeMap::new()),
            codes: RwLock::new(BTreeMap::new()),
        }
    }

    /// In-memory rooms, system clock, events dropped.
    pub fn in_memory() -> Self {
        Self::new(RuntimeConfig::in_memory(), Arc::new(SystemClock), Arc::new(NullSink))
    }

    /// Gateway with every room found under `data_dir` restored. A room that
    /// cannot be restored is logged and left on disk untouched.
    pub fn open(config: RuntimeConfig, clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Result<Self> {
        let mut rooms = BTreeMap::new();
        let mut codes = BTreeMap::new();
        if let Some(dir) = config.rooms_dir().filter(|d| d.exists()) {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let room_id = entry.file_name().to_string_lossy().into_owned();
                let restored = RoomStorage::open(&dir, &room_id, config.retention()).and_then(|storage| {
                    RoomSession::restore(storage, config.verify_on_restore, sink.clone(), clock.clone())
                });
                match restored {
                    Ok(session) if session.room().id == room_id => {
                        codes.insert(session.room().code.clone(), room_id.clone());
                        rooms.insert(room_id, Arc::new(SharedRoom::new(session)));
                    }
                    Ok(session) => {
                        error!(room = %room_id, found = %session.room().id, "room directory holds another room, skipping");
                    }
                    Err(e) => error!(room = %room_id, error = %e, "room could not be restored, skipping"),
                }
            }
        }
        info!(rooms = rooms.len(), "gateway opened");
        Ok(Self {
            config,
            clock,
            sink,
            rooms: RwLock::new(rooms),
            codes: RwLock::new(codes),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn room(&self, room_id: &str) -> Result<Arc<SharedRoom>> {
        self.rooms
            .read()
            .map_err(|_| RoomError::LockPoisoned)?
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::UnknownRoom(room_id.to_string()))
    }

    fn storage_for(&self, room_id: &str) -> Result<Option<RoomStorage>> {
        match self.config.rooms_dir() {
            Some(dir) => Ok(Some(RoomStorage::open(&dir, room_id, self.config.retention())?)),
            None => Ok(None),
        }
    }

    // -- requests --

    /// New room in `waiting`; `creator` holds the Architect seat.
    pub fn create_room(&self, scenario_id: &str, creator: &str) -> Result<CreatedRoom> {
        let scenario = self.config.load_scenario(scenario_id)?;

        let mut codes = self.codes.write().map_err(|_| RoomError::LockPoisoned)?;
        let (room_id, code) = {
            let rooms = self.rooms.read().map_err(|_| RoomError::LockPoisoned)?;
            let mut rng = rand::thread_rng();
            let mut code = random_code(&mut rng);
            while codes.contains_key(&code) {
                code = random_code(&mut rng);
            }
            let mut room_id = random_room_id(&mut rng);
            while rooms.contains_key(&room_id) {
                room_id = random_room_id(&mut rng);
            }
            (room_id, code)
        };

        let room = Room::new(room_id.clone(), code.clone(), scenario, creator)?;
        let storage = self.storage_for(&room_id)?;
        let session = RoomSession::create(room, storage, self.sink.clone(), self.clock.clone())?;

        self.rooms
            .write()
            .map_err(|_| RoomError::LockPoisoned)?
            .insert(room_id.clone(), Arc::new(SharedRoom::new(session)));
        codes.insert(code.clone(), room_id.clone());
        info!(room = %room_id, %code, scenario = scenario_id, at = %rfc3339(self.clock.now_ms()), "room created");

        Ok(CreatedRoom {
            room_id,
            code,
            role: Role::Architect,
        })
    }

    /// Join by code. Rejoining keeps the original seat; rejoining a
    /// complete room is read-only.
    pub fn join_room(&self, code: &str, participant: &str) -> Result<JoinedRoom> {
        let code = code.trim().to_ascii_uppercase();
        let room_id = self
            .codes
            .read()
            .map_err(|_| RoomError::LockPoisoned)?
            .get(&code)
            .cloned()
            .ok_or_else(|| RoomError::UnknownCode(code.clone()))?;
        let (role, read_only) = self
            .room(&room_id)?
            .transact(|room, _| Ok((room.join(participant)?, room.is_complete())))?;
        Ok(JoinedRoom {
            room_id,
            role,
            read_only,
        })
    }

    pub fn leave_room(&self, room_id: &str, participant: &str) -> Result<Role> {
        self.room(room_id)?.transact(|room, _| room.leave(participant))
    }

    pub fn start_game(&self, room_id: &str) -> Result<()> {
        self.room(room_id)?.transact(|room, now| room.start(now))
    }

    /// Upsert the participant's actions for the current turn. Resolves the
    /// turn when this completes the pair. A failed resolution is committed
    /// (room back in planning, game-error published) and then reported.
    pub fn submit_actions(&self, room_id: &str, participant: &str, actions: Vec<PlannedAction>) -> Result<SubmitReceipt> {
        let (receipt, failure) = self.room(room_id)?.transact(|room, now| {
            let turn = room.state.current_turn;
            let changed = room.submit(participant, actions, now)?;
            let (resolved, failure) = match room.try_resolve(now) {
                Resolution::Pending => (None, None),
                Resolution::Resolved(summary) => (Some(summary), None),
                Resolution::Failed(message) => (None, Some(message)),
            };
            Ok((
                SubmitReceipt {
                    turn,
                    changed,
                    resolved,
                },
                failure,
            ))
        })?;
        match failure {
            Some(message) => Err(RoomError::Resolution(message)),
            None => Ok(receipt),
        }
    }

    pub fn get_room_state(&self, room_id: &str, participant: &str) -> Result<RoomView> {
        self.room(room_id)?.read(|room| room.view(participant))?
    }

    /// Events after `after`, for at-least-once redelivery.
    pub fn events_since(&self, room_id: &str, after: u64) -> Result<Vec<EventEnvelope>> {
        self.room(room_id)?.events_since(after)
    }

    /// Timeout policy hook. Resolves every room whose planning phase has
    /// outlived `planning_timeout_ms`, treating missing sides as passes.
    /// Returns the rooms that were resolved.
    pub fn expire_overdue(&self) -> Result<Vec<RoomId>> {
        let Some(timeout) = self.config.planning_timeout_ms else {
            return Ok(Vec::new());
        };
        let rooms: Vec<(RoomId, Arc<SharedRoom>)> = self
            .rooms
            .read()
            .map_err(|_| RoomError::LockPoisoned)?
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect();

        let mut expired = Vec::new();
        for (room_id, room) in rooms {
            let fired = room.transact(|room, now| {
                if !room.is_overdue(now, timeout) {
                    return Ok(false);
                }
                info!(room = %room.id, turn = room.state.current_turn, "planning timeout, resolving with passes");
                Ok(!matches!(room.resolve_with_passes(now), Resolution::Pending))
            });
            match fired {
                Ok(true) => expired.push(room_id),
                Ok(false) => {}
                Err(e) => error!(room = %room_id, error = %e, "timeout resolution failed"),
            }
        }
        Ok(expired)
    }

    /// Lobby listing. Each line is read under its own room lock, so the
    /// list as a whole is only eventually consistent.
    pub fn list_rooms(&self) -> Result<Vec<RoomInfo>> {
        let rooms: Vec<Arc<SharedRoom>> = self
            .rooms
            .read()
            .map_err(|_| RoomError::LockPoisoned)?
            .values()
            .cloned()
            .collect();
        Ok(rooms
            .iter()
            .filter_map(|room| room.read(Room::info).ok())
            .collect())
    }
}
