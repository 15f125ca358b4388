//! Snapshot layer — hashed room snapshots.
//!
//! A snapshot is the whole room aggregate as JSON, plus:
//!   - `hash`: SHA-256 of that JSON (file integrity)
//!   - `match_hash`: the engine's canonical hash of the match state
//!
//! Restore verifies both, recomputes scorecards and re-checks invariants.
//! Files live at `<dir>/snapshot_NNNNNN.json`, NNNNNN being the sequence of
//! the last event the room had committed.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use negotiation_engine::hashing::{canonical_hash, sha256_hex};
use negotiation_engine::ENGINE_VERSION;

use crate::error::{Result, RoomError};
use crate::room::Room;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomSnapshot {
    pub sequence: u64,
    pub room_id: String,
    pub engine_version: u32,
    pub match_hash: String,
    pub room_json: String,
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

pub fn encode_room(room: &Room) -> Result<String> {
    Ok(serde_json::to_string(room)?)
}

/// Strict decode. Unknown or missing fields fail. No invariant checks.
pub fn decode_room(json: &str) -> Result<Room> {
    serde_json::from_str(json).map_err(|e| RoomError::Storage(format!("bad room snapshot: {e}")))
}

pub fn snapshot_of(room: &Room) -> Result<RoomSnapshot> {
    let room_json = encode_room(room)?;
    Ok(RoomSnapshot {
        sequence: room.last_sequence,
        room_id: room.id.clone(),
        engine_version: ENGINE_VERSION,
        match_hash: canonical_hash(&room.state).map_err(|e| RoomError::Storage(e.to_string()))?,
        hash: sha256_hex(room_json.as_bytes()),
        room_json,
    })
}

pub fn verify_snapshot_hash(snap: &RoomSnapshot) -> bool {
    sha256_hex(snap.room_json.as_bytes()) == snap.hash
}

/// Decode and validate a snapshot:
///   1. file hash
///   2. engine version
///   3. strict decode
///   4. scorecard recomputation + invariants
///   5. canonical match hash
pub fn restore_room(snap: &RoomSnapshot) -> Result<Room> {
    if !verify_snapshot_hash(snap) {
        return Err(RoomError::Storage(format!(
            "snapshot {} of room {}: hash mismatch",
            snap.sequence, snap.room_id
        )));
    }
    if snap.engine_version != ENGINE_VERSION {
        return Err(RoomError::Storage(format!(
            "snapshot {} of room {}: engine version {} (expected {})",
            snap.sequence, snap.room_id, snap.engine_version, ENGINE_VERSION
        )));
    }
    let mut room = decode_room(&snap.room_json)?;
    if room.id != snap.room_id || room.last_sequence != snap.sequence {
        return Err(RoomError::Storage(format!(
            "snapshot {} of room {}: header does not match content",
            snap.sequence, snap.room_id
        )));
    }
    room.recover()?;
    let recomputed = canonical_hash(&room.state).map_err(|e| RoomError::Storage(e.to_string()))?;
    if recomputed != snap.match_hash {
        return Err(RoomError::Storage(format!(
            "snapshot {} of room {}: match hash mismatch",
            snap.sequence, snap.room_id
        )));
    }
    Ok(room)
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

fn file_name(sequence: u64) -> String {
    format!("snapshot_{:06}.json", sequence)
}

/// Write a snapshot of `room`. Temp file + rename, then fsync.
pub fn save_snapshot(dir: &Path, room: &Room) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let snap = snapshot_of(room)?;
    let content = serde_json::to_string(&snap)?;

    let path = dir.join(file_name(snap.sequence));
    let tmp = dir.join(format!("{}.tmp", file_name(snap.sequence)));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, &path)?;
    debug!(room = %room.id, sequence = snap.sequence, "snapshot written");
    Ok(path)
}

pub fn load_snapshot(dir: &Path, sequence: u64) -> Result<Option<RoomSnapshot>> {
    let path = dir.join(file_name(sequence));
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let snap: RoomSnapshot = serde_json::from_str(&content)
        .map_err(|e| RoomError::Storage(format!("{}: {e}", path.display())))?;
    Ok(Some(snap))
}

/// Snapshot sequences present in `dir`, ascending.
pub fn list_sequences(dir: &Path) -> io::Result<Vec<u64>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut seqs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if let Some(seq) = name_str
            .strip_prefix("snapshot_")
            .and_then(|s| s.strip_suffix(".json"))
            .and_then(|s| s.parse::<u64>().ok())
        {
            seqs.push(seq);
        }
    }
    seqs.sort_unstable();
    Ok(seqs)
}

/// Newest snapshot that loads and verifies. Bad ones are skipped.
pub fn load_latest_verified(dir: &Path) -> Result<Option<Room>> {
    for seq in list_sequences(dir)?.into_iter().rev() {
        let attempt = load_snapshot(dir, seq).and_then(|snap| match snap {
            Some(snap) => restore_room(&snap).map(Some),
            None => Ok(None),
        });
        match attempt {
            Ok(Some(room)) => return Ok(Some(room)),
            Ok(None) => {}
            Err(e) => warn!(dir = %dir.display(), sequence = seq, error = %e, "skipping unusable snapshot"),
        }
    }
    Ok(None)
}

/// Delete all but the newest `keep` snapshots. Returns how many went.
pub fn prune(dir: &Path, keep: usize) -> io::Result<usize> {
    let seqs = list_sequences(dir)?;
    let excess = seqs.len().saturating_sub(keep.max(1));
    for seq in &seqs[..excess] {
        fs::remove_file(dir.join(file_name(*seq)))?;
    }
    Ok(excess)
}
