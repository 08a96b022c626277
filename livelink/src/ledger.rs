//! Audit Ledger
//!
//! Append-only, newline-delimited JSON record of every proposed and executed
//! link/unlink action. Each `append` is written with a single `write_all` and
//! synced before returning, so a crash can at worst leave one partial final
//! line; earlier lines are never rewritten.
//!
//! The ledger doubles as the input to rollback: the unlink workflow discovers
//! what to reverse only from `linked` entries. A replay links the `proposed`
//! entries that never reached `linked`.
//!
//! # Line format
//! ```text
//! {"timestamp":"2025-03-14T09:15:02.123Z","action":"linked","photo_id":"…","photo_filename":"IMG_1.HEIC","video_id":"…","video_filename":"IMG_1_3.MOV"}
//! ```
//! `error` is present on failed actions, and on `linked` entries whose
//! read-back verification could not complete.

use crate::models::{AssetId, CandidatePair};
use crate::run_mode::RunMode;
use chrono::{DateTime, Utc};
use livelink_common::time::file_stamp;
use livelink_common::LedgerError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extension for ledger files
pub const LEDGER_EXTENSION: &str = "jsonl";

/// Upper bound on `_N` suffixes tried when a derived name is taken
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Kind of action a ledger line records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerAction {
    Proposed,
    Linked,
    LinkFailed,
    Unlinked,
    UnlinkFailed,
}

/// One durable audit row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub action: LedgerAction,
    pub photo_id: AssetId,
    pub photo_filename: String,
    pub video_id: AssetId,
    pub video_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LedgerEntry {
    pub fn for_pair(pair: &CandidatePair, action: LedgerAction) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            photo_id: pair.photo_id,
            photo_filename: pair.photo_filename.clone(),
            video_id: pair.video_id,
            video_filename: pair.video_filename.clone(),
            error: None,
        }
    }

    /// Same pair, new action, fresh timestamp
    pub fn follow_up(&self, action: LedgerAction) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            error: None,
            ..self.clone()
        }
    }

    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error = Some(detail.into());
        self
    }

    pub fn pair_key(&self) -> (AssetId, AssetId) {
        (self.photo_id, self.video_id)
    }
}

/// Result of a tolerant read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Entries from every complete line
    pub entries: Vec<LedgerEntry>,
    /// File ended in a line without its newline (still being written, or torn)
    pub partial_tail: bool,
}

/// Append handle on a ledger file
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    file: File,
    appended: usize,
}

impl Ledger {
    /// Open `path` for appending, creating it if missing
    ///
    /// Never truncates. A file ending in a partial line is refused: appending
    /// after it would fuse the torn line with the next entry.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }

        match fs::read(&path) {
            Ok(existing) => {
                if !existing.is_empty() && existing.last() != Some(&b'\n') {
                    return Err(LedgerError::Truncated {
                        line: count_lines(&existing) + 1,
                        path,
                    });
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(LedgerError::io(&path, e)),
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LedgerError::io(&path, e))?;
        debug!(path = %path.display(), "Ledger opened for append");

        Ok(Self {
            path,
            file,
            appended: 0,
        })
    }

    /// Create a fresh ledger under `dir` for one run
    ///
    /// The name is `<PREFIX><workflow>_ledger_<stamp>.jsonl`; a taken name gets
    /// `_1`, `_2`, … appended. Existing files are never opened.
    pub fn create_for_run(
        dir: impl AsRef<Path>,
        workflow: &str,
        mode: RunMode,
        at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;

        let base = format!("{}{}_ledger_{}", mode.ledger_prefix(), workflow, file_stamp(at));
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}.{}", base, LEDGER_EXTENSION)
            } else {
                format!("{}_{}.{}", base, attempt, LEDGER_EXTENSION)
            };
            let path = dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    info!(path = %path.display(), "Ledger created");
                    return Ok(Self {
                        path,
                        file,
                        appended: 0,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(LedgerError::io(&path, e)),
            }
        }

        Err(LedgerError::io(
            dir.join(base),
            std::io::Error::new(ErrorKind::AlreadyExists, "no free ledger file name"),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries appended through this handle
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Write one entry and sync it to storage before returning
    pub fn append(&mut self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut line =
            serde_json::to_string(entry).map_err(|e| LedgerError::Encode(e.to_string()))?;
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.sync_data())
            .map_err(|e| LedgerError::io(&self.path, e))?;
        self.appended += 1;
        Ok(())
    }

    /// Strict load: every line must be complete and well-formed
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<LedgerEntry>, LedgerError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| LedgerError::io(path, e))?;
        let snapshot = parse(path, &bytes)?;
        if snapshot.partial_tail {
            return Err(LedgerError::Truncated {
                path: path.to_path_buf(),
                line: count_lines(&bytes) + 1,
            });
        }
        Ok(snapshot.entries)
    }

    /// Tolerant load for a file that may still be growing
    ///
    /// Stops cleanly at the last complete line. Complete lines that fail to
    /// decode are still an error.
    pub fn read_complete(path: impl AsRef<Path>) -> Result<LedgerSnapshot, LedgerError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| LedgerError::io(path, e))?;
        parse(path, &bytes)
    }
}

/// Links recorded as `linked` and not yet reversed
///
/// A pair counts once even if linked twice; any `unlinked` or
/// `unlink-failed` entry for the pair removes it. Ledger order is preserved.
pub fn outstanding_links(entries: &[LedgerEntry]) -> Vec<LedgerEntry> {
    let reversed: HashSet<(AssetId, AssetId)> = entries
        .iter()
        .filter(|e| matches!(e.action, LedgerAction::Unlinked | LedgerAction::UnlinkFailed))
        .map(LedgerEntry::pair_key)
        .collect();

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| e.action == LedgerAction::Linked)
        .filter(|e| !reversed.contains(&e.pair_key()))
        .filter(|e| seen.insert(e.pair_key()))
        .cloned()
        .collect()
}

/// Proposals with no `linked` entry for the same pair, ledger order
///
/// These are the pairs a replay links: everything from a dry-run ledger, and
/// pairs whose link failed or was never attempted. Each pair counts once.
pub fn unapplied_proposals(entries: &[LedgerEntry]) -> Vec<LedgerEntry> {
    let linked: HashSet<(AssetId, AssetId)> = entries
        .iter()
        .filter(|e| e.action == LedgerAction::Linked)
        .map(LedgerEntry::pair_key)
        .collect();

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| e.action == LedgerAction::Proposed)
        .filter(|e| !linked.contains(&e.pair_key()))
        .filter(|e| seen.insert(e.pair_key()))
        .cloned()
        .collect()
}

fn parse(path: &Path, bytes: &[u8]) -> Result<LedgerSnapshot, LedgerError> {
    let complete_len = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let (complete, tail) = bytes.split_at(complete_len);

    let mut entries = Vec::new();
    for (idx, raw) in complete.split(|b| *b == b'\n').enumerate() {
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let entry = serde_json::from_slice::<LedgerEntry>(raw).map_err(|e| {
            LedgerError::Malformed {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: e.to_string(),
            }
        })?;
        entries.push(entry);
    }

    Ok(LedgerSnapshot {
        entries,
        partial_tail: !tail.is_empty(),
    })
}

fn count_lines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| **b == b'\n').count()
}
