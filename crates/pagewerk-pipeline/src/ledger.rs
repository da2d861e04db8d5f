// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Idempotency ledger: an append-only text file of completed source paths, one
// absolute path per line, mirrored by an in-memory set.
//
// The set and the file are updated under one lock, and the set only learns a
// path after the line has reached the disk. A restarted service therefore
// never skips a document whose completion was not durably recorded.
//
// Lines are escaped so every path reads back byte for byte: `\\`, `\n`, and
// `\r` for those characters, `\xHH` for bytes that are not UTF-8. Ordinary
// paths are stored as they are.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pagewerk_core::error::{PagewerkError, Result};
use tracing::{debug, info, instrument, warn};

struct LedgerState {
    entries: HashSet<PathBuf>,
    file: File,
    /// The file may end in a torn record; start the next one on a fresh line.
    needs_separator: bool,
}

/// Durable record of fully processed source documents.
pub struct Ledger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// Load the ledger at `path`, creating it (and its folder) if missing.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| ledger_err(&path, err))?;
        }

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(ledger_err(&path, err)),
        };

        let mut entries = HashSet::new();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            match decode_path(line) {
                Some(entry) => {
                    entries.insert(entry);
                }
                None => warn!(line, "Ignoring malformed ledger line"),
            }
        }
        let needs_separator = !text.is_empty() && !text.ends_with('\n');

        let file = open_append(&path)?;
        info!(entries = entries.len(), "Ledger loaded");

        Ok(Self {
            path,
            state: Mutex::new(LedgerState {
                entries,
                file,
                needs_separator,
            }),
        })
    }

    /// Whether `source` can be written to the ledger on this platform.
    ///
    /// Always true on Unix. Elsewhere the path must be valid Unicode.
    pub fn can_record(source: &Path) -> bool {
        path_bytes(source).is_some()
    }

    /// Whether `source` has already been fully processed.
    pub fn contains(&self, source: &Path) -> bool {
        self.lock().entries.contains(source)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record `source` as completed.
    ///
    /// Returns `Ok(false)` without writing when the path is already present.
    /// A failed write leaves the in-memory set untouched.
    #[instrument(skip(self), fields(source = %source.display()))]
    pub fn append(&self, source: &Path) -> Result<bool> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.entries.contains(source) {
            debug!("Already ledgered");
            return Ok(false);
        }

        let encoded = encode_path(source).ok_or_else(|| {
            PagewerkError::LedgerWrite(format!("{} cannot be recorded", source.display()))
        })?;
        let mut record = String::with_capacity(encoded.len() + 2);
        if state.needs_separator {
            record.push('\n');
        }
        record.push_str(&encoded);
        record.push('\n');

        let length_before = state.file.metadata().map(|meta| meta.len()).ok();
        let written = state
            .file
            .write_all(record.as_bytes())
            .and_then(|()| state.file.sync_data());
        if let Err(err) = written {
            // Cut off whatever part of the record landed.
            if let Some(len) = length_before {
                if let Err(trim) = state.file.set_len(len) {
                    debug!(error = %trim, "Cannot trim torn ledger record");
                }
            }
            state.needs_separator = true;
            return Err(ledger_err(&self.path, err));
        }

        state.needs_separator = false;
        state.entries.insert(source.to_path_buf());
        debug!("Ledger entry appended");
        Ok(true)
    }

    /// Forget every entry, on disk and in memory.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock();
        let cleared = state.entries.len();
        File::create(&self.path).map_err(|err| ledger_err(&self.path, err))?;
        state.file = open_append(&self.path)?;
        state.entries.clear();
        state.needs_separator = false;
        warn!(cleared, "Ledger reset");
        Ok(())
    }

    /// Snapshot of all entries, sorted.
    pub fn entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = self.lock().entries.iter().cloned().collect();
        entries.sort();
        entries
    }

    /// Swap the append handle for a read-only one so every write fails.
    #[cfg(test)]
    pub(crate) fn make_read_only(&self) -> std::io::Result<()> {
        let mut state = self.lock();
        state.file = File::open(&self.path)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| ledger_err(path, err))
}

fn ledger_err(path: &Path, err: std::io::Error) -> PagewerkError {
    PagewerkError::LedgerWrite(format!("{}: {err}", path.display()))
}

fn encode_path(path: &Path) -> Option<String> {
    let bytes = path_bytes(path)?;
    let mut line = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        for ch in chunk.valid().chars() {
            match ch {
                '\\' => line.push_str("\\\\"),
                '\n' => line.push_str("\\n"),
                '\r' => line.push_str("\\r"),
                other => line.push(other),
            }
        }
        for byte in chunk.invalid() {
            let _ = write!(line, "\\x{byte:02x}");
        }
    }
    Some(line)
}

fn decode_path(line: &str) -> Option<PathBuf> {
    let mut bytes = Vec::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next()? {
            '\\' => bytes.push(b'\\'),
            'n' => bytes.push(b'\n'),
            'r' => bytes.push(b'\r'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return None;
                }
                bytes.push(u8::from_str_radix(&hex, 16).ok()?);
            }
            _ => return None,
        }
    }
    path_from_bytes(bytes)
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Option<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Some(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Option<&[u8]> {
    path.to_str().map(str::as_bytes)
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    String::from_utf8(bytes).ok().map(PathBuf::from)
}
