//! File-backed session store: text counter record plus an optional binary key record.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use loranode_core::record;
use loranode_core::{Session, SessionKeys, SessionStore, StoreError};

use crate::fsutil::atomic_write;

pub struct FileSessionStore {
    counters_path: PathBuf,
    keys_path: Option<PathBuf>,
    /// Keys last written to `keys_path`; the key record is only rewritten when they change.
    written_keys: Option<SessionKeys>,
}

impl FileSessionStore {
    pub fn new(counters_path: impl Into<PathBuf>) -> Self {
        Self {
            counters_path: counters_path.into(),
            keys_path: None,
            written_keys: None,
        }
    }

    /// Also persist the session identity, so a restart does not depend on the connection file.
    pub fn with_keys_file(mut self, keys_path: impl Into<PathBuf>) -> Self {
        self.keys_path = Some(keys_path.into());
        self
    }

    pub fn counters_path(&self) -> &Path {
        &self.counters_path
    }

    /// Keys from the key record, or `configured` when there is none. A damaged record also
    /// yields `configured`; it must not cost the counters, which are loaded separately.
    fn load_keys(&self, configured: SessionKeys) -> SessionKeys {
        let Some(path) = &self.keys_path else {
            return configured;
        };
        match fs::read(path) {
            Ok(bytes) => match record::decode_keys(&bytes) {
                Ok(keys) => keys,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "damaged key record, using connection keys");
                    configured
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => configured,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "unreadable key record, using connection keys");
                configured
            }
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, keys: SessionKeys) -> Result<Session, StoreError> {
        let keys = self.load_keys(keys);
        let path = &self.counters_path;
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no stored frame counters, starting from 0");
                return Ok(Session::new(keys));
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(StoreError::Corrupt(format!("{}: {e}", path.display())));
            }
            Err(e) => return Err(StoreError::Unavailable(format!("{}: {e}", path.display()))),
        };
        let (uplink_counter, downlink_counter) = record::decode_counters(&text)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
        Ok(Session {
            uplink_counter,
            downlink_counter,
            keys,
        })
    }

    fn persist(&mut self, session: &Session) -> Result<(), StoreError> {
        if let Some(path) = &self.keys_path {
            if self.written_keys != Some(session.keys) {
                let bytes = record::encode_keys(&session.keys)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                atomic_write(path, &bytes)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
                self.written_keys = Some(session.keys);
            }
        }
        let text = record::encode_counters(session.uplink_counter, session.downlink_counter);
        atomic_write(&self.counters_path, text.as_bytes()).map_err(|e| {
            StoreError::Unavailable(format!("{}: {e}", self.counters_path.display()))
        })?;
        tracing::debug!(
            uplink = session.uplink_counter,
            downlink = session.downlink_counter,
            "updated frame counters"
        );
        Ok(())
    }
}
