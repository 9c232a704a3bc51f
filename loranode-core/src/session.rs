//! Session state: frame counters and session identity, plus the store contract.

use serde::{Deserialize, Serialize};

/// AES-128 session key (16 bytes). Opaque here; crypto lives in the MAC and decrypt collaborators.
pub type SessionKey = [u8; 16];

/// Session identity: the part of the session that does not change per frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionKeys {
    pub network_key: SessionKey,
    pub application_key: SessionKey,
    pub device_address: u32,
}

/// Live LoRaWAN session. Counters never decrease, including across restarts.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Session {
    pub uplink_counter: u32,
    /// Next application-level downlink counter we expect (last processed + 1).
    pub downlink_counter: u32,
    pub keys: SessionKeys,
}

impl Session {
    /// Fresh session: both counters at zero.
    pub fn new(keys: SessionKeys) -> Self {
        Self {
            uplink_counter: 0,
            downlink_counter: 0,
            keys,
        }
    }

    /// Take the uplink counter reported by the MAC. Never moves backwards.
    /// Returns true if the counter changed.
    pub fn observe_uplink_counter(&mut self, reported: u32) -> bool {
        if reported > self.uplink_counter {
            self.uplink_counter = reported;
            true
        } else {
            false
        }
    }

    pub fn device_address(&self) -> u32 {
        self.keys.device_address
    }
}

/// Durable session persistence. `persist` overwrites the whole record.
pub trait SessionStore {
    /// Load the persisted session. Missing record: counters at 0 with `keys`.
    fn load(&self, keys: SessionKeys) -> Result<Session, StoreError>;

    /// Persist the whole session. Must be durable before returning.
    fn persist(&mut self, session: &Session) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("persisted session record is corrupt: {0}")]
    Corrupt(String),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// In-memory store. Used by hosts without a filesystem and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Option<Session>,
    writes: u64,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a record, as if persisted by an earlier process.
    pub fn with_record(session: Session) -> Self {
        Self {
            record: Some(session),
            ..Self::default()
        }
    }

    /// Make every following `persist` fail with `StoreError::Unavailable`.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Number of successful `persist` calls.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn record(&self) -> Option<&Session> {
        self.record.as_ref()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, keys: SessionKeys) -> Result<Session, StoreError> {
        Ok(self.record.unwrap_or_else(|| Session::new(keys)))
    }

    fn persist(&mut self, session: &Session) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        self.record = Some(*session);
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_keys() -> SessionKeys {
    SessionKeys {
        network_key: [0x11; 16],
        application_key: [0x22; 16],
        device_address: 0x2601_1BDA,
    }
}
