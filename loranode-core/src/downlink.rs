//! Downlink path: decrypt, freshness check against the session, grammar check, publish.
//!
//! Every failure here is local to the downlink and reported as a `DownlinkOutcome`; only a
//! failed counter write escapes as `Err(StoreError)`, since losing a counter update risks replay.

use crate::command::{ValidatedCommand, ValidationRejected, USAGE};
use crate::session::{Session, SessionKey, SessionStore, StoreError};

/// Decrypted downlink text: `<counter> <command>`.
pub type Plaintext = String;

/// External decryption step. Opaque to the node.
pub trait Decryptor {
    fn decrypt(&self, key: &SessionKey, ciphertext: &[u8]) -> Result<Plaintext, DecryptError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    /// Collaborator could not be invoked or timed out.
    #[error("decryptor unavailable: {0}")]
    Unavailable(String),
    /// Collaborator ran but produced no usable plaintext.
    #[error("decryption failed: {0}")]
    Failed(String),
}

/// Publication point for accepted commands. Keeps only the latest.
pub trait CommandSink {
    fn publish(&mut self, command: &ValidatedCommand) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("command sink unavailable: {0}")]
    Unavailable(String),
}

/// One received downlink. Lives for a single transmission-complete event.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DownlinkEnvelope {
    pub ciphertext: Vec<u8>,
    /// MAC delivery-order counter; diagnostic only.
    pub mac_downlink_counter: u32,
}

/// Result of processing one downlink.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DownlinkOutcome {
    Published {
        counter: u32,
        command: ValidatedCommand,
    },
    /// Embedded counter below the session's; nothing mutated.
    ReplaySuspected { embedded: u32, expected: u32 },
    /// Embedded counter is u32::MAX; the session cannot advance past it.
    CounterExhausted,
    DecryptUnavailable(String),
    DecryptFailed(String),
    /// Counter advanced, command discarded.
    ValidationRejected { counter: u32, raw: String },
    /// Counter advanced, command lost.
    SinkUnavailable {
        command: ValidatedCommand,
        reason: String,
    },
}

impl DownlinkOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, DownlinkOutcome::Published { .. })
    }
}

/// Split `<counter> <command>` on the first space.
pub fn split_plaintext(plaintext: &str) -> Option<(u32, &str)> {
    let (counter, command) = plaintext.split_once(' ')?;
    let counter = counter.parse::<u32>().ok()?;
    Some((counter, command))
}

/// Owns the decrypt and publish collaborators; session and store are shared with the uplink path.
pub struct DownlinkProcessor<D, K> {
    decryptor: D,
    sink: K,
}

impl<D: Decryptor, K: CommandSink> DownlinkProcessor<D, K> {
    pub fn new(decryptor: D, sink: K) -> Self {
        Self { decryptor, sink }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn decryptor(&self) -> &D {
        &self.decryptor
    }

    /// Process one downlink. Persists the advanced downlink counter before validating, so a
    /// rejected or unpublished command still consumes its counter.
    pub fn process<S: SessionStore + ?Sized>(
        &mut self,
        session: &mut Session,
        store: &mut S,
        envelope: &DownlinkEnvelope,
    ) -> Result<DownlinkOutcome, StoreError> {
        tracing::debug!(
            len = envelope.ciphertext.len(),
            mac_downlink_counter = envelope.mac_downlink_counter,
            ciphertext = %hex::encode(&envelope.ciphertext),
            "processing downlink"
        );

        let plaintext = match self
            .decryptor
            .decrypt(&session.keys.application_key, &envelope.ciphertext)
        {
            Ok(p) => p,
            Err(DecryptError::Unavailable(reason)) => {
                tracing::error!(%reason, "decryptor unavailable, downlink discarded");
                return Ok(DownlinkOutcome::DecryptUnavailable(reason));
            }
            Err(DecryptError::Failed(reason)) => {
                tracing::error!(%reason, "decryption failed, downlink discarded");
                return Ok(DownlinkOutcome::DecryptFailed(reason));
            }
        };

        let Some((embedded, raw_command)) = split_plaintext(&plaintext) else {
            tracing::error!(plaintext = %plaintext, "decrypted downlink has no counter");
            return Ok(DownlinkOutcome::DecryptFailed(format!(
                "malformed plaintext {plaintext:?}"
            )));
        };

        let expected = session.downlink_counter;
        tracing::info!(embedded, local = expected, "downlink counters");
        if embedded < expected {
            tracing::warn!(embedded, expected, "stale downlink counter, possible replay");
            return Ok(DownlinkOutcome::ReplaySuspected { embedded, expected });
        }
        let Some(next) = embedded.checked_add(1) else {
            tracing::error!(embedded, "downlink counter exhausted, session must be renewed");
            return Ok(DownlinkOutcome::CounterExhausted);
        };
        if embedded > expected {
            tracing::warn!(
                missed = embedded - expected,
                "downlinks missed, resynchronizing counter"
            );
        }
        session.downlink_counter = next;
        if let Err(e) = store.persist(session) {
            session.downlink_counter = expected;
            return Err(e);
        }

        let command = match ValidatedCommand::parse(raw_command) {
            Ok(c) => c,
            Err(ValidationRejected { raw }) => {
                tracing::warn!(command = %raw, available = ?USAGE, "invalid command received");
                return Ok(DownlinkOutcome::ValidationRejected {
                    counter: embedded,
                    raw,
                });
            }
        };

        match self.sink.publish(&command) {
            Ok(()) => {
                tracing::info!(command = %command, counter = embedded, "command published");
                Ok(DownlinkOutcome::Published {
                    counter: embedded,
                    command,
                })
            }
            Err(SinkError::Unavailable(reason)) => {
                tracing::error!(command = %command, %reason, "command lost, sink unavailable");
                Ok(DownlinkOutcome::SinkUnavailable { command, reason })
            }
        }
    }
}

/// Decryptor returning a fixed result, and a sink that records what it was given.
#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::cell::RefCell;

    pub struct FixedDecryptor {
        pub result: RefCell<Option<Result<Plaintext, DecryptError>>>,
        pub calls: RefCell<Vec<(SessionKey, Vec<u8>)>>,
    }

    impl FixedDecryptor {
        pub fn ok(plaintext: &str) -> Self {
            Self::with(Ok(plaintext.to_string()))
        }

        pub fn with(result: Result<Plaintext, DecryptError>) -> Self {
            Self {
                result: RefCell::new(Some(result)),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn set(&self, plaintext: &str) {
            *self.result.borrow_mut() = Some(Ok(plaintext.to_string()));
        }
    }

    impl Decryptor for FixedDecryptor {
        fn decrypt(&self, key: &SessionKey, ciphertext: &[u8]) -> Result<Plaintext, DecryptError> {
            self.calls.borrow_mut().push((*key, ciphertext.to_vec()));
            match self.result.borrow().as_ref() {
                Some(Ok(p)) => Ok(p.clone()),
                Some(Err(DecryptError::Unavailable(r))) => Err(DecryptError::Unavailable(r.clone())),
                Some(Err(DecryptError::Failed(r))) => Err(DecryptError::Failed(r.clone())),
                None => Err(DecryptError::Unavailable("no result scripted".into())),
            }
        }
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub published: Vec<String>,
        pub fail: bool,
    }

    impl CommandSink for RecordingSink {
        fn publish(&mut self, command: &ValidatedCommand) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Unavailable("disk full".into()));
            }
            self.published.push(command.as_str().to_string());
            Ok(())
        }
    }
}
