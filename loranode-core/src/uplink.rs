//! Uplink cycle: gather the latest reading, decide whether it is new, submit under backpressure.

use serde::{Deserialize, Serialize};

use crate::mac::MacLayer;

/// Largest application payload we submit (smallest LoRaWAN max payload across data rates).
pub const MAX_PAYLOAD_LEN: usize = 51;

/// Default uplink port.
pub const DEFAULT_PORT: u8 = 1;

/// Default consecutive pending cycles before the MAC is reset.
pub const DEFAULT_RESET_AFTER_PENDING: u32 = 1;

/// How the data source's payload token becomes bytes.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Token is hex pairs (`"0a1b"` → `[0x0a, 0x1b]`).
    #[default]
    Hex,
    /// Token is a decimal count sent as one byte; negative means no data.
    Count,
}

/// One line from the data source.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Reading {
    pub timestamp: i64,
    pub token: String,
}

/// Latest observation, encoded and ready to submit.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PendingUplink {
    pub payload: Vec<u8>,
    pub source_timestamp: i64,
}

/// Source of the latest reading. `Ok(None)` when the source holds no reading yet.
pub trait DataSource {
    fn latest(&self) -> Result<Option<Reading>, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed reading: {0:?}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum PayloadError {
    #[error("invalid payload token {0:?}")]
    Invalid(String),
    #[error("payload of {0} bytes exceeds {MAX_PAYLOAD_LEN}")]
    TooLarge(usize),
}

/// Parse data-source text: `<timestamp> <token>` per line, last non-empty line wins.
pub fn parse_reading(text: &str) -> Result<Option<Reading>, SourceError> {
    let Some(line) = text.lines().rev().find(|l| !l.trim().is_empty()) else {
        return Ok(None);
    };
    let mut fields = line.split_whitespace();
    let timestamp = fields
        .next()
        .and_then(|t| t.parse::<i64>().ok())
        .ok_or_else(|| SourceError::Malformed(line.to_string()))?;
    let token = fields.next().unwrap_or_default().to_string();
    Ok(Some(Reading { timestamp, token }))
}

/// Encode a reading's token. Empty result means "nothing to send".
pub fn encode_payload(token: &str, encoding: PayloadEncoding) -> Result<Vec<u8>, PayloadError> {
    let payload = match encoding {
        PayloadEncoding::Hex => {
            hex::decode(token).map_err(|_| PayloadError::Invalid(token.to_string()))?
        }
        PayloadEncoding::Count => {
            if token.is_empty() {
                return Ok(Vec::new());
            }
            let n: i64 = token
                .parse()
                .map_err(|_| PayloadError::Invalid(token.to_string()))?;
            if n < 0 {
                Vec::new()
            } else {
                vec![n.min(u8::MAX as i64) as u8]
            }
        }
    };
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(PayloadError::TooLarge(payload.len()));
    }
    Ok(payload)
}

/// What one cycle did.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CycleOutcome {
    Submitted { timestamp: i64, len: usize },
    /// Nothing newer than the last submission, or an empty payload.
    NoNewData,
    SourceUnavailable(String),
    InvalidReading(String),
    /// MAC still busy with the previous transmission; nothing submitted.
    Backpressure { consecutive: u32, reset_requested: bool },
    /// MAC refused the submission; data stays unsent.
    Refused(String),
}

/// Periodic uplink driver. Tracks the timestamp of the last reading the MAC accepted.
#[derive(Debug)]
pub struct UplinkScheduler {
    port: u8,
    encoding: PayloadEncoding,
    last_submitted: Option<i64>,
    pending_cycles: u32,
    reset_after_pending: u32,
}

impl UplinkScheduler {
    pub fn new(port: u8, encoding: PayloadEncoding) -> Self {
        Self {
            port,
            encoding,
            last_submitted: None,
            pending_cycles: 0,
            reset_after_pending: DEFAULT_RESET_AFTER_PENDING,
        }
    }

    /// Consecutive pending cycles before a MAC reset is requested. 0 disables resets.
    pub fn set_reset_after_pending(&mut self, cycles: u32) {
        self.reset_after_pending = cycles;
    }

    pub fn set_last_submitted(&mut self, timestamp: i64) {
        self.last_submitted = Some(timestamp);
    }

    pub fn last_submitted(&self) -> Option<i64> {
        self.last_submitted
    }

    /// Submit only strictly newer, non-empty observations.
    pub fn decide(&self, pending: &PendingUplink) -> bool {
        if pending.payload.is_empty() {
            return false;
        }
        match self.last_submitted {
            Some(last) => pending.source_timestamp > last,
            None => true,
        }
    }

    /// One Gather → Decide → Submit pass.
    pub fn run_cycle<S, M>(&mut self, source: &S, mac: &mut M) -> CycleOutcome
    where
        S: DataSource + ?Sized,
        M: MacLayer + ?Sized,
    {
        let reading = match source.latest() {
            Ok(Some(r)) => r,
            Ok(None) => return CycleOutcome::NoNewData,
            Err(SourceError::Unavailable(reason)) => {
                tracing::warn!(%reason, "data source unavailable, skipping cycle");
                return CycleOutcome::SourceUnavailable(reason);
            }
            Err(e) => {
                tracing::warn!(error = %e, "unreadable data source, skipping cycle");
                return CycleOutcome::InvalidReading(e.to_string());
            }
        };
        tracing::debug!(timestamp = reading.timestamp, token = %reading.token, "gathered reading");

        let payload = match encode_payload(&reading.token, self.encoding) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, timestamp = reading.timestamp, "skipping reading");
                return CycleOutcome::InvalidReading(e.to_string());
            }
        };
        let pending = PendingUplink {
            payload,
            source_timestamp: reading.timestamp,
        };
        if !self.decide(&pending) {
            tracing::debug!(
                timestamp = pending.source_timestamp,
                last_submitted = ?self.last_submitted,
                "no new data"
            );
            return CycleOutcome::NoNewData;
        }

        if mac.is_transmission_pending() {
            self.pending_cycles += 1;
            let reset_requested =
                self.reset_after_pending > 0 && self.pending_cycles >= self.reset_after_pending;
            tracing::warn!(
                consecutive = self.pending_cycles,
                reset_requested,
                "transmission pending, not sending"
            );
            let consecutive = self.pending_cycles;
            if reset_requested {
                self.pending_cycles = 0;
            }
            return CycleOutcome::Backpressure {
                consecutive,
                reset_requested,
            };
        }
        self.pending_cycles = 0;

        match mac.submit_uplink(self.port, &pending.payload) {
            Ok(()) => {
                self.last_submitted = Some(pending.source_timestamp);
                tracing::info!(
                    timestamp = pending.source_timestamp,
                    len = pending.payload.len(),
                    port = self.port,
                    "uplink submitted"
                );
                CycleOutcome::Submitted {
                    timestamp: pending.source_timestamp,
                    len: pending.payload.len(),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "mac refused uplink");
                CycleOutcome::Refused(e.to_string())
            }
        }
    }
}
