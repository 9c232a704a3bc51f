//! Device identity from the connection file.
//!
//! Five labeled lines, each followed by space-separated hex bytes (`0x26` or `26`):
//! `APPEUI` (8), `DEVEUI` (8), `DEVKEY` (16, network session key), `ARTKEY` (16, application
//! session key) and `DEVADDR` (4, big-endian). All five are required.

use crate::session::{SessionKey, SessionKeys};

/// Parsed device identity.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ConnectionConfig {
    pub app_eui: [u8; 8],
    pub dev_eui: [u8; 8],
    pub network_key: SessionKey,
    pub application_key: SessionKey,
    pub device_address: u32,
}

impl ConnectionConfig {
    pub fn session_keys(&self) -> SessionKeys {
        SessionKeys {
            network_key: self.network_key,
            application_key: self.application_key,
            device_address: self.device_address,
        }
    }
}

// Order matters: DEVADDR must not be shadowed by a shorter label.
const LABELS: [&str; 5] = ["APPEUI", "DEVEUI", "DEVKEY", "ARTKEY", "DEVADDR"];

/// Parse the connection file contents.
pub fn parse(text: &str) -> Result<ConnectionConfig, ConnectionError> {
    let mut app_eui = None;
    let mut dev_eui = None;
    let mut network_key = None;
    let mut application_key = None;
    let mut device_address = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(label) = LABELS.iter().copied().find(|l| line.starts_with(l)) else {
            tracing::warn!(line, "unknown identifier in connection file");
            continue;
        };
        let values = &line[label.len()..];
        match label {
            "APPEUI" => app_eui = Some(parse_bytes::<8>(label, values)?),
            "DEVEUI" => dev_eui = Some(parse_bytes::<8>(label, values)?),
            "DEVKEY" => network_key = Some(parse_bytes::<16>(label, values)?),
            "ARTKEY" => application_key = Some(parse_bytes::<16>(label, values)?),
            _ => device_address = Some(u32::from_be_bytes(parse_bytes::<4>(label, values)?)),
        }
    }

    Ok(ConnectionConfig {
        app_eui: app_eui.ok_or(ConnectionError::Missing("APPEUI"))?,
        dev_eui: dev_eui.ok_or(ConnectionError::Missing("DEVEUI"))?,
        network_key: network_key.ok_or(ConnectionError::Missing("DEVKEY"))?,
        application_key: application_key.ok_or(ConnectionError::Missing("ARTKEY"))?,
        device_address: device_address.ok_or(ConnectionError::Missing("DEVADDR"))?,
    })
}

fn parse_bytes<const N: usize>(
    label: &'static str,
    values: &str,
) -> Result<[u8; N], ConnectionError> {
    let mut out = [0u8; N];
    let mut count = 0usize;
    for token in values.split_whitespace() {
        if count == N {
            return Err(ConnectionError::Length {
                label,
                expected: N,
                got: values.split_whitespace().count(),
            });
        }
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.is_empty() || digits.len() > 2 {
            return Err(ConnectionError::BadByte {
                label,
                token: token.to_string(),
            });
        }
        out[count] = u8::from_str_radix(digits, 16).map_err(|_| ConnectionError::BadByte {
            label,
            token: token.to_string(),
        })?;
        count += 1;
    }
    if count != N {
        return Err(ConnectionError::Length {
            label,
            expected: N,
            got: count,
        });
    }
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection file is missing {0}")]
    Missing(&'static str),
    #[error("{label}: expected {expected} bytes, got {got}")]
    Length {
        label: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{label}: invalid hex byte {token:?}")]
    BadByte { label: &'static str, token: String },
}
