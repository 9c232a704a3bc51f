//! MAC bridge line protocol: one ASCII line per message, fields separated by single spaces,
//! byte strings as lowercase hex.
//!
//! Node → MAC: `RESET`, `SESSION <netid> <devaddr> <nwkskey> <appskey> <fcntup> <fcntdn>`,
//! `TX <port> <payload>`.
//! MAC → node: `JOINED`, `TXCOMPLETE <fcntup> <fcntdn> <ack> [<payload>]`, `JOIN_FAILED`,
//! `RESET`, anything else is passed through as `MacEvent::Other`.

use crate::mac::{MacEvent, SessionParams, TxComplete};

/// Longest line accepted from the MAC (a 255-byte frame as hex plus header).
pub const MAX_LINE_LEN: usize = 640;

/// Commands sent to the MAC bridge.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MacCommand {
    Reset,
    Session(SessionParams),
    Tx { port: u8, payload: Vec<u8> },
}

/// Encode a command as one line, without the trailing newline.
pub fn encode_command(cmd: &MacCommand) -> String {
    match cmd {
        MacCommand::Reset => "RESET".to_string(),
        MacCommand::Session(p) => format!(
            "SESSION {} {:08x} {} {} {} {}",
            p.net_id,
            p.device_address,
            hex::encode(p.network_key),
            hex::encode(p.application_key),
            p.uplink_counter,
            p.downlink_counter
        ),
        MacCommand::Tx { port, payload } => format!("TX {} {}", port, hex::encode(payload)),
    }
}

/// Decode one event line (trailing `\r`/`\n` allowed).
pub fn decode_event(line: &str) -> Result<MacEvent, WireError> {
    if line.len() > MAX_LINE_LEN {
        return Err(WireError::TooLong(line.len()));
    }
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.split(' ');
    let kind = fields.next().unwrap_or_default();
    match kind {
        "JOINED" => Ok(MacEvent::Joined),
        "JOIN_FAILED" => Ok(MacEvent::JoinFailed),
        "RESET" => Ok(MacEvent::Reset),
        "TXCOMPLETE" => {
            let uplink_counter = parse_u32(fields.next(), "fcntup")?;
            let mac_downlink_counter = parse_u32(fields.next(), "fcntdn")?;
            let ack = match fields.next() {
                Some("0") => false,
                Some("1") => true,
                other => return Err(WireError::BadField("ack", other.unwrap_or_default().into())),
            };
            let payload = match fields.next() {
                None | Some("") => Vec::new(),
                Some(h) => hex::decode(h).map_err(|_| WireError::BadField("payload", h.into()))?,
            };
            if let Some(extra) = fields.next() {
                return Err(WireError::BadField("trailing", extra.into()));
            }
            Ok(MacEvent::TransmissionComplete(TxComplete {
                uplink_counter,
                mac_downlink_counter,
                ack,
                payload,
            }))
        }
        "" => Err(WireError::Empty),
        _ => Ok(MacEvent::Other(line.to_string())),
    }
}

fn parse_u32(field: Option<&str>, name: &'static str) -> Result<u32, WireError> {
    let f = field.ok_or(WireError::MissingField(name))?;
    f.parse().map_err(|_| WireError::BadField(name, f.into()))
}

/// Error decoding a line from the MAC bridge.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("empty line")]
    Empty,
    #[error("line too long ({0} bytes)")]
    TooLong(usize),
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("invalid {0}: {1:?}")]
    BadField(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_commands() {
        assert_eq!(encode_command(&MacCommand::Reset), "RESET");
        let tx = MacCommand::Tx {
            port: 1,
            payload: vec![0x42, 0x0a],
        };
        assert_eq!(encode_command(&tx), "TX 1 420a");
        let p = SessionParams {
            net_id: 1,
            device_address: 0x2601_1BDA,
            network_key: [0xab; 16],
            application_key: [0x01; 16],
            uplink_counter: 12,
            downlink_counter: 3,
        };
        assert_eq!(
            encode_command(&MacCommand::Session(p)),
            format!("SESSION 1 26011bda {} {} 12 3", "ab".repeat(16), "01".repeat(16))
        );
    }

    #[test]
    fn decodes_tx_complete_with_payload() {
        let ev = decode_event("TXCOMPLETE 13 4 1 deadbeef\n").unwrap();
        assert_eq!(
            ev,
            MacEvent::TransmissionComplete(TxComplete {
                uplink_counter: 13,
                mac_downlink_counter: 4,
                ack: true,
                payload: vec![0xde, 0xad, 0xbe, 0xef],
            })
        );
    }

    #[test]
    fn decodes_tx_complete_without_payload() {
        match decode_event("TXCOMPLETE 13 4 0").unwrap() {
            MacEvent::TransmissionComplete(tx) => {
                assert!(tx.payload.is_empty());
                assert!(!tx.ack);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_simple_events_and_passthrough() {
        assert_eq!(decode_event("JOINED").unwrap(), MacEvent::Joined);
        assert_eq!(decode_event("JOIN_FAILED\r\n").unwrap(), MacEvent::JoinFailed);
        assert_eq!(decode_event("RESET").unwrap(), MacEvent::Reset);
        assert_eq!(
            decode_event("LINK_DEAD").unwrap(),
            MacEvent::Other("LINK_DEAD".into())
        );
    }

    #[test]
    fn rejects_malformed_tx_complete() {
        assert!(matches!(decode_event(""), Err(WireError::Empty)));
        assert!(matches!(
            decode_event("TXCOMPLETE"),
            Err(WireError::MissingField("fcntup"))
        ));
        assert!(matches!(
            decode_event("TXCOMPLETE 1 x 0"),
            Err(WireError::BadField("fcntdn", _))
        ));
        assert!(matches!(
            decode_event("TXCOMPLETE 1 2 yes"),
            Err(WireError::BadField("ack", _))
        ));
        assert!(matches!(
            decode_event("TXCOMPLETE 1 2 0 abc"),
            Err(WireError::BadField("payload", _))
        ));
        assert!(matches!(
            decode_event("TXCOMPLETE 1 2 0 ab cd"),
            Err(WireError::BadField("trailing", _))
        ));
        let long = format!("TXCOMPLETE 1 2 0 {}", "ab".repeat(MAX_LINE_LEN));
        assert!(matches!(decode_event(&long), Err(WireError::TooLong(_))));
    }
}
