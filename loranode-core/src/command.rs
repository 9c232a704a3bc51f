//! Downlink command grammar.
//!
//! A decrypted downlink reaches a privileged actuator, so the grammar is matched exactly:
//! `bluetooth: on`, `bluetooth: off`, `bluetooth: clearregistry` and
//! `bluetooth: register aa:bb:cc:dd:ee:ff` (lowercase hex only). Anything else is rejected
//! whole; nothing is trimmed, lowercased or partially accepted.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Fixed namespace every command must start with.
pub const NAMESPACE: &str = "bluetooth";

const GRAMMAR: &str =
    r"\Abluetooth: (?:on|off|clearregistry|register [0-9a-f]{2}(?::[0-9a-f]{2}){5})\z";

fn grammar() -> &'static Regex {
    static GRAMMAR_RE: OnceLock<Regex> = OnceLock::new();
    GRAMMAR_RE.get_or_init(|| Regex::new(GRAMMAR).expect("command grammar is a valid regex"))
}

/// True iff `command` matches the grammar exactly.
pub fn validate(command: &str) -> bool {
    grammar().is_match(command)
}

/// Parsed verb of an accepted command.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Verb {
    On,
    Off,
    ClearRegistry,
    Register([u8; 6]),
}

/// A command string that passed `validate`. Published verbatim.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ValidatedCommand {
    raw: String,
    verb: Verb,
}

impl ValidatedCommand {
    /// Validate and wrap. On mismatch returns the rejected raw string.
    pub fn parse(command: &str) -> Result<Self, ValidationRejected> {
        if !validate(command) {
            return Err(ValidationRejected {
                raw: command.to_string(),
            });
        }
        let rest = &command[NAMESPACE.len() + 2..];
        let verb = match rest {
            "on" => Verb::On,
            "off" => Verb::Off,
            "clearregistry" => Verb::ClearRegistry,
            _ => {
                // Grammar guarantees "register " + six hex pairs.
                let mut addr = [0u8; 6];
                for (i, pair) in rest["register ".len()..].split(':').enumerate() {
                    addr[i] = u8::from_str_radix(pair, 16).map_err(|_| ValidationRejected {
                        raw: command.to_string(),
                    })?;
                }
                Verb::Register(addr)
            }
        };
        Ok(Self {
            raw: command.to_string(),
            verb,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }
}

impl fmt::Display for ValidatedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Command did not match the grammar. Carries the raw string for operator diagnosis.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("command rejected: {raw:?}")]
pub struct ValidationRejected {
    pub raw: String,
}

/// Commands an operator may send, for log hints.
pub const USAGE: &[&str] = &[
    "bluetooth: on",
    "bluetooth: off",
    "bluetooth: register {MAC-Address}",
    "bluetooth: clearregistry",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_verb() {
        assert!(validate("bluetooth: on"));
        assert!(validate("bluetooth: off"));
        assert!(validate("bluetooth: clearregistry"));
        assert!(validate("bluetooth: register aa:bb:cc:dd:ee:ff"));
        assert!(validate("bluetooth: register 00:11:22:33:44:55"));
    }

    #[test]
    fn rejects_unknown_verbs_and_namespaces() {
        assert!(!validate("bluetooth: explode"));
        assert!(!validate("wifi: on"));
        assert!(!validate(""));
        assert!(!validate("bluetooth:"));
        assert!(!validate("bluetooth: "));
    }

    #[test]
    fn rejects_prefixes_and_suffixes() {
        assert!(!validate("bluetooth: o"));
        assert!(!validate("bluetooth: onn"));
        assert!(!validate("bluetooth: on\n"));
        assert!(!validate("bluetooth: on; rm -rf /"));
        assert!(!validate(" bluetooth: on"));
        assert!(!validate("xbluetooth: on"));
        assert!(!validate("bluetooth: register aa:bb:cc:dd:ee"));
        assert!(!validate("bluetooth: register aa:bb:cc:dd:ee:ff:00"));
        assert!(!validate("bluetooth: register aa:bb:cc:dd:ee:ff "));
        assert!(!validate("bluetooth: register"));
        assert!(!validate("bluetooth: on aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn rejects_case_variants() {
        assert!(!validate("Bluetooth: on"));
        assert!(!validate("bluetooth: ON"));
        assert!(!validate("bluetooth: Register aa:bb:cc:dd:ee:ff"));
        assert!(!validate("bluetooth: register AA:BB:CC:DD:EE:FF"));
        assert!(!validate("bluetooth: register aa:bb:cc:dd:ee:fF"));
    }

    #[test]
    fn rejects_spacing_variants() {
        assert!(!validate("bluetooth:on"));
        assert!(!validate("bluetooth:  on"));
        assert!(!validate("bluetooth: register  aa:bb:cc:dd:ee:ff"));
        assert!(!validate("bluetooth: register aa-bb-cc-dd-ee-ff"));
        assert!(!validate("bluetooth: register aabbccddeeff"));
    }

    #[test]
    fn parse_extracts_hardware_address() {
        let cmd = ValidatedCommand::parse("bluetooth: register aa:bb:cc:dd:ee:0f").unwrap();
        assert_eq!(cmd.verb(), Verb::Register([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x0f]));
        assert_eq!(cmd.as_str(), "bluetooth: register aa:bb:cc:dd:ee:0f");
        assert_eq!(
            ValidatedCommand::parse("bluetooth: clearregistry").unwrap().verb(),
            Verb::ClearRegistry
        );
    }

    #[test]
    fn parse_rejection_keeps_raw_string() {
        let err = ValidatedCommand::parse("bluetooth: explode").unwrap_err();
        assert_eq!(err.raw, "bluetooth: explode");
    }
}
