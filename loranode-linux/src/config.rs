//! Load config from file and environment.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use loranode_core::PayloadEncoding;
use serde::Deserialize;

/// Daemon configuration. File: ~/.config/loranode/config.toml or /etc/loranode/config.toml.
/// Env overrides: LORANODE_MEASUREMENT_FILE, LORANODE_SEND_INTERVAL, LORANODE_MAC_ENDPOINT.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Device identity file (APPEUI/DEVEUI/DEVKEY/ARTKEY/DEVADDR lines).
    #[serde(default = "default_connection_file")]
    pub connection_file: PathBuf,
    /// Frame counter record.
    #[serde(default = "default_counters_file")]
    pub counters_file: PathBuf,
    /// Optional session key record; when set, the session identity is persisted too.
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
    /// Where accepted commands are published for the actuator.
    #[serde(default = "default_command_file")]
    pub command_file: PathBuf,
    /// Data source read every cycle.
    #[serde(default = "default_measurement_file")]
    pub measurement_file: PathBuf,
    #[serde(default)]
    pub payload_encoding: PayloadEncoding,
    /// Uplink period in seconds (default 30).
    #[serde(default = "default_send_interval_secs")]
    pub send_interval_secs: u64,
    #[serde(default = "default_uplink_port")]
    pub uplink_port: u8,
    #[serde(default = "default_net_id")]
    pub net_id: u32,
    /// Consecutive pending cycles before the MAC is reset; 0 never resets.
    #[serde(default = "default_reset_after_pending_cycles")]
    pub reset_after_pending_cycles: u32,
    #[serde(default = "default_decrypt_program")]
    pub decrypt_program: PathBuf,
    #[serde(default = "default_decrypt_args")]
    pub decrypt_args: Vec<String>,
    #[serde(default = "default_decrypt_timeout_secs")]
    pub decrypt_timeout_secs: u64,
    /// Key passed to the decrypt command instead of the application session key.
    #[serde(default)]
    pub command_key_file: Option<PathBuf>,
    /// host:port of the MAC process.
    #[serde(default = "default_mac_endpoint")]
    pub mac_endpoint: String,
}

fn default_connection_file() -> PathBuf {
    PathBuf::from("/framectrdata/ttnConnection.conf")
}
fn default_counters_file() -> PathBuf {
    PathBuf::from("/framectrdata/framectrs.txt")
}
fn default_command_file() -> PathBuf {
    PathBuf::from("/framectrdata/update.command")
}
fn default_measurement_file() -> PathBuf {
    PathBuf::from("measurement.txt")
}
fn default_send_interval_secs() -> u64 {
    30
}
fn default_uplink_port() -> u8 {
    loranode_core::uplink::DEFAULT_PORT
}
fn default_net_id() -> u32 {
    loranode_core::node::DEFAULT_NET_ID
}
fn default_reset_after_pending_cycles() -> u32 {
    loranode_core::uplink::DEFAULT_RESET_AFTER_PENDING
}
fn default_decrypt_program() -> PathBuf {
    PathBuf::from("python3")
}
fn default_decrypt_args() -> Vec<String> {
    vec![
        "encrypt_bluetoothcmd.py".into(),
        "--decrypt".into(),
        "--silent".into(),
    ]
}
fn default_decrypt_timeout_secs() -> u64 {
    10
}
fn default_mac_endpoint() -> String {
    "127.0.0.1:7100".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_file: default_connection_file(),
            counters_file: default_counters_file(),
            keys_file: None,
            command_file: default_command_file(),
            measurement_file: default_measurement_file(),
            payload_encoding: PayloadEncoding::default(),
            send_interval_secs: default_send_interval_secs(),
            uplink_port: default_uplink_port(),
            net_id: default_net_id(),
            reset_after_pending_cycles: default_reset_after_pending_cycles(),
            decrypt_program: default_decrypt_program(),
            decrypt_args: default_decrypt_args(),
            decrypt_timeout_secs: default_decrypt_timeout_secs(),
            command_key_file: None,
            mac_endpoint: default_mac_endpoint(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.send_interval_secs == 0 {
            bail!("send_interval_secs must be a positive number of seconds");
        }
        if self.decrypt_timeout_secs == 0 {
            bail!("decrypt_timeout_secs must be a positive number of seconds");
        }
        Ok(())
    }
}

/// Load config: explicit path (must exist), else the first config file found, else defaults;
/// then env vars.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut c = match explicit {
        Some(p) => load_file(p)?,
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(p) => load_file(&p)?,
            None => Config::default(),
        },
    };
    apply_env(&mut c, |k| std::env::var(k).ok());
    c.validate()?;
    Ok(c)
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("LORANODE_MEASUREMENT_FILE") {
        c.measurement_file = PathBuf::from(s);
    }
    if let Some(s) = var("LORANODE_SEND_INTERVAL") {
        match s.parse::<u64>() {
            Ok(secs) if secs > 0 => c.send_interval_secs = secs,
            _ => tracing::warn!(value = %s, "ignoring invalid LORANODE_SEND_INTERVAL"),
        }
    }
    if let Some(s) = var("LORANODE_MAC_ENDPOINT") {
        c.mac_endpoint = s;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/loranode/config.toml"));
    }
    out.push(PathBuf::from("/etc/loranode/config.toml"));
    out
}

fn load_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let c = toml::from_str::<Config>(&s)
        .with_context(|| format!("parsing config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded config");
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c.send_interval_secs, 30);
        assert_eq!(c.uplink_port, 1);
        assert_eq!(c.counters_file, PathBuf::from("/framectrdata/framectrs.txt"));
        assert_eq!(c.payload_encoding, PayloadEncoding::Hex);
        assert!(c.keys_file.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parses_overrides() {
        let c: Config = toml::from_str(
            r#"
            measurement_file = "/run/people.txt"
            payload_encoding = "count"
            send_interval_secs = 60
            reset_after_pending_cycles = 0
            command_key_file = "/framectrdata/cryptokey.txt"
            "#,
        )
        .unwrap();
        assert_eq!(c.measurement_file, PathBuf::from("/run/people.txt"));
        assert_eq!(c.payload_encoding, PayloadEncoding::Count);
        assert_eq!(c.send_interval_secs, 60);
        assert_eq!(c.reset_after_pending_cycles, 0);
        assert!(c.command_key_file.is_some());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("sendinterval = 5").is_err());
    }

    #[test]
    fn zero_interval_is_invalid() {
        let c = Config {
            send_interval_secs: 0,
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut c = Config::default();
        apply_env(&mut c, |k| match k {
            "LORANODE_MEASUREMENT_FILE" => Some("/tmp/m.txt".into()),
            "LORANODE_SEND_INTERVAL" => Some("15".into()),
            "LORANODE_MAC_ENDPOINT" => Some("10.0.0.2:7100".into()),
            _ => None,
        });
        assert_eq!(c.measurement_file, PathBuf::from("/tmp/m.txt"));
        assert_eq!(c.send_interval_secs, 15);
        assert_eq!(c.mac_endpoint, "10.0.0.2:7100");

        apply_env(&mut c, |k| (k == "LORANODE_SEND_INTERVAL").then(|| "0".into()));
        assert_eq!(c.send_interval_secs, 15);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "uplink_port = 3\n").unwrap();
        let c = load(Some(&path)).unwrap();
        assert_eq!(c.uplink_port, 3);
    }
}
