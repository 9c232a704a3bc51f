//! Decryption by external process: `<program> <args..> -k <key> -t <hex ciphertext>`.
//! The first stdout line is the plaintext `<counter> <command>`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use loranode_core::session::SessionKey;
use loranode_core::{DecryptError, Decryptor, Plaintext};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct SubprocessDecryptor {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    /// Passed instead of the hex application key when set.
    key_override: Option<String>,
}

impl SubprocessDecryptor {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            key_override: None,
        }
    }

    pub fn with_key_override(mut self, key: String) -> Self {
        self.key_override = Some(key);
        self
    }

    fn key_arg(&self, key: &SessionKey) -> String {
        self.key_override
            .clone()
            .unwrap_or_else(|| hex::encode(key))
    }
}

/// Read the command key file: first line, trailing newline stripped.
pub fn load_command_key(path: &Path) -> std::io::Result<String> {
    let text = std::fs::read_to_string(path)?;
    let key = text.lines().next().unwrap_or_default().trim_end().to_string();
    if key.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} is empty", path.display()),
        ));
    }
    Ok(key)
}

impl Decryptor for SubprocessDecryptor {
    fn decrypt(&self, key: &SessionKey, ciphertext: &[u8]) -> Result<Plaintext, DecryptError> {
        let cipher_hex = hex::encode(ciphertext);
        tracing::debug!(program = %self.program.display(), ciphertext = %cipher_hex, "running decrypt command");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("-k")
            .arg(self.key_arg(key))
            .arg("-t")
            .arg(&cipher_hex)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                DecryptError::Unavailable(format!("spawn {}: {e}", self.program.display()))
            })?;

        // stdout is drained off-thread; the read shares the child's deadline.
        let (tx, rx) = mpsc::channel();
        if let Some(mut stdout) = child.stdout.take() {
            std::thread::spawn(move || {
                let mut out = String::new();
                let res = stdout.read_to_string(&mut out).map(|_| out);
                let _ = tx.send(res);
            });
        }

        let deadline = Instant::now() + self.timeout;
        let timed_out = || DecryptError::Unavailable(format!("timed out after {:?}", self.timeout));
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(timed_out());
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(DecryptError::Unavailable(format!("wait: {e}"))),
            }
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let out = match rx.recv_timeout(remaining) {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return Err(DecryptError::Failed(format!("unreadable output: {e}"))),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("decrypt command left its output open past the deadline");
                return Err(timed_out());
            }
            Err(RecvTimeoutError::Disconnected) => String::new(),
        };
        if !status.success() {
            return Err(DecryptError::Failed(format!("decrypt command exited with {status}")));
        }
        let line = out.lines().next().unwrap_or_default().trim_end_matches('\r');
        if line.is_empty() {
            return Err(DecryptError::Failed("decrypt command returned no result".into()));
        }
        tracing::debug!(plaintext = %line, "got raw message");
        Ok(line.to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> SubprocessDecryptor {
        SubprocessDecryptor::new("sh", vec!["-c".into(), script.into(), "sh".into()], timeout)
    }

    #[test]
    fn first_output_line_is_plaintext() {
        let d = sh(
            "printf '5 bluetooth: on\\nextra\\n'",
            Duration::from_secs(5),
        );
        assert_eq!(d.decrypt(&[0; 16], &[1, 2]).unwrap(), "5 bluetooth: on");
    }

    #[test]
    fn key_and_hex_ciphertext_are_passed_as_arguments() {
        // $1=-k $2=<key> $3=-t $4=<hex>
        let d = sh("echo \"$2|$4\"", Duration::from_secs(5));
        let out = d.decrypt(&[0xab; 16], &[0x0f, 0xa0]).unwrap();
        assert_eq!(out, format!("{}|0fa0", "ab".repeat(16)));

        let d = d.with_key_override("mysecretkey12345".into());
        assert_eq!(d.decrypt(&[0xab; 16], &[0x01]).unwrap(), "mysecretkey12345|01");
    }

    #[test]
    fn empty_output_is_failure() {
        let d = sh("true", Duration::from_secs(5));
        assert!(matches!(d.decrypt(&[0; 16], &[1]), Err(DecryptError::Failed(_))));
    }

    #[test]
    fn nonzero_exit_is_failure() {
        let d = sh("echo '5 bluetooth: on'; exit 3", Duration::from_secs(5));
        assert!(matches!(d.decrypt(&[0; 16], &[1]), Err(DecryptError::Failed(_))));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let d = SubprocessDecryptor::new(
            "/nonexistent/decrypt-tool",
            Vec::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            d.decrypt(&[0; 16], &[1]),
            Err(DecryptError::Unavailable(_))
        ));
    }

    #[test]
    fn slow_program_times_out() {
        let d = sh("sleep 5", Duration::from_millis(100));
        let started = Instant::now();
        assert!(matches!(
            d.decrypt(&[0; 16], &[1]),
            Err(DecryptError::Unavailable(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn background_child_holding_output_is_bounded() {
        let d = sh("echo '5 bluetooth: on'; sleep 6 &", Duration::from_millis(500));
        let started = Instant::now();
        assert!(matches!(
            d.decrypt(&[0; 16], &[1]),
            Err(DecryptError::Unavailable(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn output_larger_than_pipe_buffer_is_read() {
        let d = sh(
            "echo '5 bluetooth: on'; head -c 200000 /dev/zero | tr '\\0' x; echo",
            Duration::from_secs(5),
        );
        assert_eq!(d.decrypt(&[0; 16], &[1]).unwrap(), "5 bluetooth: on");
    }

    #[test]
    fn command_key_file_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cryptokey.txt");
        std::fs::write(&path, "abcdefghijklmnop\nignored\n").unwrap();
        assert_eq!(load_command_key(&path).unwrap(), "abcdefghijklmnop");
        std::fs::write(&path, "\n").unwrap();
        assert!(load_command_key(&path).is_err());
    }
}
