//! Command file: the actuator process polls or watches it. Overwritten atomically per command.

use std::path::PathBuf;

use loranode_core::{CommandSink, SinkError, ValidatedCommand};

use crate::fsutil::atomic_write;

pub struct FileCommandSink {
    path: PathBuf,
}

impl FileCommandSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CommandSink for FileCommandSink {
    fn publish(&mut self, command: &ValidatedCommand) -> Result<(), SinkError> {
        atomic_write(&self.path, command.as_str().as_bytes())
            .map_err(|e| SinkError::Unavailable(format!("{}: {e}", self.path.display())))?;
        tracing::info!(path = %self.path.display(), command = %command, "wrote command file");
        Ok(())
    }
}
