//! Measurement file data source, read fresh every uplink cycle.

use std::fs;
use std::path::PathBuf;

use loranode_core::uplink::parse_reading;
use loranode_core::{DataSource, Reading, SourceError};

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DataSource for FileSource {
    fn latest(&self) -> Result<Option<Reading>, SourceError> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            SourceError::Unavailable(format!("could not open {}: {e}", self.path.display()))
        })?;
        parse_reading(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("measurement.txt");
        fs::write(&path, "1700000000 0a\n1700000030 2a\n").unwrap();
        let r = FileSource::new(&path).latest().unwrap().unwrap();
        assert_eq!(r.timestamp, 1_700_000_030);
        assert_eq!(r.token, "2a");
    }

    #[test]
    fn empty_file_has_no_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("measurement.txt");
        fs::write(&path, "").unwrap();
        assert!(FileSource::new(&path).latest().unwrap().is_none());
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSource::new(dir.path().join("people.txt"))
            .latest()
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }
}
