use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The fixed set of keys the client persists between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    SessionId,
    StudentId,
    StudentName,
    CurrentPdfSession,
    CurrentPdfSlideCount,
    PitchFeedback,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::SessionId => "sessionId",
            StoreKey::StudentId => "studentId",
            StoreKey::StudentName => "studentName",
            StoreKey::CurrentPdfSession => "currentPDFSession",
            StoreKey::CurrentPdfSlideCount => "currentPDFSlideCount",
            StoreKey::PitchFeedback => "pitchFeedback",
        }
    }
}

/// String key-value store backed by a JSON file. Every write is flushed to disk.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl LocalStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store at {}", path.display()))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("Store at {} is not valid JSON", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    pub fn get(&self, key: StoreKey) -> Option<&str> {
        self.values.get(key.as_str()).map(String::as_str)
    }

    pub fn set(&mut self, key: StoreKey, value: impl Into<String>) -> Result<()> {
        self.values.insert(key.as_str().to_string(), value.into());
        self.flush()
    }

    pub fn remove(&mut self, key: StoreKey) -> Result<()> {
        if self.values.remove(key.as_str()).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write store at {}", self.path.display()))
    }
}
