//! Durable in-flight install state.
//!
//! Whenever any installation is still non-successful, the per-plugin
//! status map persists to `<home>/installing-plugins.json`; once every
//! install has succeeded the file is cleared. After a restart the last
//! persisted map tells the UI which installs the shutdown interrupted.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct ResumeDocument {
    version: u32,
    statuses: BTreeMap<String, String>,
}

pub struct InstallResumeStore {
    path: PathBuf,
    /// Writers serialize on this; readers tolerate an absent file.
    write_lock: Mutex<()>,
}

impl InstallResumeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The map persisted by the previous process, if any.
    pub fn load(&self) -> BTreeMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(body) => match serde_json::from_str::<ResumeDocument>(&body) {
                Ok(document) => document.statuses,
                Err(err) => {
                    warn!(path = %self.path.display(), %err, "unreadable install state");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        }
    }

    pub fn save(&self, statuses: &BTreeMap<String, String>) {
        let _guard = self.write_lock.lock().expect("resume store lock poisoned");
        let document = ResumeDocument {
            version: 1,
            statuses: statuses.clone(),
        };
        let body = serde_json::to_string_pretty(&document).expect("resume document serializes");
        let tmp = self.path.with_extension("json.tmp");
        let result = std::fs::write(&tmp, body).and_then(|_| std::fs::rename(&tmp, &self.path));
        match result {
            Ok(()) => debug!(entries = statuses.len(), "install state persisted"),
            Err(err) => warn!(path = %self.path.display(), %err, "failed to persist install state"),
        }
    }

    pub fn clear(&self) {
        let _guard = self.write_lock.lock().expect("resume store lock poisoned");
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("install state cleared"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), %err, "failed to clear install state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallResumeStore::new(dir.path().join("installing-plugins.json"));

        let statuses = BTreeMap::from([
            ("git".to_string(), "Installing".to_string()),
            ("mailer".to_string(), "Pending".to_string()),
        ]);
        store.save(&statuses);
        assert_eq!(store.load(), statuses);
    }

    #[test]
    fn absent_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallResumeStore::new(dir.path().join("installing-plugins.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn clear_removes_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstallResumeStore::new(dir.path().join("installing-plugins.json"));
        store.save(&BTreeMap::from([("git".to_string(), "Pending".to_string())]));
        store.clear();
        assert!(store.load().is_empty());
        store.clear();
    }
}
