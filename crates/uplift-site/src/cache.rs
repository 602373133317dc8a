use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tracing::debug;

use crate::error::SiteError;

/// On-disk cache of downloadable metadata under `<home>/updates/`.
///
/// Each downloadable caches as `<id>.json`; the file mtime carries the
/// server-supplied data timestamp so freshness survives restarts without a
/// sidecar index.
pub struct MetadataCache {
    root: PathBuf,
}

impl MetadataCache {
    pub fn new(home: impl AsRef<Path>) -> Self {
        Self {
            root: home.as_ref().join("updates"),
        }
    }

    pub fn path_for(&self, downloadable_id: &str) -> PathBuf {
        self.root.join(format!("{downloadable_id}.json"))
    }

    pub fn read(&self, downloadable_id: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(downloadable_id)).ok()
    }

    /// Store a downloadable's body, stamping the file mtime with the
    /// server timestamp when one was supplied.
    pub fn write(
        &self,
        downloadable_id: &str,
        body: &str,
        data_timestamp: Option<DateTime<Utc>>,
    ) -> Result<(), SiteError> {
        let path = self.path_for(downloadable_id);
        let persist = |source| SiteError::Persistence {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.root).map_err(persist)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(persist)?;
        std::fs::rename(&tmp, &path).map_err(persist)?;

        if let Some(stamp) = data_timestamp {
            let mtime = FileTime::from_unix_time(stamp.timestamp(), 0);
            filetime::set_file_mtime(&path, mtime).map_err(persist)?;
        }
        debug!(downloadable_id, path = %path.display(), "metadata cached");
        Ok(())
    }

    /// Due for refresh when the cached copy is absent or its mtime plus
    /// the interval has passed.
    pub fn is_due(&self, downloadable_id: &str, interval: Duration) -> bool {
        let Ok(metadata) = std::fs::metadata(self.path_for(downloadable_id)) else {
            return true;
        };
        let mtime = FileTime::from_last_modification_time(&metadata);
        let age = Utc::now().timestamp().saturating_sub(mtime.unix_seconds());
        age >= 0 && age as u64 >= interval.as_secs()
    }
}
