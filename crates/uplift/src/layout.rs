//! Plugin directory file discipline.
//!
//! Active plugins live at `<home>/plugins/<name>.jpi` (legacy installs at
//! `<name>.hpi`), with one rotation of backup at `<name>.bak`. Downloads
//! stage at `<name>.jpi.tmp` and only ever reach the active name through
//! an atomic rename, so a failed install never leaves a newer active file
//! behind.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

pub struct PluginLayout {
    plugins_dir: PathBuf,
    home: PathBuf,
}

impl PluginLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            plugins_dir: home.join("plugins"),
            home,
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Active file for a plugin. A legacy `.hpi` install keeps its
    /// extension; everything else installs as `.jpi`.
    pub fn destination(&self, name: &str) -> PathBuf {
        let legacy = self.plugins_dir.join(format!("{name}.hpi"));
        if legacy.exists() {
            legacy
        } else {
            self.plugins_dir.join(format!("{name}.jpi"))
        }
    }

    pub fn backup_path(&self, name: &str) -> PathBuf {
        self.plugins_dir.join(format!("{name}.bak"))
    }

    /// Atomically replace the active file with a fully verified download.
    ///
    /// On conflict any pre-existing backup is deleted before the active
    /// file rotates to `.bak`; the staged file then renames in.
    pub fn activate(&self, staged: &Path, name: &str) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.plugins_dir)?;
        let destination = self.destination(name);
        if destination.exists() {
            let backup = self.backup_path(name);
            if backup.exists() {
                std::fs::remove_file(&backup)?;
            }
            std::fs::rename(&destination, &backup)?;
        }
        std::fs::rename(staged, &destination)?;
        debug!(name, path = %destination.display(), "plugin activated");
        Ok(destination)
    }

    /// Swap the backup back in as the active file.
    pub fn restore_backup(&self, name: &str) -> io::Result<PathBuf> {
        let backup = self.backup_path(name);
        if !backup.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no backup exists for plugin {name}"),
            ));
        }
        let destination = self.destination(name);
        std::fs::rename(&backup, &destination)?;
        debug!(name, path = %destination.display(), "backup restored");
        Ok(destination)
    }

    pub fn has_backup(&self, name: &str) -> bool {
        self.backup_path(name).exists()
    }

    /// Where a core download stages before the lifecycle rewrites the
    /// host binary.
    pub fn core_destination(&self) -> PathBuf {
        self.home.join("core.war")
    }

    pub fn core_backup(&self) -> PathBuf {
        self.home.join("core.war.bak")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, PluginLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = PluginLayout::new(dir.path());
        std::fs::create_dir_all(layout.plugins_dir()).unwrap();
        (dir, layout)
    }

    #[test]
    fn fresh_install_renames_staged_file_in() {
        let (_dir, layout) = layout();
        let staged = layout.plugins_dir().join("git.jpi.tmp");
        std::fs::write(&staged, b"v2").unwrap();

        let active = layout.activate(&staged, "git").unwrap();
        assert_eq!(active, layout.plugins_dir().join("git.jpi"));
        assert_eq!(std::fs::read(&active).unwrap(), b"v2");
        assert!(!staged.exists());
        assert!(!layout.has_backup("git"));
    }

    #[test]
    fn upgrade_rotates_active_file_to_backup() {
        let (_dir, layout) = layout();
        std::fs::write(layout.plugins_dir().join("git.jpi"), b"v1").unwrap();
        std::fs::write(layout.backup_path("git"), b"v0").unwrap();
        let staged = layout.plugins_dir().join("git.jpi.tmp");
        std::fs::write(&staged, b"v2").unwrap();

        layout.activate(&staged, "git").unwrap();
        assert_eq!(
            std::fs::read(layout.plugins_dir().join("git.jpi")).unwrap(),
            b"v2"
        );
        // the v0 backup was discarded, v1 rotated in
        assert_eq!(std::fs::read(layout.backup_path("git")).unwrap(), b"v1");
    }

    #[test]
    fn legacy_hpi_keeps_its_extension() {
        let (_dir, layout) = layout();
        std::fs::write(layout.plugins_dir().join("git.hpi"), b"v1").unwrap();
        assert_eq!(
            layout.destination("git"),
            layout.plugins_dir().join("git.hpi")
        );

        let staged = layout.plugins_dir().join("git.hpi.tmp");
        std::fs::write(&staged, b"v2").unwrap();
        layout.activate(&staged, "git").unwrap();
        assert_eq!(
            std::fs::read(layout.plugins_dir().join("git.hpi")).unwrap(),
            b"v2"
        );
        assert!(!layout.plugins_dir().join("git.jpi").exists());
    }

    #[test]
    fn restore_backup_swaps_active_file() {
        let (_dir, layout) = layout();
        std::fs::write(layout.plugins_dir().join("git.jpi"), b"v2").unwrap();
        std::fs::write(layout.backup_path("git"), b"v1").unwrap();

        layout.restore_backup("git").unwrap();
        assert_eq!(
            std::fs::read(layout.plugins_dir().join("git.jpi")).unwrap(),
            b"v1"
        );
        assert!(!layout.has_backup("git"));
    }

    #[test]
    fn restore_without_backup_fails() {
        let (_dir, layout) = layout();
        assert!(layout.restore_backup("git").is_err());
    }
}
