use std::path::PathBuf;
use std::time::Duration;

/// Baked-in catalog URL of the default site.
pub const DEFAULT_UPDATE_CENTER_URL: &str = "https://updates.uplift.dev/update-center.json";

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Process configuration for the update center.
///
/// Constructed by the embedder, or from the environment via
/// [`Config::from_env`]. Every former global toggle lives here so
/// alternate configurations are plain values, not process state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Controller home directory; plugins install under `<home>/plugins`.
    pub home: PathBuf,
    /// Catalog URL the guaranteed `default` site points at.
    pub update_center_url: String,
    /// Id of the guaranteed default site.
    pub default_site_id: String,
    /// Disables all outbound metadata updates.
    pub never_update: bool,
    /// Catalog signature verification; only tests turn this off.
    pub signature_check: bool,
    /// Default downloadable refresh interval.
    pub default_interval: Duration,
    /// Read timeout for plugin downloads.
    pub download_read_timeout: Duration,
    /// Read timeout for catalog fetches and connectivity probes.
    pub metadata_read_timeout: Duration,
    /// Escape hatch for admin-only access to the status surface.
    pub skip_permission_check: bool,
}

impl Config {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            update_center_url: DEFAULT_UPDATE_CENTER_URL.to_string(),
            default_site_id: "default".to_string(),
            never_update: false,
            signature_check: true,
            default_interval: DAY,
            download_read_timeout: Duration::from_secs(60),
            metadata_read_timeout: Duration::from_secs(30),
            skip_permission_check: false,
        }
    }

    /// Defaults overridden by `UPLIFT_*` environment variables.
    pub fn from_env() -> Self {
        let home = std::env::var_os("UPLIFT_HOME")
            .map(PathBuf::from)
            .or_else(|| home::home_dir().map(|d| d.join(".uplift")))
            .unwrap_or_else(|| PathBuf::from(".uplift"));
        let mut config = Self::new(home);

        if let Some(url) = env_string("UPLIFT_UPDATE_CENTER_URL") {
            config.update_center_url = url;
        }
        if let Some(id) = env_string("UPLIFT_DEFAULT_SITE_ID") {
            config.default_site_id = id;
        }
        if env_flag("UPLIFT_NEVER_UPDATE") {
            config.never_update = true;
        }
        if env_flag("UPLIFT_NO_SIGNATURE_CHECK") {
            config.signature_check = false;
        }
        if let Some(millis) = env_parse::<u64>("UPLIFT_DEFAULT_INTERVAL_MS") {
            config.default_interval = Duration::from_millis(millis);
        }
        if let Some(secs) = env_parse::<u64>("UPLIFT_DOWNLOAD_READ_TIMEOUT_SECS") {
            config.download_read_timeout = Duration::from_secs(secs);
        }
        if env_flag("UPLIFT_SKIP_PERMISSION_CHECK") {
            config.skip_permission_check = true;
        }
        config
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.home.join("plugins")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.home.join("sites.json")
    }

    pub fn install_state_path(&self) -> PathBuf {
        self.home.join("installing-plugins.json")
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new("/var/lib/uplift");
        assert_eq!(config.default_site_id, "default");
        assert_eq!(config.download_read_timeout, Duration::from_secs(60));
        assert_eq!(config.default_interval, Duration::from_secs(86_400));
        assert!(config.signature_check);
        assert!(!config.never_update);
        assert_eq!(
            config.plugins_dir(),
            PathBuf::from("/var/lib/uplift/plugins")
        );
    }
}
