use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uplift_fetch::{HttpClient, extract_jsonp, extract_post_message};

use crate::entry::{CoreEntry, PluginEntry, SiteData};
use crate::error::SiteError;
use crate::validator::{AcceptAll, SignatureValidator};
use crate::version::PluginVersion;

/// Canonical catalog file name. A site URL ending in this suffix yields a
/// base URL for per-downloadable metadata.
const CATALOG_SUFFIX: &str = "update-center.json";

/// Result of a successful catalog refresh: the raw body as served and the
/// server-supplied data timestamp.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// One remote catalog.
///
/// `data` is an atomically replaced snapshot: a refresh either installs a
/// complete new catalog or leaves the previous one untouched. Readers
/// clone the `Arc` and work off their snapshot.
pub struct UpdateSite {
    id: String,
    url: String,
    /// Configured probe override; the catalog's own `connectionCheckUrl`
    /// is the fallback.
    connection_check_url: Option<String>,
    validator: Arc<dyn SignatureValidator>,
    data: RwLock<Option<Arc<SiteData>>>,
    data_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl UpdateSite {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            connection_check_url: None,
            validator: Arc::new(AcceptAll),
            data: RwLock::new(None),
            data_timestamp: Mutex::new(None),
        }
    }

    pub fn with_connection_check_url(mut self, url: impl Into<String>) -> Self {
        self.connection_check_url = Some(url.into());
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn SignatureValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Prefix before the canonical `update-center.json` suffix, if the
    /// site URL has the expected shape.
    pub fn base_url(&self) -> Option<&str> {
        self.url.strip_suffix(CATALOG_SUFFIX)
    }

    /// Per-downloadable metadata URL: `<base>updates/<id>.json`.
    pub fn metadata_url_for(&self, downloadable_id: &str) -> Option<String> {
        self.base_url()
            .map(|base| format!("{base}updates/{downloadable_id}.json"))
    }

    /// Probe URL for the update-site connectivity check: the catalog URL
    /// with an `uctest` marker appended.
    pub fn connection_check_probe_url(&self) -> String {
        if self.url.contains('?') {
            format!("{}&uctest", self.url)
        } else {
            format!("{}?uctest", self.url)
        }
    }

    /// URL probed for general internet reachability. `None` means the
    /// internet check is skipped for this site.
    pub fn connection_check_url(&self) -> Option<String> {
        self.connection_check_url
            .clone()
            .or_else(|| self.data().and_then(|d| d.connection_check_url.clone()))
    }

    /// The configured probe override only, for persistence.
    pub fn configured_connection_check_url(&self) -> Option<String> {
        self.connection_check_url.clone()
    }

    /// Current catalog snapshot, if any load has succeeded.
    pub fn data(&self) -> Option<Arc<SiteData>> {
        self.data.read().expect("site data lock poisoned").clone()
    }

    pub fn data_timestamp(&self) -> Option<DateTime<Utc>> {
        *self
            .data_timestamp
            .lock()
            .expect("site timestamp lock poisoned")
    }

    pub fn has_data(&self) -> bool {
        self.data().is_some()
    }

    /// Drop the cached catalog. The next refresh behaves like a first load.
    pub fn invalidate(&self) {
        *self.data.write().expect("site data lock poisoned") = None;
        *self
            .data_timestamp
            .lock()
            .expect("site timestamp lock poisoned") = None;
        info!(site = %self.id, "catalog invalidated");
    }

    /// Fetch the catalog and replace the snapshot.
    ///
    /// The HTML postMessage envelope is preferred; JSONP extraction is the
    /// fallback and also handles a bare JSON body. With `verify_signature`
    /// the bound validator must return OK or the cycle is rejected and the
    /// previous snapshot stays. The raw body and data timestamp are
    /// returned so callers can write through a metadata cache.
    pub async fn refresh(
        &self,
        client: &dyn HttpClient,
        verify_signature: bool,
        read_timeout: Duration,
    ) -> Result<RefreshOutcome, SiteError> {
        let response = client.get_text(&self.url, read_timeout).await?;
        debug!(site = %self.id, url = %response.final_url, "catalog fetched");

        self.apply_catalog(&response.body, verify_signature)?;
        let stamp = response.server_time.unwrap_or_else(Utc::now);
        *self
            .data_timestamp
            .lock()
            .expect("site timestamp lock poisoned") = Some(stamp);
        Ok(RefreshOutcome {
            body: response.body,
            timestamp: stamp,
        })
    }

    /// Parse, validate and atomically install a catalog body. Used by
    /// [`refresh`](Self::refresh) and by cache-backed startup loads.
    pub fn apply_catalog(&self, body: &str, verify_signature: bool) -> Result<(), SiteError> {
        let json = extract_post_message(body)
            .or_else(|_| extract_jsonp(body))
            .map_err(SiteError::Fetch)?;

        let document: serde_json::Value =
            serde_json::from_str(json).map_err(|source| SiteError::MalformedJson {
                site: self.id.clone(),
                source,
            })?;

        if verify_signature {
            let verdict = self.validator.verify(&document);
            for warning in &verdict.warnings {
                warn!(site = %self.id, %warning, "catalog signature warning");
            }
            if !verdict.ok {
                return Err(SiteError::SignatureRejected {
                    site: self.id.clone(),
                    detail: verdict.errors.join("; "),
                });
            }
        }

        let data = SiteData::parse(json, &self.id).map_err(|source| SiteError::MalformedJson {
            site: self.id.clone(),
            source,
        })?;
        info!(site = %self.id, plugins = data.plugins.len(), "catalog loaded");
        *self.data.write().expect("site data lock poisoned") = Some(Arc::new(data));
        Ok(())
    }

    pub fn get_plugin(&self, name: &str) -> Option<PluginEntry> {
        self.data()?.plugins.get(name).cloned()
    }

    pub fn core_entry(&self) -> Option<CoreEntry> {
        self.data()?.core.clone()
    }

    /// Every plugin this site offers, in catalog (name) order.
    pub fn get_availables(&self) -> Vec<PluginEntry> {
        self.data()
            .map(|d| d.plugins.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Plugins for which `installed` holds a strictly lower version.
    pub fn get_updates(&self, installed: &BTreeMap<String, String>) -> Vec<PluginEntry> {
        let Some(data) = self.data() else {
            return Vec::new();
        };
        data.plugins
            .values()
            .filter(|plugin| match installed.get(&plugin.name) {
                Some(current) => {
                    PluginVersion::parse(current) < PluginVersion::parse(&plugin.version)
                }
                None => false,
            })
            .cloned()
            .collect()
    }
}
