use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uplift_fetch::HttpClient;

use crate::error::SiteError;
use crate::site::UpdateSite;
use crate::validator::SignatureValidator;

/// Reserved id of the site every registry is guaranteed to contain.
pub const DEFAULT_SITE_ID: &str = "default";

/// Reserved id for locally uploaded plugins; never probed or refreshed.
pub const UPLOAD_SITE_ID: &str = "_upload";

const DOCUMENT_VERSION: u32 = 1;

/// Persisted registry document: ordered site list, written whenever the
/// list changes.
#[derive(Debug, Serialize, Deserialize)]
struct SiteDocument {
    version: u32,
    sites: Vec<SiteRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SiteRecord {
    id: String,
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    connection_check_url: Option<String>,
    /// Carried by documents written before per-site configuration existed;
    /// such entries are dropped on load.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    legacy_default: bool,
}

/// Ordered, persistent collection of update sites.
pub struct SiteRegistry {
    path: PathBuf,
    default_site_id: String,
    default_site_url: String,
    validator: Arc<dyn SignatureValidator>,
    sites: RwLock<Vec<Arc<UpdateSite>>>,
}

impl SiteRegistry {
    /// Load the registry document from `path`, dropping legacy-default
    /// entries and guaranteeing a `default_site_id` entry pointing at
    /// `default_site_url`. A missing or freshly-normalized document is
    /// written back.
    pub fn load(
        path: impl Into<PathBuf>,
        default_site_id: &str,
        default_site_url: &str,
        validator: Arc<dyn SignatureValidator>,
    ) -> Result<Self, SiteError> {
        let path = path.into();
        let mut records = match std::fs::read_to_string(&path) {
            Ok(body) => match serde_json::from_str::<SiteDocument>(&body) {
                Ok(document) => document.sites,
                Err(err) => {
                    warn!(path = %path.display(), %err, "unreadable site registry, rebuilding");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(SiteError::Persistence {
                    path: path.clone(),
                    source,
                });
            }
        };

        let before = records.len();
        records.retain(|r| !r.legacy_default);
        let dropped_legacy = before - records.len();
        if dropped_legacy > 0 {
            info!(dropped_legacy, "dropped legacy default site entries");
        }

        let needs_default = !records.iter().any(|r| r.id == default_site_id);
        if needs_default {
            records.insert(
                0,
                SiteRecord {
                    id: default_site_id.to_string(),
                    url: default_site_url.to_string(),
                    connection_check_url: None,
                    legacy_default: false,
                },
            );
        }

        let registry = Self {
            path,
            default_site_id: default_site_id.to_string(),
            default_site_url: default_site_url.to_string(),
            validator: validator.clone(),
            sites: RwLock::new(
                records
                    .iter()
                    .map(|r| Arc::new(build_site(r, validator.clone())))
                    .collect(),
            ),
        };

        if needs_default || dropped_legacy > 0 {
            registry.save()?;
        }
        Ok(registry)
    }

    /// Snapshot of the ordered site list.
    pub fn list(&self) -> Vec<Arc<UpdateSite>> {
        self.sites.read().expect("registry lock poisoned").clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<UpdateSite>> {
        self.list().into_iter().find(|s| s.id() == id)
    }

    pub fn default_site(&self) -> Arc<UpdateSite> {
        self.get(&self.default_site_id)
            .expect("registry always contains the default site")
    }

    /// Append a site and persist the document. Replaces any existing site
    /// with the same id.
    pub fn add(&self, site: UpdateSite) -> Result<(), SiteError> {
        {
            let mut sites = self.sites.write().expect("registry lock poisoned");
            sites.retain(|s| s.id() != site.id());
            sites.push(Arc::new(site));
        }
        self.save()
    }

    /// Remove a site by id and persist. The default site cannot be
    /// removed; asking to is answered by re-adding it.
    pub fn remove(&self, id: &str) -> Result<(), SiteError> {
        {
            let mut sites = self.sites.write().expect("registry lock poisoned");
            sites.retain(|s| s.id() != id);
            if !sites.iter().any(|s| s.id() == self.default_site_id) {
                sites.insert(
                    0,
                    Arc::new(UpdateSite::new(
                        self.default_site_id.clone(),
                        self.default_site_url.clone(),
                    )),
                );
            }
        }
        self.save()
    }

    /// Refresh every site concurrently; each site's outcome is reported
    /// independently so one bad site never blocks the rest.
    pub async fn update_all(
        &self,
        client: &dyn HttpClient,
        verify_signature: bool,
        read_timeout: Duration,
    ) -> Vec<(String, Result<(), SiteError>)> {
        let sites = self.list();
        let refreshes = sites.iter().map(|site| {
            let site = site.clone();
            async move {
                let outcome = if site.id() == UPLOAD_SITE_ID {
                    Ok(())
                } else {
                    site.refresh(client, verify_signature, read_timeout)
                        .await
                        .map(|_| ())
                };
                (site.id().to_string(), outcome)
            }
        });
        join_all(refreshes).await
    }

    /// Write the registry document via an adjacent temp file and atomic
    /// rename.
    pub fn save(&self) -> Result<(), SiteError> {
        let document = SiteDocument {
            version: DOCUMENT_VERSION,
            sites: self
                .list()
                .iter()
                .map(|s| SiteRecord {
                    id: s.id().to_string(),
                    url: s.url().to_string(),
                    connection_check_url: s.configured_connection_check_url(),
                    legacy_default: false,
                })
                .collect(),
        };
        let body = serde_json::to_string_pretty(&document).expect("registry document serializes");
        atomic_write(&self.path, body.as_bytes()).map_err(|source| SiteError::Persistence {
            path: self.path.clone(),
            source,
        })
    }
}

fn build_site(record: &SiteRecord, validator: Arc<dyn SignatureValidator>) -> UpdateSite {
    let mut site = UpdateSite::new(record.id.clone(), record.url.clone());
    if let Some(probe) = &record.connection_check_url {
        site = site.with_connection_check_url(probe.clone());
    }
    site.with_validator(validator)
}

fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}
