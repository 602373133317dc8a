//! Read-only status projections and POST-shaped operations.
//!
//! These are the JSON surfaces an external UI drives. Mounting them on a
//! router is the embedder's concern; every method gates on administrative
//! rights unless the configuration skips permission checks, and a denied
//! call never creates a job.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::center::UpdateCenter;
use crate::error::CenterError;
use crate::job::{ConnStatus, Job};

/// Connection verdict for one site: the internet channel and the
/// update-site channel.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectionStatus {
    pub internet: ConnStatus,
    #[serde(rename = "updatesite")]
    pub update_site: ConnStatus,
}

/// Overall progress of the install queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallState {
    /// No installation has been requested yet.
    New,
    /// At least one installation is still in flight.
    Running,
    /// Every requested installation has settled.
    Complete,
}

#[derive(Debug, Serialize)]
pub struct InstallStatus {
    pub state: InstallState,
    pub jobs: Vec<InstallJobStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallJobStatus {
    pub name: String,
    pub version: String,
    pub title: String,
    pub install_status: String,
    pub requires_restart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl UpdateCenter {
    fn check_permission(&self, admin: bool) -> Result<(), CenterError> {
        if admin || self.config.skip_permission_check {
            Ok(())
        } else {
            Err(CenterError::PermissionDenied)
        }
    }

    /// Connection status of one site (the default site when unspecified).
    ///
    /// When every channel reports `FAILED` the probe re-runs once before
    /// answering; a recovery triggers a site refresh as a side effect.
    pub async fn connection_status(
        &self,
        admin: bool,
        site_id: Option<&str>,
    ) -> Result<ConnectionStatus, CenterError> {
        self.check_permission(admin)?;
        let id = site_id.unwrap_or(&self.config.default_site_id);
        let site = self
            .registry
            .get(id)
            .ok_or_else(|| CenterError::UnknownSite(id.to_string()))?;
        let job = self.ensure_connection_check(site.clone());
        let states = job.connection_states().unwrap_or_default();

        if states.internet == ConnStatus::Failed && states.update_site == ConnStatus::Failed {
            info!(site = site.id(), "all channels failed, re-probing once");
            let states = crate::worker::probe_channels(self, &job, &site).await;
            let recovered =
                states.internet != ConnStatus::Failed && states.update_site != ConnStatus::Failed;
            if recovered {
                let center = self.strong();
                tokio::spawn(async move {
                    if let Err(err) = center.update_all_sites(false).await {
                        warn!(%err, "post-recovery site refresh failed");
                    }
                });
            }
            return Ok(ConnectionStatus {
                internet: states.internet,
                update_site: states.update_site,
            });
        }

        Ok(ConnectionStatus {
            internet: states.internet,
            update_site: states.update_site,
        })
    }

    /// Installation progress, optionally narrowed to one correlation
    /// group.
    pub fn install_status(
        &self,
        admin: bool,
        correlation_id: Option<Uuid>,
    ) -> Result<InstallStatus, CenterError> {
        self.check_permission(admin)?;
        let jobs: Vec<Arc<Job>> = self
            .jobs()
            .into_iter()
            .filter(|job| job.kind.is_installation())
            .filter(|job| match correlation_id {
                Some(id) => job.correlation_id() == Some(id),
                None => true,
            })
            .collect();

        let state = if jobs.is_empty() {
            InstallState::New
        } else if jobs.iter().any(|job| !job.status().is_terminal()) {
            InstallState::Running
        } else {
            InstallState::Complete
        };

        let rows = jobs
            .iter()
            .map(|job| {
                let plugin = job.kind.plugin().expect("installation jobs carry a plugin");
                let status = job.status();
                InstallJobStatus {
                    name: plugin.name.clone(),
                    version: plugin.version.clone(),
                    title: plugin.display_title().to_string(),
                    install_status: status.label().to_string(),
                    requires_restart: status.requires_restart(),
                    correlation_id: job.correlation_id(),
                }
            })
            .collect();

        Ok(InstallStatus { state, jobs: rows })
    }

    /// Installs interrupted by the previous shutdown: plugin name to its
    /// last persisted status. Empty when the previous session completed
    /// cleanly.
    pub fn incomplete_install_status(
        &self,
        admin: bool,
    ) -> Result<BTreeMap<String, String>, CenterError> {
        self.check_permission(admin)?;
        Ok(self.resume.load())
    }

    /// Drop every site's cached catalog; the next refresh of each site
    /// behaves as a first load.
    pub fn invalidate_data(&self, admin: bool) -> Result<(), CenterError> {
        self.check_permission(admin)?;
        for site in self.registry.list() {
            site.invalidate();
        }
        Ok(())
    }

    /// Schedule an orderly restart (idempotent).
    pub fn request_safe_restart(&self, admin: bool) -> Result<Arc<Job>, CenterError> {
        self.check_permission(admin)?;
        Ok(self.schedule_restart())
    }

    /// Cancel a pending restart. Answers whether one was canceled.
    pub fn request_cancel_restart(&self, admin: bool) -> Result<bool, CenterError> {
        self.check_permission(admin)?;
        Ok(self.cancel_restart())
    }

    /// Enqueue a core upgrade from the default site.
    pub fn request_core_upgrade(&self, admin: bool) -> Result<Arc<Job>, CenterError> {
        self.check_permission(admin)?;
        self.upgrade_core()
    }

    /// Enqueue a core downgrade to the backed-up binary.
    pub fn request_core_downgrade(&self, admin: bool) -> Result<Arc<Job>, CenterError> {
        self.check_permission(admin)?;
        Ok(self.downgrade_core())
    }
}
