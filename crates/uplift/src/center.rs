//! The update center: job queue, site coordination, process-wide flags.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use uplift_fetch::HttpClient;
use uplift_site::{
    CoreEntry, MetadataCache, PluginEntry, SignatureValidator, SiteError, SiteRegistry,
    UPLOAD_SITE_ID, UpdateSite, merge_site_plugins,
};

use crate::config::Config;
use crate::error::CenterError;
use crate::job::{ConnectionStates, Install, Job, JobId, JobKind, JobStatus};
use crate::layout::PluginLayout;
use crate::resume::InstallResumeStore;
use crate::runtime::{Lifecycle, PluginRuntime};
use crate::worker;

struct CenterState {
    /// Every job of this process lifetime, oldest first. Grows
    /// unboundedly during a session; never shrinks.
    jobs: Vec<Arc<Job>>,
    /// Sites for which a connection check has been scheduled.
    sources_used: HashSet<String>,
    /// Monotonic: once set it never clears within this process.
    requires_restart: bool,
    next_id: u64,
}

/// The update-center subsystem.
///
/// One instance per controller process. Installer jobs execute strictly
/// one at a time in submission order on a dedicated worker task; metadata
/// work (catalog refreshes, connectivity probes) runs concurrently and
/// only ever touches its owning site.
///
/// Construction spawns the installer worker, so it must happen inside a
/// tokio runtime.
pub struct UpdateCenter {
    pub(crate) config: Config,
    pub(crate) registry: Arc<SiteRegistry>,
    pub(crate) client: Arc<dyn HttpClient>,
    pub(crate) plugin_runtime: Arc<dyn PluginRuntime>,
    pub(crate) lifecycle: Arc<dyn Lifecycle>,
    pub(crate) layout: PluginLayout,
    pub(crate) resume: InstallResumeStore,
    cache: MetadataCache,
    state: Mutex<CenterState>,
    installer_tx: mpsc::UnboundedSender<Arc<Job>>,
    /// Back-reference handed to spawned tasks.
    self_ref: Weak<UpdateCenter>,
}

impl UpdateCenter {
    pub fn new(
        config: Config,
        client: Arc<dyn HttpClient>,
        plugin_runtime: Arc<dyn PluginRuntime>,
        lifecycle: Arc<dyn Lifecycle>,
        validator: Arc<dyn SignatureValidator>,
    ) -> Result<Arc<Self>, CenterError> {
        let registry = Arc::new(SiteRegistry::load(
            config.registry_path(),
            &config.default_site_id,
            &config.update_center_url,
            validator,
        )?);
        let (installer_tx, installer_rx) = mpsc::unbounded_channel();
        let center = Arc::new_cyclic(|self_ref| Self {
            layout: PluginLayout::new(&config.home),
            resume: InstallResumeStore::new(config.install_state_path()),
            cache: MetadataCache::new(&config.home),
            config,
            registry,
            client,
            plugin_runtime,
            lifecycle,
            state: Mutex::new(CenterState {
                jobs: Vec::new(),
                sources_used: HashSet::new(),
                requires_restart: false,
                next_id: 1,
            }),
            installer_tx,
            self_ref: self_ref.clone(),
        });
        tokio::spawn(worker::run(center.clone(), installer_rx));
        Ok(center)
    }

    /// A strong handle for spawned tasks. The center is always behind an
    /// `Arc`, so upgrading only fails during teardown.
    pub(crate) fn strong(&self) -> Arc<UpdateCenter> {
        self.self_ref
            .upgrade()
            .expect("update center dropped while still in use")
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SiteRegistry> {
        &self.registry
    }

    // ---- job queue -------------------------------------------------------

    /// Append a job, scheduling the site's one-time connection check
    /// first if this is the first job that site ever hosted.
    pub(crate) fn add_job(
        &self,
        site: Option<Arc<UpdateSite>>,
        kind: JobKind,
    ) -> Arc<Job> {
        let mut submissions: Vec<Arc<Job>> = Vec::with_capacity(2);
        let job = {
            let mut state = self.state.lock().expect("center state lock poisoned");
            if let Some(site) = &site {
                if state.sources_used.insert(site.id().to_string()) {
                    let check = new_job_locked(
                        &mut state,
                        Some(site.clone()),
                        JobKind::ConnectionCheck {
                            states: Mutex::new(ConnectionStates::default()),
                        },
                    );
                    submissions.push(check);
                }
            }
            let job = new_job_locked(&mut state, site, kind);
            submissions.push(job.clone());
            job
        };
        let is_installation = job.kind.is_installation();
        for submission in submissions {
            self.submit(submission);
        }
        if is_installation {
            self.persist_install_status();
        }
        job
    }

    /// Route a job to its execution facility: connection checks run on
    /// the metadata pool, everything else queues for the single installer
    /// worker.
    fn submit(&self, job: Arc<Job>) {
        info!(job = %job.id(), kind = job.kind.name(), "job submitted");
        match job.kind {
            JobKind::ConnectionCheck { .. } => {
                let center = self.strong();
                tokio::spawn(async move {
                    worker::run_connection_check(&center, &job).await;
                });
            }
            _ => {
                // receiver only drops when the center does
                let _ = self.installer_tx.send(job);
            }
        }
    }

    /// Oldest-first snapshot of every job this process has seen.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.state
            .lock()
            .expect("center state lock poisoned")
            .jobs
            .clone()
    }

    pub fn job(&self, id: JobId) -> Option<Arc<Job>> {
        self.jobs().into_iter().find(|j| j.id() == id)
    }

    /// Latest installation job for `(plugin name, source site)`.
    pub fn latest_install_for(&self, name: &str, source_id: &str) -> Option<Arc<Job>> {
        self.jobs()
            .into_iter()
            .rev()
            .find(|job| match job.kind.plugin() {
                Some(plugin) => plugin.name == name && plugin.source_id == source_id,
                None => false,
            })
    }

    /// Earlier install of the identical plugin version, for
    /// duplicate-install deduplication.
    pub(crate) fn earlier_duplicate(&self, job: &Arc<Job>) -> Option<Arc<Job>> {
        let JobKind::Install(install) = &job.kind else {
            return None;
        };
        self.jobs()
            .into_iter()
            .filter(|candidate| candidate.id() < job.id())
            .find(|candidate| match &candidate.kind {
                JobKind::Install(other) => {
                    other.plugin.name == install.plugin.name
                        && other.plugin.version == install.plugin.version
                }
                _ => false,
            })
    }

    pub(crate) fn connection_check_job(&self, site_id: &str) -> Option<Arc<Job>> {
        self.jobs().into_iter().find(|job| {
            matches!(job.kind, JobKind::ConnectionCheck { .. })
                && job.site().is_some_and(|s| s.id() == site_id)
        })
    }

    /// The one connection-check job for a site, creating and scheduling
    /// it if the site has never been checked.
    pub(crate) fn ensure_connection_check(&self, site: Arc<UpdateSite>) -> Arc<Job> {
        if let Some(existing) = self.connection_check_job(site.id()) {
            return existing;
        }
        let job = {
            let mut state = self.state.lock().expect("center state lock poisoned");
            if !state.sources_used.insert(site.id().to_string()) {
                // lost the race: someone else scheduled it
                drop(state);
                return self
                    .connection_check_job(site.id())
                    .expect("used source always has a check job");
            }
            new_job_locked(
                &mut state,
                Some(site),
                JobKind::ConnectionCheck {
                    states: Mutex::new(ConnectionStates::default()),
                },
            )
        };
        self.submit(job.clone());
        job
    }

    // ---- enqueue operations ---------------------------------------------

    /// Install a plugin from its catalog entry snapshot.
    pub fn install_plugin(
        &self,
        plugin: PluginEntry,
        dynamic_load: bool,
        correlation_id: Option<Uuid>,
        batch: Option<Vec<PluginEntry>>,
    ) -> Arc<Job> {
        let site = self.registry.get(&plugin.source_id);
        let job = self.add_job(
            site,
            JobKind::Install(Install {
                plugin,
                dynamic_load,
                batch,
            }),
        );
        if let Some(id) = correlation_id {
            let _ = job.set_correlation_id(id);
        }
        job
    }

    /// Toggle an installed plugin back on, optionally reloading it live.
    pub fn enable_plugin(&self, plugin: PluginEntry, dynamic_load: bool) -> Arc<Job> {
        let site = self.registry.get(&plugin.source_id);
        self.add_job(
            site,
            JobKind::Enable {
                plugin,
                dynamic_load,
            },
        )
    }

    /// Report "already installed at the desired version" through the
    /// normal status surface.
    pub fn noop_plugin(&self, plugin: PluginEntry) -> Arc<Job> {
        let site = self.registry.get(&plugin.source_id);
        self.add_job(site, JobKind::NoOp { plugin })
    }

    /// Revert a plugin to the `.bak` sibling of its active file.
    pub fn downgrade_plugin(&self, plugin: PluginEntry) -> Arc<Job> {
        let site = self.registry.get(&plugin.source_id);
        self.add_job(site, JobKind::PluginDowngrade { plugin })
    }

    /// Upgrade the host core from the default site's core entry.
    pub fn upgrade_core(&self) -> Result<Arc<Job>, CenterError> {
        let site = self.registry.default_site();
        let core = site
            .core_entry()
            .ok_or_else(|| CenterError::NoCoreEntry(site.id().to_string()))?;
        Ok(self.add_job(Some(site), JobKind::CoreUpgrade { core }))
    }

    /// Downgrade the host core to the backed-up binary.
    pub fn downgrade_core(&self) -> Arc<Job> {
        let site = self.registry.default_site();
        self.add_job(Some(site), JobKind::CoreDowngrade)
    }

    /// Activate a completed install wave once all its installs settle.
    pub fn complete_batch(
        &self,
        correlation_id: Uuid,
        batch: Vec<PluginEntry>,
    ) -> Arc<Job> {
        let job = self.add_job(
            None,
            JobKind::CompleteBatch {
                correlation_id,
                batch,
            },
        );
        let _ = job.set_correlation_id(correlation_id);
        job
    }

    /// Schedule an orderly restart. Idempotent: a restart already pending
    /// or running is returned instead of enqueuing a duplicate, even when
    /// two requests race.
    pub fn schedule_restart(&self) -> Arc<Job> {
        let job = {
            let mut state = self.state.lock().expect("center state lock poisoned");
            let existing = state
                .jobs
                .iter()
                .find(|job| matches!(job.kind, JobKind::Restart) && !job.status().is_terminal());
            if let Some(existing) = existing {
                return existing.clone();
            }
            new_job_locked(&mut state, None, JobKind::Restart)
        };
        self.submit(job.clone());
        job
    }

    pub fn is_restart_scheduled(&self) -> bool {
        self.pending_restart().is_some()
    }

    /// Cancel a scheduled restart; only possible while it is pending.
    pub fn cancel_restart(&self) -> bool {
        for job in self.jobs() {
            if matches!(job.kind, JobKind::Restart) && job.status() == JobStatus::Pending {
                job.set_status(JobStatus::Canceled);
                info!(job = %job.id(), "restart canceled");
                return true;
            }
        }
        false
    }

    fn pending_restart(&self) -> Option<Arc<Job>> {
        self.jobs()
            .into_iter()
            .find(|job| matches!(job.kind, JobKind::Restart) && !job.status().is_terminal())
    }

    // ---- status transitions ---------------------------------------------

    /// Non-terminal transition.
    pub(crate) fn transition(&self, job: &Arc<Job>, status: JobStatus) {
        job.set_status(status);
        if job.kind.is_installation() {
            self.persist_install_status();
        }
    }

    /// Terminal transition: records the restart flag and syncs the
    /// resume store.
    pub(crate) fn finish(&self, job: &Arc<Job>, status: JobStatus) {
        if status.requires_restart() {
            let mut state = self.state.lock().expect("center state lock poisoned");
            if !state.requires_restart {
                state.requires_restart = true;
                info!(job = %job.id(), "restart now required");
            }
        }
        info!(job = %job.id(), kind = job.kind.name(), status = status.label(), "job finished");
        job.set_status(status);
        if job.kind.is_installation() {
            self.persist_install_status();
        }
    }

    /// True once any job completed with a restart-required outcome.
    /// Never clears within a process lifetime.
    pub fn requires_restart(&self) -> bool {
        self.state
            .lock()
            .expect("center state lock poisoned")
            .requires_restart
    }

    /// Mirror in-flight install state to durable storage: persisted
    /// while any installation is non-successful, cleared once all have
    /// succeeded.
    pub(crate) fn persist_install_status(&self) {
        let installs: Vec<Arc<Job>> = self
            .jobs()
            .into_iter()
            .filter(|job| job.kind.is_installation())
            .collect();
        if installs.is_empty() {
            return;
        }
        if installs.iter().all(|job| job.status().is_success()) {
            self.resume.clear();
            return;
        }
        let mut statuses = BTreeMap::new();
        for job in installs {
            if let Some(plugin) = job.kind.plugin() {
                statuses.insert(plugin.name.clone(), job.status().label().to_string());
            }
        }
        self.resume.save(&statuses);
    }

    pub fn resume_store(&self) -> &InstallResumeStore {
        &self.resume
    }

    // ---- site coordination ----------------------------------------------

    /// Seed site snapshots from the metadata cache without touching the
    /// network, e.g. right after startup.
    pub fn load_cached_catalogs(&self) {
        for site in self.registry.list() {
            if site.has_data() {
                continue;
            }
            if let Some(body) = self.cache.read(site.id()) {
                match site.apply_catalog(&body, self.config.signature_check) {
                    Ok(()) => info!(site = site.id(), "catalog loaded from cache"),
                    Err(err) => warn!(site = site.id(), %err, "cached catalog rejected"),
                }
            }
        }
    }

    /// Refresh site catalogs concurrently, writing successful bodies
    /// through the metadata cache. Without `force`, sites whose cached
    /// copy is still fresh are skipped. Site failures stay local: each
    /// site reports its own outcome.
    pub async fn update_all_sites(
        &self,
        force: bool,
    ) -> Result<Vec<(String, Result<(), SiteError>)>, CenterError> {
        if self.config.never_update {
            return Err(CenterError::UpdatesDisabled);
        }
        let sites = self.registry.list();
        let refreshes = sites.iter().map(|site| {
            let site = site.clone();
            async move {
                if site.id() == UPLOAD_SITE_ID {
                    return (site.id().to_string(), Ok(()));
                }
                if !force && site.has_data() && !self.cache.is_due(site.id(), self.config.default_interval)
                {
                    return (site.id().to_string(), Ok(()));
                }
                let outcome = site
                    .refresh(
                        self.client.as_ref(),
                        self.config.signature_check,
                        self.config.metadata_read_timeout,
                    )
                    .await;
                let outcome = outcome.and_then(|refresh| {
                    self.cache
                        .write(site.id(), &refresh.body, Some(refresh.timestamp))
                });
                (site.id().to_string(), outcome)
            }
        });
        Ok(join_all(refreshes).await)
    }

    /// Merged availability across all sites, first site winning the
    /// primary entry per plugin name.
    pub fn merged_available(&self) -> BTreeMap<String, PluginEntry> {
        let per_site: Vec<Vec<PluginEntry>> = self
            .registry
            .list()
            .iter()
            .map(|site| site.get_availables())
            .collect();
        merge_site_plugins(&per_site)
    }

    /// Merged view of plugins installed at a strictly lower version than
    /// some site offers.
    pub fn merged_updates(&self) -> BTreeMap<String, PluginEntry> {
        let installed = self.installed_versions();
        let per_site: Vec<Vec<PluginEntry>> = self
            .registry
            .list()
            .iter()
            .map(|site| site.get_updates(&installed))
            .collect();
        merge_site_plugins(&per_site)
    }

    pub(crate) fn installed_versions(&self) -> BTreeMap<String, String> {
        self.plugin_runtime
            .installed()
            .into_iter()
            .map(|plugin| (plugin.name, plugin.version))
            .collect()
    }

    /// Core entry of the default site, if it publishes one.
    pub fn core_entry(&self) -> Option<CoreEntry> {
        self.registry.default_site().core_entry()
    }
}

fn new_job_locked(
    state: &mut CenterState,
    site: Option<Arc<UpdateSite>>,
    kind: JobKind,
) -> Arc<Job> {
    let job = Arc::new(Job::new(JobId(state.next_id), site, kind));
    state.next_id += 1;
    state.jobs.push(job.clone());
    job
}
