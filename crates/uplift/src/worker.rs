//! Installer worker and the per-kind job state machines.
//!
//! Exactly one installer job runs at a time, in submission order. Any
//! error is caught at the job boundary, logged and recorded as a
//! `Failure` status; nothing unwinds the worker loop.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use uplift_fetch::{DownloadOptions, FetchError, download_to};
use uplift_site::{CoreEntry, PluginEntry, UPLOAD_SITE_ID, UpdateSite};
use uplift_verify::{VerifyError, verify_digests};
use uuid::Uuid;

use crate::center::UpdateCenter;
use crate::job::{ConnStatus, ConnectionStates, Install, Job, JobKind, JobStatus};
use crate::runtime::DynamicLoadError;

#[derive(Debug, Error)]
enum JobError {
    #[error("plugin URL is not absolute: {0}")]
    RelativeUrl(String),

    #[error("{plugin} depends on {dependency}, which is neither installed nor part of this batch")]
    MissingDependency { plugin: String, dependency: String },

    #[error("no core backup exists to downgrade to")]
    NoCoreBackup,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("{0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub(crate) async fn run(center: Arc<UpdateCenter>, mut rx: mpsc::UnboundedReceiver<Arc<Job>>) {
    while let Some(job) = rx.recv().await {
        // canceled while pending
        if job.status().is_terminal() {
            continue;
        }
        let outcome = std::panic::AssertUnwindSafe(execute(&center, &job))
            .catch_unwind()
            .await;
        if outcome.is_err() {
            error!(job = %job.id(), kind = job.kind.name(), "job panicked");
            center.finish(
                &job,
                JobStatus::Failure {
                    message: "unexpected internal error".to_string(),
                },
            );
        }
    }
}

async fn execute(center: &UpdateCenter, job: &Arc<Job>) {
    match &job.kind {
        JobKind::ConnectionCheck { .. } => run_connection_check(center, job).await,
        JobKind::Install(install) => run_install(center, job, install).await,
        JobKind::Enable {
            plugin,
            dynamic_load,
        } => run_enable(center, job, plugin, *dynamic_load).await,
        JobKind::NoOp { .. } => center.finish(job, JobStatus::Success),
        JobKind::PluginDowngrade { plugin } => run_plugin_downgrade(center, job, plugin),
        JobKind::CoreUpgrade { core } => {
            let result = stage_core_upgrade(center, job, core).await;
            conclude(center, job, result);
        }
        JobKind::CoreDowngrade => {
            let result = restore_core_backup(center, job).await;
            conclude(center, job, result);
        }
        JobKind::CompleteBatch {
            correlation_id,
            batch,
        } => run_complete_batch(center, job, *correlation_id, batch).await,
        JobKind::Restart => run_restart(center, job).await,
    }
}

fn conclude(center: &UpdateCenter, job: &Arc<Job>, result: Result<JobStatus, JobError>) {
    match result {
        Ok(status) => center.finish(job, status),
        Err(err) => {
            error!(job = %job.id(), kind = job.kind.name(), %err, "job failed");
            center.finish(
                job,
                JobStatus::Failure {
                    message: err.to_string(),
                },
            );
        }
    }
}

// ---- connection check -----------------------------------------------------

pub(crate) async fn run_connection_check(center: &UpdateCenter, job: &Arc<Job>) {
    let Some(site) = job.site().cloned() else {
        center.finish(job, JobStatus::Success);
        return;
    };
    // locally uploaded plugins have nothing to probe
    if site.id() == UPLOAD_SITE_ID {
        center.finish(job, JobStatus::Success);
        return;
    }

    center.transition(job, JobStatus::Running);
    let states = probe_channels(center, job, &site).await;

    if states.internet == ConnStatus::Failed || states.update_site == ConnStatus::Failed {
        center.finish(
            job,
            JobStatus::Failure {
                message: format!("connectivity check failed for site {}", site.id()),
            },
        );
    } else {
        center.finish(job, JobStatus::Success);
    }
}

/// Probe both channels of a site, updating the job's connection states
/// as the probes progress. The internet probe runs concurrently on the
/// metadata pool; the update-site probe runs inline.
pub(crate) async fn probe_channels(
    center: &UpdateCenter,
    job: &Arc<Job>,
    site: &Arc<UpdateSite>,
) -> ConnectionStates {
    job.set_connection_states(|s| {
        s.internet = ConnStatus::Unchecked;
        s.update_site = ConnStatus::Unchecked;
    });

    let internet_probe = match site.connection_check_url() {
        None => {
            // no probe URL configured: internet check is skipped
            job.set_connection_states(|s| s.internet = ConnStatus::Skipped);
            None
        }
        Some(url) => {
            job.set_connection_states(|s| s.internet = ConnStatus::Checking);
            let center = center.strong();
            let job = job.clone();
            Some(tokio::spawn(async move {
                let verdict = probe(&center, &url).await;
                job.set_connection_states(|s| {
                    s.internet = if verdict.is_ok() {
                        ConnStatus::Ok
                    } else {
                        ConnStatus::Failed
                    }
                });
                if let Err(message) = verdict {
                    warn!(%url, %message, "internet probe failed");
                }
            }))
        }
    };

    job.set_connection_states(|s| s.update_site = ConnStatus::Checking);
    let probe_url = site.connection_check_probe_url();
    match probe(center, &probe_url).await {
        Ok(()) => job.set_connection_states(|s| s.update_site = ConnStatus::Ok),
        Err(message) => {
            warn!(url = %probe_url, %message, "update site probe failed");
            job.set_connection_states(|s| s.update_site = ConnStatus::Failed);
        }
    }

    if let Some(handle) = internet_probe {
        let _ = handle.await;
    }
    job.connection_states().unwrap_or_default()
}

async fn probe(center: &UpdateCenter, url: &str) -> Result<(), String> {
    match center
        .client
        .get_text(url, center.config.metadata_read_timeout)
        .await
    {
        Ok(_) => Ok(()),
        Err(err) => Err(probe_failure_message(url, &err)),
    }
}

/// Name-resolution failures get a DNS hint; everything else reports the
/// underlying error as-is.
fn probe_failure_message(url: &str, err: &FetchError) -> String {
    let detail = err.to_string();
    if detail.to_ascii_lowercase().contains("dns") {
        format!("name resolution failed for {url}; check DNS and proxy configuration ({detail})")
    } else {
        detail
    }
}

// ---- installation ---------------------------------------------------------

async fn run_install(center: &UpdateCenter, job: &Arc<Job>, install: &Install) {
    // An earlier queued install of the identical version owns the work;
    // wait on its monitor and skip if it installed the plugin.
    if let Some(earlier) = center.earlier_duplicate(job) {
        info!(
            job = %job.id(),
            earlier = %earlier.id(),
            plugin = %install.plugin.name,
            "identical install already queued, waiting"
        );
        let outcome = earlier.wait_terminal().await;
        if outcome.is_installed_outcome() {
            center.finish(job, JobStatus::Skipped);
            return;
        }
    }

    center.transition(job, JobStatus::Installing { percent: 0 });
    let result = install_plugin_file(center, job, install).await;
    conclude(center, job, result);
}

async fn install_plugin_file(
    center: &UpdateCenter,
    job: &Arc<Job>,
    install: &Install,
) -> Result<JobStatus, JobError> {
    let plugin = &install.plugin;
    if !plugin.has_absolute_url() {
        return Err(JobError::RelativeUrl(plugin.url.clone()));
    }
    check_dependencies(center, install)?;

    tokio::fs::create_dir_all(center.layout.plugins_dir()).await?;
    let destination = center.layout.destination(&plugin.name);

    let progress = |received: u64, total: Option<u64>| {
        if let Some(total) = total.filter(|t| *t > 0) {
            let percent = ((received * 100) / total).min(100) as u8;
            job.set_status(JobStatus::Installing { percent });
        }
    };
    let download = download_to(
        center.client.as_ref(),
        &plugin.url,
        &destination,
        DownloadOptions::new(center.config.download_read_timeout).on_progress(&progress),
    )
    .await?;

    if let Err(err) = verify_digests(&plugin.expected_digests(), &download.digests, &plugin.name) {
        let _ = tokio::fs::remove_file(&download.tmp_path).await;
        return Err(err.into());
    }

    let active = center.layout.activate(&download.tmp_path, &plugin.name)?;

    // a user-initiated install of a bundled plugin must survive host
    // upgrades
    if center.plugin_runtime.is_bundled(&plugin.name) {
        center.plugin_runtime.pin(&plugin.name)?;
    }

    if install.dynamic_load {
        match center
            .plugin_runtime
            .dynamic_load(&active, false, install.batch.as_deref())
            .await
        {
            Ok(()) => Ok(JobStatus::Success),
            Err(DynamicLoadError::RestartRequired(message)) => {
                Ok(JobStatus::SuccessRestartRequired { message })
            }
            Err(DynamicLoadError::Failed(message)) => Err(JobError::Runtime(message)),
        }
    } else {
        Ok(JobStatus::SuccessRestartRequired {
            message: format!("{} will be activated on the next restart", plugin.name),
        })
    }
}

fn check_dependencies(center: &UpdateCenter, install: &Install) -> Result<(), JobError> {
    let installed: HashSet<String> = center
        .plugin_runtime
        .installed()
        .into_iter()
        .map(|plugin| plugin.name)
        .collect();
    let batch: HashSet<&str> = install
        .batch
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|plugin| plugin.name.as_str())
        .collect();

    for dependency in install.plugin.required_dependencies() {
        if !installed.contains(&dependency.name) && !batch.contains(dependency.name.as_str()) {
            return Err(JobError::MissingDependency {
                plugin: install.plugin.name.clone(),
                dependency: dependency.name.clone(),
            });
        }
    }
    Ok(())
}

// ---- enable / downgrade ---------------------------------------------------

async fn run_enable(
    center: &UpdateCenter,
    job: &Arc<Job>,
    plugin: &PluginEntry,
    dynamic_load: bool,
) {
    center.transition(job, JobStatus::Running);
    if let Err(err) = center.plugin_runtime.enable(&plugin.name).await {
        conclude(center, job, Err(JobError::Runtime(err.to_string())));
        return;
    }

    if !dynamic_load {
        center.finish(
            job,
            JobStatus::SuccessRestartRequired {
                message: format!("{} enabled; restart to activate", plugin.name),
            },
        );
        return;
    }

    // reload failures are not install failures: the plugin is enabled,
    // activation just waits for a restart
    let path = center.layout.destination(&plugin.name);
    let status = match center.plugin_runtime.dynamic_load(&path, false, None).await {
        Ok(()) => JobStatus::Success,
        Err(DynamicLoadError::RestartRequired(message)) => {
            JobStatus::SuccessRestartRequired { message }
        }
        Err(DynamicLoadError::Failed(message)) => JobStatus::SuccessRestartRequired {
            message: format!("{} enabled but live reload failed: {message}", plugin.name),
        },
    };
    center.finish(job, status);
}

fn run_plugin_downgrade(center: &UpdateCenter, job: &Arc<Job>, plugin: &PluginEntry) {
    center.transition(job, JobStatus::Running);
    match center.layout.restore_backup(&plugin.name) {
        Ok(_) => center.finish(
            job,
            JobStatus::SuccessRestartRequired {
                message: format!("{} reverted to its backup; restart to activate", plugin.name),
            },
        ),
        Err(err) => conclude(center, job, Err(JobError::Io(err))),
    }
}

// ---- core upgrade / downgrade ---------------------------------------------

async fn stage_core_upgrade(
    center: &UpdateCenter,
    job: &Arc<Job>,
    core: &CoreEntry,
) -> Result<JobStatus, JobError> {
    center.transition(job, JobStatus::Running);
    tokio::fs::create_dir_all(&center.config.home).await?;
    let destination = center.layout.core_destination();

    let download = download_to(
        center.client.as_ref(),
        &core.url,
        &destination,
        DownloadOptions::new(center.config.download_read_timeout),
    )
    .await?;

    if let Err(err) = verify_digests(&core.expected_digests(), &download.digests, "core") {
        let _ = tokio::fs::remove_file(&download.tmp_path).await;
        return Err(err.into());
    }

    tokio::fs::rename(&download.tmp_path, &destination).await?;
    center
        .lifecycle
        .rewrite_core(&destination)
        .await
        .map_err(JobError::Io)?;

    // the host binary was swapped; there is no dynamic path for the core
    Ok(JobStatus::SuccessRestartRequired {
        message: format!("core {} staged; restart to take effect", core.version),
    })
}

async fn restore_core_backup(
    center: &UpdateCenter,
    job: &Arc<Job>,
) -> Result<JobStatus, JobError> {
    center.transition(job, JobStatus::Running);
    let backup = center.layout.core_backup();
    if !backup.exists() {
        return Err(JobError::NoCoreBackup);
    }
    center
        .lifecycle
        .rewrite_core(&backup)
        .await
        .map_err(JobError::Io)?;
    Ok(JobStatus::SuccessRestartRequired {
        message: "core reverted to backup; restart to take effect".to_string(),
    })
}

// ---- batch completion / restart -------------------------------------------

async fn run_complete_batch(
    center: &UpdateCenter,
    job: &Arc<Job>,
    correlation_id: Uuid,
    batch: &[PluginEntry],
) {
    center.transition(job, JobStatus::Running);

    // installs of this wave were submitted ahead of us on the same
    // worker, so they are already terminal; waiting keeps the ordering
    // contract explicit
    let siblings: Vec<Arc<Job>> = center
        .jobs()
        .into_iter()
        .filter(|sibling| {
            sibling.id() != job.id()
                && sibling.kind.is_installation()
                && sibling.correlation_id() == Some(correlation_id)
        })
        .collect();
    for sibling in siblings {
        sibling.wait_terminal().await;
    }

    let result = match center.plugin_runtime.start_batch(batch).await {
        Ok(()) => Ok(JobStatus::Success),
        Err(DynamicLoadError::RestartRequired(message)) => {
            Ok(JobStatus::SuccessRestartRequired { message })
        }
        Err(DynamicLoadError::Failed(message)) => Err(JobError::Runtime(message)),
    };
    let elapsed = chrono::Utc::now() - job.created_at();
    info!(%correlation_id, elapsed_ms = elapsed.num_milliseconds(), "install wave settled");
    conclude(center, job, result);
}

async fn run_restart(center: &UpdateCenter, job: &Arc<Job>) {
    center.transition(job, JobStatus::Running);
    if let Err(err) = center.lifecycle.safe_restart().await {
        conclude(center, job, Err(JobError::Io(err)));
    }
    // on success the process is on its way down; the job stays Running
}
