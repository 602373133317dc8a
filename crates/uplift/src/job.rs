//! The job record and its status machinery.
//!
//! Every unit of installer work is one [`Job`]: a shared base record (id,
//! owning site, correlation id, status) plus a [`JobKind`] payload the
//! worker loop dispatches on. Status is a plain value replaced on
//! transition and observed through a `watch` monitor, which doubles as
//! the wake-up channel for duplicate-install deduplication.

use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use uplift_site::{CoreEntry, PluginEntry, UpdateSite};
use uuid::Uuid;

use crate::error::CenterError;

/// Process-wide monotonically increasing job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a job. Immutable value, replaced on transition; exactly one
/// terminal transition per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Installing { percent: u8 },
    Success,
    SuccessRestartRequired { message: String },
    Skipped,
    Failure { message: String },
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success
                | JobStatus::SuccessRestartRequired { .. }
                | JobStatus::Skipped
                | JobStatus::Failure { .. }
                | JobStatus::Canceled
        )
    }

    /// Terminal states that left the artifact installed.
    pub fn is_installed_outcome(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::SuccessRestartRequired { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::SuccessRestartRequired { .. } | JobStatus::Skipped
        )
    }

    pub fn requires_restart(&self) -> bool {
        matches!(self, JobStatus::SuccessRestartRequired { .. })
    }

    /// Stable label used by status projections and the resume store.
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running => "Running",
            JobStatus::Installing { .. } => "Installing",
            JobStatus::Success => "Success",
            JobStatus::SuccessRestartRequired { .. } => "SuccessButRequiresRestart",
            JobStatus::Skipped => "Skipped",
            JobStatus::Failure { .. } => "Failure",
            JobStatus::Canceled => "Canceled",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            JobStatus::SuccessRestartRequired { message } | JobStatus::Failure { message } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// Connectivity probe state for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnStatus {
    Precheck,
    Checking,
    Skipped,
    Unchecked,
    Ok,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectionStates {
    pub internet: ConnStatus,
    #[serde(rename = "updatesite")]
    pub update_site: ConnStatus,
}

impl Default for ConnectionStates {
    fn default() -> Self {
        Self {
            internet: ConnStatus::Precheck,
            update_site: ConnStatus::Precheck,
        }
    }
}

/// Payload of an installation job.
#[derive(Debug, Clone)]
pub struct Install {
    /// Catalog entry snapshot captured at enqueue time.
    pub plugin: PluginEntry,
    /// Load into the live process on success instead of waiting for a
    /// restart.
    pub dynamic_load: bool,
    /// Sibling plugins of the same install wave.
    pub batch: Option<Vec<PluginEntry>>,
}

/// The tagged union the worker loop dispatches on.
pub enum JobKind {
    ConnectionCheck {
        states: Mutex<ConnectionStates>,
    },
    Install(Install),
    Enable {
        plugin: PluginEntry,
        dynamic_load: bool,
    },
    NoOp {
        plugin: PluginEntry,
    },
    PluginDowngrade {
        plugin: PluginEntry,
    },
    CoreUpgrade {
        core: CoreEntry,
    },
    CoreDowngrade,
    CompleteBatch {
        correlation_id: Uuid,
        batch: Vec<PluginEntry>,
    },
    Restart,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::ConnectionCheck { .. } => "connection-check",
            JobKind::Install(_) => "install",
            JobKind::Enable { .. } => "enable",
            JobKind::NoOp { .. } => "noop",
            JobKind::PluginDowngrade { .. } => "plugin-downgrade",
            JobKind::CoreUpgrade { .. } => "core-upgrade",
            JobKind::CoreDowngrade => "core-downgrade",
            JobKind::CompleteBatch { .. } => "complete-batch",
            JobKind::Restart => "restart",
        }
    }

    /// Jobs surfaced by the install-status projection and persisted by
    /// the resume store.
    pub fn is_installation(&self) -> bool {
        matches!(
            self,
            JobKind::Install(_)
                | JobKind::Enable { .. }
                | JobKind::NoOp { .. }
                | JobKind::PluginDowngrade { .. }
        )
    }

    /// The plugin an installation-flavored job concerns.
    pub fn plugin(&self) -> Option<&PluginEntry> {
        match self {
            JobKind::Install(install) => Some(&install.plugin),
            JobKind::Enable { plugin, .. }
            | JobKind::NoOp { plugin }
            | JobKind::PluginDowngrade { plugin } => Some(plugin),
            _ => None,
        }
    }
}

pub struct Job {
    id: JobId,
    site: Option<Arc<UpdateSite>>,
    correlation_id: OnceLock<Uuid>,
    created_at: DateTime<Utc>,
    pub kind: JobKind,
    status: watch::Sender<JobStatus>,
}

impl Job {
    pub(crate) fn new(id: JobId, site: Option<Arc<UpdateSite>>, kind: JobKind) -> Self {
        let (status, _) = watch::channel(JobStatus::Pending);
        Self {
            id,
            site,
            correlation_id: OnceLock::new(),
            created_at: Utc::now(),
            kind,
            status,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn site(&self) -> Option<&Arc<UpdateSite>> {
        self.site.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Correlation id grouping a batch of installs; settable exactly once.
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id.get().copied()
    }

    pub fn set_correlation_id(&self, id: Uuid) -> Result<(), CenterError> {
        self.correlation_id
            .set(id)
            .map_err(|_| CenterError::CorrelationAlreadySet(self.id.0))
    }

    /// Replace the status. Transitions out of a terminal state are
    /// ignored, which enforces the single-terminal-transition contract
    /// even under racing writers.
    pub(crate) fn set_status(&self, next: JobStatus) {
        self.status.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            debug!(job = %self.id, from = current.label(), to = next.label(), "transition");
            *current = next;
            true
        });
    }

    /// Wait until this job reaches a terminal state and return it. This
    /// is the monitor duplicate installs block on.
    pub async fn wait_terminal(&self) -> JobStatus {
        let mut rx = self.status.subscribe();
        let status = rx
            .wait_for(|status| status.is_terminal())
            .await
            .expect("job status sender lives as long as the job");
        status.clone()
    }

    /// Connection states, for connection-check jobs.
    pub fn connection_states(&self) -> Option<ConnectionStates> {
        match &self.kind {
            JobKind::ConnectionCheck { states } => {
                Some(*states.lock().expect("connection state lock poisoned"))
            }
            _ => None,
        }
    }

    pub(crate) fn set_connection_states(&self, update: impl FnOnce(&mut ConnectionStates)) {
        if let JobKind::ConnectionCheck { states } = &self.kind {
            update(&mut states.lock().expect("connection state lock poisoned"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(kind: JobKind) -> Job {
        Job::new(JobId(1), None, kind)
    }

    #[test]
    fn terminal_transitions_are_final() {
        let j = job(JobKind::Restart);
        j.set_status(JobStatus::Running);
        j.set_status(JobStatus::Success);
        j.set_status(JobStatus::Failure {
            message: "late".to_string(),
        });
        assert_eq!(j.status(), JobStatus::Success);
    }

    #[test]
    fn pending_to_canceled_is_allowed() {
        let j = job(JobKind::Restart);
        j.set_status(JobStatus::Canceled);
        assert_eq!(j.status(), JobStatus::Canceled);
        j.set_status(JobStatus::Running);
        assert_eq!(j.status(), JobStatus::Canceled);
    }

    #[test]
    fn correlation_id_is_set_once() {
        let j = job(JobKind::Restart);
        let id = Uuid::new_v4();
        j.set_correlation_id(id).unwrap();
        assert!(j.set_correlation_id(Uuid::new_v4()).is_err());
        assert_eq!(j.correlation_id(), Some(id));
    }

    #[tokio::test]
    async fn wait_terminal_sees_past_transitions() {
        let j = job(JobKind::Restart);
        j.set_status(JobStatus::Skipped);
        assert_eq!(j.wait_terminal().await, JobStatus::Skipped);
    }

    #[tokio::test]
    async fn wait_terminal_wakes_on_transition() {
        let j = Arc::new(job(JobKind::Restart));
        let waiter = {
            let j = j.clone();
            tokio::spawn(async move { j.wait_terminal().await })
        };
        tokio::task::yield_now().await;
        j.set_status(JobStatus::Success);
        assert_eq!(waiter.await.unwrap(), JobStatus::Success);
    }
}
