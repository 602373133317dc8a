//! Update center for a long-running CI controller.
//!
//! The update center discovers plugin catalogs on remote update sites,
//! downloads and cryptographically verifies artifacts, and installs them
//! through a strictly serialized job queue. It survives restarts by
//! persisting in-flight install state and exposes JSON-shaped status
//! projections for an external UI.
//!
//! # Architecture
//!
//! - [`config`] - process configuration, constructed by the embedder or
//!   from `UPLIFT_*` environment variables
//! - [`job`] - the job record, the status value and its monitors
//! - [`center`] - the [`UpdateCenter`]: job queue, site coordination,
//!   process-wide flags
//! - `worker` - the single installer worker and the per-kind state
//!   machines
//! - [`layout`] - plugin directory file discipline (`.jpi`/`.hpi`/`.bak`)
//! - [`resume`] - durable in-flight install state
//! - [`api`] - the read-only status surface and POST-shaped operations
//! - [`runtime`] - contracts of the plugin runtime and process lifecycle
//!   collaborators
//!
//! Two execution facilities cooperate: the installer worker runs exactly
//! one job at a time in submission order, while metadata work (site
//! refreshes, connectivity probes) runs concurrently and never touches
//! installer state beyond its owning site.

pub mod api;
pub mod center;
pub mod config;
mod error;
pub mod job;
pub mod layout;
pub mod resume;
pub mod runtime;
mod worker;

pub use api::{ConnectionStatus, InstallJobStatus, InstallState, InstallStatus};
pub use center::UpdateCenter;
pub use config::Config;
pub use error::CenterError;
pub use job::{ConnStatus, ConnectionStates, Install, Job, JobId, JobKind, JobStatus};
pub use runtime::{DynamicLoadError, InstalledPlugin, Lifecycle, PluginRuntime};

pub use uplift_fetch::{FetchError, HttpClient, ReqwestClient};
pub use uplift_site::{
    CoreEntry, PluginEntry, SignatureValidator, SiteError, SiteRegistry, UpdateSite,
};
