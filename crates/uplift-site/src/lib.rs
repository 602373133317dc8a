//! Update-site catalogs.
//!
//! An update site is a remote HTTP endpoint serving a signed JSON catalog
//! of plugins and core releases. This crate owns everything catalog-shaped:
//!
//! - `entry` - the parsed catalog data model (plugins, core, warnings)
//! - `site` - one site: cached data snapshot, refresh, derived indices
//! - `registry` - the ordered, persisted collection of sites
//! - `merge` - collapsing per-site plugin lists into a single view
//! - `cache` - the on-disk metadata cache under `<home>/updates/`
//! - `validator` - the signature-validation seam
//! - `version` - lenient version ordering for update detection

mod cache;
mod entry;
mod error;
mod merge;
mod registry;
mod site;
mod validator;
mod version;

pub use cache::MetadataCache;
pub use entry::{CoreEntry, Dependency, PluginEntry, SiteData, Warning, WarningVersionRange};
pub use error::SiteError;
pub use merge::merge_site_plugins;
pub use registry::{SiteRegistry, DEFAULT_SITE_ID, UPLOAD_SITE_ID};
pub use site::{RefreshOutcome, UpdateSite};
pub use validator::{AcceptAll, SignatureValidator, VerificationResult};
pub use version::PluginVersion;
