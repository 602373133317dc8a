use thiserror::Error;
use uplift_site::SiteError;

#[derive(Debug, Error)]
pub enum CenterError {
    /// The caller lacks administrative rights. No job is created.
    #[error("permission denied")]
    PermissionDenied,

    #[error("unknown update site: {0}")]
    UnknownSite(String),

    #[error("site {0} publishes no core release")]
    NoCoreEntry(String),

    #[error("job {0} already carries a correlation id")]
    CorrelationAlreadySet(u64),

    #[error("outbound update-center requests are disabled")]
    UpdatesDisabled,

    #[error(transparent)]
    Site(#[from] SiteError),
}
