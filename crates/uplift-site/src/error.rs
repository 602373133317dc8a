use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uplift_fetch::FetchError;

#[derive(Debug, Error)]
pub enum SiteError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("site {site}: catalog is not valid JSON: {source}")]
    MalformedJson {
        site: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("site {site}: catalog signature rejected: {detail}")]
    SignatureRejected { site: String, detail: String },

    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
