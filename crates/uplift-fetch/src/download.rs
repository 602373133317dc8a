use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uplift_verify::{ComputedDigests, MultiHasher};

use crate::client::HttpClient;
use crate::error::{FetchError, Result};

/// Knobs for one streaming download.
pub struct DownloadOptions<'a> {
    pub read_timeout: Duration,
    /// Called after every chunk with (bytes received, declared total).
    pub on_progress: Option<&'a (dyn Fn(u64, Option<u64>) + Send + Sync)>,
}

impl<'a> DownloadOptions<'a> {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            on_progress: None,
        }
    }

    pub fn on_progress(
        mut self,
        callback: &'a (dyn Fn(u64, Option<u64>) + Send + Sync),
    ) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

/// Outcome of a completed streaming download. The bytes sit in `tmp_path`
/// next to the intended destination; the caller verifies the digests and
/// either renames the file into place or deletes it.
#[derive(Debug)]
pub struct Download {
    pub tmp_path: PathBuf,
    pub digests: ComputedDigests,
    pub bytes_received: u64,
    pub final_url: String,
}

/// Stream `url` to `<destination>.tmp`, hashing every chunk through all
/// catalog digest algorithms on the way.
///
/// A declared `Content-Length` that disagrees with the byte count fails
/// [`FetchError::LengthMismatch`]. On any failure the partial temp file is
/// deleted and never reaches the destination.
pub async fn download_to(
    client: &dyn HttpClient,
    url: &str,
    destination: &Path,
    options: DownloadOptions<'_>,
) -> Result<Download> {
    let tmp_path = tmp_path_for(destination)?;
    let response = client.open(url, options.read_timeout).await?;
    let declared = response.content_length;

    let mut body = response.body;
    let mut hasher = MultiHasher::new();
    let mut received = 0u64;

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    let result: Result<()> = async {
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            if let Some(progress) = options.on_progress {
                progress(received, declared);
            }
        }
        file.flush().await?;
        Ok(())
    }
    .await;
    drop(file);

    if let Err(err) = result {
        discard(&tmp_path).await;
        return Err(err);
    }

    if let Some(declared) = declared {
        if declared != received {
            warn!(url, declared, received, "content length mismatch, discarding");
            discard(&tmp_path).await;
            return Err(FetchError::LengthMismatch {
                url: url.to_string(),
                declared,
                received,
            });
        }
    }

    debug!(url, bytes = received, tmp = %tmp_path.display(), "download complete");
    Ok(Download {
        tmp_path,
        digests: hasher.finalize(),
        bytes_received: received,
        final_url: response.final_url,
    })
}

/// `<name>.jpi` downloads stage as `<name>.jpi.tmp` in the same directory,
/// so the final rename stays on one filesystem.
fn tmp_path_for(destination: &Path) -> Result<PathBuf> {
    let name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FetchError::InvalidUrl(destination.display().to_string()))?;
    Ok(destination.with_file_name(format!("{name}.tmp")))
}

async fn discard(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), %err, "failed to remove partial download");
    }
}
