//! HTTP retrieval for update sites.
//!
//! - `client` - proxy-aware HTTP abstraction with a reqwest implementation
//! - `envelope` - strips the two historical catalog envelopes (JSONP and
//!   postMessage HTML) down to raw JSON
//! - `download` - single-pass streaming download: bytes go to a temp file
//!   while every catalog digest algorithm hashes them
//!
//! The crate is mechanism-only: retry orchestration, checksum policy and
//! file placement belong to the caller.

mod client;
mod download;
mod envelope;
mod error;

pub use client::{BoxStream, HttpClient, HttpResponse, ReqwestClient, TextResponse};
pub use download::{Download, DownloadOptions, download_to};
pub use envelope::{extract_jsonp, extract_post_message};
pub use error::{FetchError, Result};
