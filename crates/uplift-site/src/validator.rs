//! Signature-validation seam.
//!
//! The cryptography itself lives with the embedder; a site only needs a
//! verdict on the catalog document it just fetched.

/// Verdict from a signature validator.
#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    pub ok: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl VerificationResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            warnings: Vec::new(),
            errors: vec![error.into()],
        }
    }
}

/// Validator bound to an update site.
pub trait SignatureValidator: Send + Sync {
    fn verify(&self, document: &serde_json::Value) -> VerificationResult;
}

/// Accepts every document. Used when signature checking is disabled and in
/// tests.
pub struct AcceptAll;

impl SignatureValidator for AcceptAll {
    fn verify(&self, _document: &serde_json::Value) -> VerificationResult {
        VerificationResult::ok()
    }
}
