use thiserror::Error;

use crate::crypto::CryptoError;
use crate::db::DbError;

/// Failure taxonomy for the mailbox pipeline. Request handlers match on these
/// variants to pick a status; nothing below this level is allowed to panic a
/// request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("no mailbox credential stored for user")]
    CredentialMissing,

    #[error("stored mailbox credential is unusable")]
    CredentialInvalid,

    #[error("mail provider rejected the access token")]
    Unauthorized,

    #[error("message not found: {0}")]
    NotFound(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("scan failed: {0}")]
    ScanFailed(String),

    #[error("malformed provider payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<CryptoError> for PipelineError {
    fn from(_: CryptoError) -> Self {
        // Any failure to round-trip the stored blob means the credential is
        // unusable; the underlying cause is never surfaced to the client.
        Self::CredentialInvalid
    }
}

impl PipelineError {
    /// True for failures where retrying later could succeed without any
    /// operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable(_) | Self::UpstreamTimeout(_) | Self::ScanFailed(_)
        )
    }
}
