use super::http::FetchError;
use super::id::CubeIdError;
use super::models::ErrorEnvelope;

/// Failure of a cube query that could not produce a definite answer.
#[derive(Debug, thiserror::Error)]
pub enum CubeError {
    #[error(transparent)]
    InvalidId(#[from] CubeIdError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("xueqiu refused the request ({0})")]
    Remote(ErrorEnvelope),

    #[error("Unexpected {endpoint} response: {detail}")]
    UnexpectedShape {
        endpoint: &'static str,
        detail: String,
    },

    #[error("Cube has no valuation history")]
    NoValuationData,

    #[error("Gave up after {attempts} attempts; last response: {last}")]
    RetriesExhausted { attempts: u32, last: ErrorEnvelope },

    #[error("Stopped on request")]
    Cancelled,
}

impl CubeError {
    /// True for failures a later cycle may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CubeError::Fetch(FetchError::Transport { .. })
                | CubeError::Remote(_)
                | CubeError::RetriesExhausted { .. }
        )
    }
}
