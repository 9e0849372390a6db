//! Error type shared by every stage of a recording run

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Fetching the remote config failed. The resolver recovers from this one.
    #[error("fetching remote config: {0}")]
    Fetch(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("capture stream closed after {got} of {expected} bytes")]
    StreamClosed { expected: usize, got: usize },
    #[error("malformed npy file {path:?}: {msg}")]
    Npy { path: PathBuf, msg: String },
    #[error("groundstation identity: {0}")]
    Identity(String),
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        Error::Fetch(e.to_string())
    }
}

#[cfg(feature = "rtlsdr")]
impl From<rtlsdr::RTLSDRError> for Error {
    fn from(e: rtlsdr::RTLSDRError) -> Self {
        Error::Device(format!("RTL SDR error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Combine the result of some work with the cleanup that followed it.
///
/// An error from the work wins. A cleanup error is only returned when the work
/// itself succeeded, otherwise it is logged.
pub fn and_cleanup<T>(res: Result<T>, cleanup: Result<()>) -> Result<T> {
    match (res, cleanup) {
        (Ok(v), Ok(())) => Ok(v),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            warn!("Cleanup after failure also failed: {cleanup}");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(msg: &str) -> Result<()> {
        Err(Error::Device(msg.to_owned()))
    }

    #[test]
    fn work_error_is_not_hidden_by_cleanup() {
        let res: Result<u8> = Err(Error::StreamClosed {
            expected: 8,
            got: 2,
        });
        assert!(matches!(
            and_cleanup(res, closed("close failed")),
            Err(Error::StreamClosed { expected: 8, got: 2 })
        ));
    }

    #[test]
    fn cleanup_error_after_success() {
        match and_cleanup(Ok(3u8), closed("close failed")) {
            Err(Error::Device(msg)) => assert_eq!(msg, "close failed"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(and_cleanup(Ok(3u8), Ok(())).unwrap(), 3);
    }
}
