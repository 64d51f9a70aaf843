use thiserror::Error;

/// Failures of a single lyric provider request. The cascade logs and swallows these.
#[derive(Error, Debug)]
pub enum LyricsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response status: {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}
