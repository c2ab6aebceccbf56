use std::path::PathBuf;

use reqwest::StatusCode;

use crate::media::ItemKind;

/// Failure while moving bytes: HTTP, local I/O, the accelerator process or the
/// extraction collaborator.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("I/O error while {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("range {start}-{end} of {url} incomplete: received {received} bytes")]
    IncompleteRange {
        url: String,
        start: u64,
        end: u64,
        received: u64,
    },

    #[error("server ignored range request for {url}")]
    RangeIgnored { url: String },

    #[error("`{program}` failed: {reason}")]
    Accelerator { program: String, reason: String },

    #[error("extraction failed: {reason}")]
    Extraction { reason: String },
}

impl TransportError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn extraction(reason: impl Into<String>) -> Self {
        Self::Extraction {
            reason: reason.into(),
        }
    }
}

/// Closed set of page failures. Callers decide what to do by matching on the
/// variant, see [`PageError::is_retryable`] and [`PageError::is_fatal`].
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// A forced item has no candidate. The page is skipped.
    #[error("no {kind} satisfies the forced requirement")]
    MissingTrack { kind: ItemKind },

    /// Extraction produced neither tracks nor clips. The page is skipped.
    #[error("extraction returned no usable tracks or clips")]
    ParseFailure { payload: String },

    /// Retried inside the page envelope, escalates once the bound is hit.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The muxer or the fragment concatenation failed. Artifacts stay on disk.
    #[error("mux failed: {diagnostic}")]
    MuxFailure { diagnostic: String },

    /// Aborts the whole run.
    #[error("{reason}")]
    Fatal {
        reason: String,
        #[source]
        source: Option<Box<PageError>>,
    },
}

impl PageError {
    pub fn missing(kind: ItemKind) -> Self {
        Self::MissingTrack { kind }
    }

    pub fn mux_failure(diagnostic: impl Into<String>) -> Self {
        Self::MuxFailure {
            diagnostic: diagnostic.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
            source: None,
        }
    }

    /// Wrap an error that survived every attempt of the retry envelope.
    pub fn exhausted(attempts: u32, source: PageError) -> Self {
        Self::Fatal {
            reason: format!("giving up after {attempts} attempts: {source}"),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let transport = PageError::from(TransportError::extraction("boom"));
        assert!(transport.is_retryable());
        assert!(!transport.is_fatal());

        let missing = PageError::missing(ItemKind::Subtitle);
        assert!(!missing.is_retryable());
        assert_eq!(
            missing.to_string(),
            "no subtitle satisfies the forced requirement"
        );

        let mux = PageError::mux_failure("exit code 1");
        assert!(!mux.is_retryable());

        let fatal = PageError::exhausted(3, transport);
        assert!(fatal.is_fatal());
        assert!(!fatal.is_retryable());
        assert!(fatal.to_string().contains("3 attempts"));
        assert!(std::error::Error::source(&fatal).is_some());
    }
}
