use std::fmt::Display;

use miette::{miette, Diagnostic};
use thiserror::Error;

/// The failure categories a request can end in.
///
/// Every variant is a known, expected outcome of handling an untrusted URL.
/// Unexpected states (file system errors, missing programs) are not listed
/// here and travel as [`Error::Miette`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Diagnostic)]
pub enum ErrorKind {
    #[error("Invalid YouTube URL format")]
    #[diagnostic(code(splicetube::invalid_url))]
    InvalidUrl,

    #[error("Video is unavailable")]
    #[diagnostic(code(splicetube::unavailable))]
    Unavailable,

    #[error("Video exceeds the maximum allowed length")]
    #[diagnostic(code(splicetube::too_long))]
    TooLong,

    #[error("Could not access video URL")]
    #[diagnostic(code(splicetube::http_error))]
    HttpError,

    #[error("YouTube rate limit exceeded")]
    #[diagnostic(code(splicetube::rate_limit))]
    RateLimit,

    #[error("Proxy connection failed")]
    #[diagnostic(code(splicetube::proxy_error))]
    ProxyError,

    #[error("Video processing error")]
    #[diagnostic(code(splicetube::processing_error))]
    ProcessingError,
}

impl ErrorKind {
    /// Short stable identifier, used in machine readable output.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidUrl => "InvalidUrl",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::TooLong => "TooLong",
            ErrorKind::HttpError => "HttpError",
            ErrorKind::RateLimit => "RateLimit",
            ErrorKind::ProxyError => "ProxyError",
            ErrorKind::ProcessingError => "ProcessingError",
        }
    }

    /// HTTP status an outer request layer should answer with.
    ///
    /// Kinds caused by the submitted URL are 4xx, kinds caused by upstream
    /// services are 502 and an encoder fault is a plain 500.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidUrl | ErrorKind::Unavailable | ErrorKind::TooLong => 400,
            ErrorKind::RateLimit => 429,
            ErrorKind::HttpError | ErrorKind::ProxyError => 502,
            ErrorKind::ProcessingError => 500,
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// A classified, expected failure.
    Kind(ErrorKind),

    /// Anything else. These are not supposed to happen during normal operation.
    Miette(miette::Report),
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::Kind(kind)
    }
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Miette(miette!(err))
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::Kind(kind) => miette::Report::new(kind),
            Error::Miette(err) => err,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Kind(kind) => write!(f, "{kind}"),
            Error::Miette(report) => write!(f, "{report}"),
        }
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }

    /// The classified kind, if this is not an unexpected failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Kind(kind) => Some(*kind),
            Error::Miette(_) => None,
        }
    }

    /// HTTP status an outer request layer should answer with.
    pub fn status_code(&self) -> u16 {
        self.kind().map_or(500, ErrorKind::status_code)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_caused_kinds_are_4xx() {
        for kind in [
            ErrorKind::InvalidUrl,
            ErrorKind::Unavailable,
            ErrorKind::TooLong,
            ErrorKind::RateLimit,
        ] {
            assert!((400..500).contains(&kind.status_code()), "{kind:?}");
        }
    }

    #[test]
    fn unexpected_errors_are_500() {
        let err = Error::from(miette!("disk full"));
        assert_eq!(err.kind(), None);
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn wrapping_keeps_classified_kinds() {
        let err = Error::from(ErrorKind::RateLimit).wrap_err_with(|| "while downloading");
        assert_eq!(err.kind(), Some(ErrorKind::RateLimit));
        assert_eq!(err.to_string(), "YouTube rate limit exceeded");
    }

    #[test]
    fn reports_can_be_wrapped_with_context() {
        let report =
            miette::Report::from(Error::from(ErrorKind::ProxyError)).wrap_err("No usable proxy");
        assert_eq!(report.to_string(), "No usable proxy");
        assert_eq!(
            report.chain().nth(1).map(ToString::to_string).as_deref(),
            Some("Proxy connection failed")
        );

        let report =
            miette::Report::from(Error::from(miette!("disk full"))).wrap_err("No usable proxy");
        assert!(report.chain().any(|cause| cause.to_string() == "disk full"));
    }
}
