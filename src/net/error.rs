//! Fetch errors. Wraps reqwest's error type (and the safety gate's) so callers
//! can match exhaustively on a small set of kinds.

use std::error::Error as StdError;
use std::fmt;

use super::safety::SafetyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The safety gate refused the URL or one of its redirect targets
    Blocked,
    /// None of the address families resolved
    DnsFailed,
    /// The URL (or a redirect location) could not be used
    InvalidUrl,
    ConnectFailed,
    TimedOut,
    /// The body crossed the configured ceiling
    TooLarge,
    TooManyRedirects,
    DecodingFailed,
    UnknownReqwestError,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_decode() || err.is_body() {
            ErrorKind::DecodingFailed
        } else if err.is_timeout() {
            ErrorKind::TimedOut
        } else if err.is_redirect() {
            ErrorKind::TooManyRedirects
        } else if err.is_connect() {
            ErrorKind::ConnectFailed
        } else if err.is_builder() {
            ErrorKind::InvalidUrl
        } else {
            ErrorKind::UnknownReqwestError
        };

        Error::from_source(kind, Box::new(err))
    }
}

impl From<SafetyError> for Error {
    fn from(err: SafetyError) -> Self {
        let kind = match &err {
            SafetyError::Malformed(_)
            | SafetyError::MissingHost
            | SafetyError::UnsupportedScheme(_) => ErrorKind::InvalidUrl,
            SafetyError::NoDnsRecords(_) => ErrorKind::DnsFailed,
            SafetyError::InsecureScheme
            | SafetyError::EmbeddedCredentials
            | SafetyError::ControlCharacters
            | SafetyError::Blocked { .. } => ErrorKind::Blocked,
        };

        Error::from_source(kind, Box::new(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::from_source(ErrorKind::InvalidUrl, Box::new(err))
    }
}

impl Error {
    pub fn from_kind(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }

    pub fn from_source(kind: ErrorKind, source: Box<dyn StdError + Send + Sync>) -> Error {
        Error {
            kind,
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn message(&self) -> &'static str {
        match self.kind {
            ErrorKind::Blocked => "blocked by the network safety policy",
            ErrorKind::DnsFailed => "dns resolution failed",
            ErrorKind::InvalidUrl => "invalid url",
            ErrorKind::ConnectFailed => "connection failed",
            ErrorKind::TimedOut => "timed out",
            ErrorKind::TooLarge => "response exceeded the size limit",
            ErrorKind::TooManyRedirects => "too many redirects",
            ErrorKind::DecodingFailed => "decoding failed",
            ErrorKind::UnknownReqwestError => "unknown request error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message(), source),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| &**e as _)
    }
}
