//! Error types and result definitions for metadata operations.
//!
//! [`MetadataError`] carries a classified [`ErrorKind`], a static description, optional dynamic
//! detail, the originating error and the callsite. Errors from many independent listings can be
//! aggregated into a single value when a whole fan-out fails.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the crate.
///
/// Cloning is cheap: sources and backtraces are reference counted, which lets the same failure
/// be logged by the loader and still handed to the caller.
#[derive(Debug, Clone)]
pub struct MetadataError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Failures of several independent sub-requests, e.g. every dataset of a fan-out.
    Many {
        errors: Vec<MetadataError>,
        location: &'static Location<'static>,
    },
}

/// Classification of metadata failures.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Remote listing errors
    RemoteListingFailed,
    RemoteIoError,
    AuthenticationError,
    PermissionDenied,
    NotFound,
    RateLimited,

    // Fan-out errors
    Timeout,
    TaskPanicked,
    AllSubRequestsFailed,

    // Lifecycle errors
    ConnectionClosed,

    // Configuration & data errors
    ConfigError,
    InvalidData,
    SerializationError,
    DeserializationError,
    IoError,

    Unknown,
}

impl MetadataError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregated errors report [`ErrorKind::AllSubRequestsFailed`].
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { .. } => ErrorKind::AllSubRequestsFailed,
        }
    }

    /// Returns the kinds of every contained error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the aggregated errors, or an empty slice for a single error.
    pub fn errors(&self) -> &[MetadataError] {
        match self.repr {
            ErrorRepr::Single(_) => &[],
            ErrorRepr::Many { ref errors, .. } => errors,
        }
    }

    /// Returns the dynamic detail, or the first detail among aggregated errors.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace of a single error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite the error was created at.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error. Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Aggregates the failures of a fan-out whose sub-requests all failed.
    ///
    /// Unlike the `From<Vec<_>>` conversion, the aggregate is kept even for a single failure so
    /// that callers can always match on [`ErrorKind::AllSubRequestsFailed`].
    #[track_caller]
    pub fn all_failed(errors: Vec<MetadataError>) -> Self {
        MetadataError {
            repr: ErrorRepr::Many {
                errors,
                location: Location::caller(),
            },
        }
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        MetadataError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for MetadataError {
    fn eq(&self, other: &MetadataError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                write!(
                    f,
                    "[{:?}] {} @ {}:{}",
                    payload.kind,
                    payload.description,
                    payload.location.file(),
                    payload.location.line(),
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail:", detail)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for MetadataError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, header: &str, text: &str) -> fmt::Result {
    if text.trim().is_empty() {
        return write!(f, "\n  {header} <empty>");
    }

    write!(f, "\n  {header}")?;
    for line in text.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for MetadataError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> MetadataError {
        MetadataError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for MetadataError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> MetadataError {
        MetadataError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A vector holding exactly one error yields that error unchanged.
impl<E> From<Vec<E>> for MetadataError
where
    E: Into<MetadataError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> MetadataError {
        let location = Location::caller();
        let mut errors: Vec<MetadataError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        MetadataError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for MetadataError {
    #[track_caller]
    fn from(err: std::io::Error) -> MetadataError {
        let detail = err.to_string();
        MetadataError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for MetadataError {
    #[track_caller]
    fn from(err: serde_json::Error) -> MetadataError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        MetadataError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<bqmeta_config::shared::ValidationError> for MetadataError {
    #[track_caller]
    fn from(err: bqmeta_config::shared::ValidationError) -> MetadataError {
        let detail = err.to_string();
        MetadataError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid metadata configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Classifies BigQuery client errors.
///
/// HTTP response errors are classified by status code so that missing datasets and
/// permission problems can be told apart from transient failures.
#[cfg(feature = "bigquery")]
impl From<gcp_bigquery_client::error::BQError> for MetadataError {
    #[track_caller]
    fn from(err: gcp_bigquery_client::error::BQError) -> MetadataError {
        use gcp_bigquery_client::error::BQError;

        let (kind, description) = match &err {
            BQError::InvalidServiceAccountKey(_) => (
                ErrorKind::AuthenticationError,
                "Invalid BigQuery service account key",
            ),
            BQError::InvalidServiceAccountAuthenticator(_) => (
                ErrorKind::AuthenticationError,
                "Invalid BigQuery service account authenticator",
            ),
            BQError::InvalidApplicationDefaultCredentialsAuthenticator(_) => (
                ErrorKind::AuthenticationError,
                "Invalid BigQuery application default credentials",
            ),
            BQError::AuthError(_) | BQError::YupAuthError(_) => (
                ErrorKind::AuthenticationError,
                "BigQuery authentication error",
            ),
            BQError::RequestError(_) => (ErrorKind::RemoteIoError, "BigQuery request failed"),
            BQError::ResponseError { error } => match error.error.code {
                401 => (
                    ErrorKind::AuthenticationError,
                    "BigQuery rejected the credentials",
                ),
                403 => (ErrorKind::PermissionDenied, "BigQuery permission denied"),
                404 => (ErrorKind::NotFound, "BigQuery entity not found"),
                429 => (ErrorKind::RateLimited, "BigQuery rate limit exceeded"),
                _ => (ErrorKind::RemoteListingFailed, "BigQuery response error"),
            },
            BQError::SerializationError(_) => (
                ErrorKind::DeserializationError,
                "BigQuery JSON serialization error",
            ),
            _ => (ErrorKind::RemoteListingFailed, "BigQuery client error"),
        };

        let detail = err.to_string();
        MetadataError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
