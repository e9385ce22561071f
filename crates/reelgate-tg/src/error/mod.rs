mod ext;
mod macros;

use crate::prelude::*;
use crate::util::DynError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing_error::SpanTrace;

pub(crate) use ext::*;
pub(crate) use macros::*;

pub(crate) mod prelude {
    pub(crate) use super::ext::OptionExt as _;
}

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Describes any possible error that may happen in the application lifetime.
#[derive(Clone)]
pub struct Error {
    imp: Arc<ErrorImp>,
}

struct ErrorImp {
    /// Small identifier used for debugging purposes.
    /// It is mentioned in the chat when the error happens.
    /// This way we as developers can copy it and lookup the logs using this id.
    id: String,
    kind: ErrorKind,

    // Participates only in debug impl
    spantrace: SpanTrace,
}

#[derive(Error, Debug)]
pub(crate) enum ErrorKind {
    #[error(transparent)]
    User {
        #[from]
        source: UserError,
    },

    #[error(transparent)]
    Access {
        #[from]
        source: crate::access::AccessError,
    },

    #[error(transparent)]
    Provider {
        #[from]
        source: crate::provider::FetchError,
    },

    #[error(transparent)]
    Tg {
        #[from]
        source: teloxide::RequestError,
    },

    #[error(transparent)]
    HttpClient {
        #[from]
        source: crate::http::HttpClientError,
    },

    #[error(transparent)]
    Config {
        #[from]
        source: crate::config::ConfigError,
    },

    #[error(transparent)]
    Store {
        #[from]
        source: crate::store::StoreError,
    },

    #[error(transparent)]
    Io {
        #[from]
        source: IoError,
    },

    /// Unrecoverable kind of error, that is not supposed to happen, but when
    /// it happens we can't do anything reasonable about it, so no structural
    /// error handling is possible, this error is just propagated to the top.
    #[error("FATAL: {message}")]
    Fatal {
        message: String,
        source: Option<Box<DynError>>,
    },
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io { source: err.into() }
    }
}

/// Errors caused by interaction with the user.
/// The user can fix them by sending a different input.
#[derive(Debug, Error)]
pub(crate) enum UserError {
    #[error("Please send a valid Instagram link.")]
    NotAContentLink,

    #[error("The broadcast message must not be empty")]
    EmptyBroadcastText,

    #[error("A broadcast is already in progress, wait until it finishes")]
    BroadcastInProgress,

    #[error("There is no broadcast to cancel")]
    NothingToCancel,
}

#[derive(Debug, Error)]
pub(crate) enum IoError {
    #[error("Failed to create a working directory")]
    CreateWorkingArea { source: std::io::Error },

    #[error(transparent)]
    Other {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn id(&self) -> &str {
        &self.imp.id
    }

    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.imp.kind
    }

    /// Validation and access errors. These are expected and shown to the
    /// user as is, without the error id.
    pub(crate) fn is_user_error(&self) -> bool {
        match &self.imp.kind {
            ErrorKind::User { .. } | ErrorKind::Access { .. } => true,
            ErrorKind::Provider { .. }
            | ErrorKind::Tg { .. }
            | ErrorKind::HttpClient { .. }
            | ErrorKind::Config { .. }
            | ErrorKind::Store { .. }
            | ErrorKind::Io { .. }
            | ErrorKind::Fatal { .. } => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error (id: {}): {}", self.imp.id, self.imp.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.imp.kind)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)?;
        fmt::Display::fmt(&self.imp.spantrace, f)
    }
}

impl<T: Into<ErrorKind>> From<T> for Error {
    #[track_caller]
    fn from(kind: T) -> Self {
        let imp = ErrorImp {
            kind: kind.into(),
            id: nanoid::nanoid!(6),
            spantrace: SpanTrace::capture(),
        };

        let err = Self { imp: Arc::new(imp) };

        trace!(err = tracing_err(&err), "Created an error");

        err
    }
}
