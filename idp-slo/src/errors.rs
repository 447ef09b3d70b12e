use std::{error::Error as StdError, fmt};

use backtrace::Backtrace;
use http::StatusCode;
use thiserror::Error;

pub trait ErrorCode: StdError + 'static {
    fn code(&self) -> (StatusCode, &'static str);
}

/// Failure taxonomy shared by every storage backend.
///
/// `NotFound`, `AlreadyExists` and `Conflict` are expected outcomes of
/// normal protocol traffic. `Any` is a provider internal error and wraps
/// whatever the backend driver reported, flattened to text so no driver
/// type crosses the storage boundary.
#[derive(Error, Debug)]
pub enum Code {
    #[error(transparent)]
    Any(#[from] anyhow::Error),
    #[error("Not found. {0}")]
    NotFound(String),
    #[error("Already exists. {0}")]
    AlreadyExists(String),
    #[error("Concurrent modification. {0}")]
    Conflict(String),
    #[error("Please recheck the request.see: {0}")]
    Validates(#[source] validator::ValidationErrors),
    #[error("Please recheck the request.see: {0}")]
    BadRequest(String),
}

impl ErrorCode for Code {
    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Any(_) => (StatusCode::INTERNAL_SERVER_ERROR, "1010001"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "1010002"),
            Self::Validates(_) => (StatusCode::UNPROCESSABLE_ENTITY, "1010004"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "1010006"),
            Self::AlreadyExists(_) => (StatusCode::CONFLICT, "1010007"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "1010008"),
        }
    }
}

pub struct WithBacktrace {
    source: Code,
    // only captured for internal errors, the other kinds are hot paths
    backtrace: Option<Backtrace>,
}

impl WithBacktrace {
    pub fn code(&self) -> &Code {
        &self.source
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.source, Code::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self.source, Code::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.source, Code::Conflict(_))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.source, Code::Any(_))
    }
}

impl fmt::Debug for WithBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("WithBacktrace");
        s.field("source", &self.source);
        if let Some(backtrace) = &self.backtrace {
            s.field("backtrace", backtrace);
        }
        s.finish()
    }
}

impl fmt::Display for WithBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl StdError for WithBacktrace {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

impl From<Code> for WithBacktrace {
    fn from(code: Code) -> Self {
        let backtrace = match code {
            Code::Any(_) => Some(Backtrace::new()),
            _ => None,
        };
        WithBacktrace {
            source: code,
            backtrace,
        }
    }
}

impl From<WithBacktrace> for Code {
    fn from(value: WithBacktrace) -> Self {
        value.source
    }
}

impl PartialEq for WithBacktrace {
    fn eq(&self, other: &Self) -> bool {
        let (_, src_code) = self.source.code();
        let (_, dst_code) = other.source.code();
        src_code == dst_code
    }
}

#[inline]
pub fn any<E: StdError>(err: E) -> WithBacktrace {
    Code::Any(anyhow::anyhow!("{}", err.to_string())).into()
}

#[inline]
pub fn anyhow(err: anyhow::Error) -> WithBacktrace {
    Code::Any(err).into()
}

#[inline]
pub fn not_found<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::NotFound(err.to_string()).into()
}

#[inline]
pub fn already_exists<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::AlreadyExists(err.to_string()).into()
}

#[inline]
pub fn conflict<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::Conflict(err.to_string()).into()
}

#[inline]
pub fn bad_request<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::BadRequest(err.to_string()).into()
}

#[inline]
pub fn validates(err: validator::ValidationErrors) -> WithBacktrace {
    Code::Validates(err).into()
}
