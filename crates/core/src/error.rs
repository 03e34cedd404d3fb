use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

use layra_model::{BackendError, ErrorKind};

/// The error type for chat sessions.
#[derive(Debug)]
pub enum Error {
    /// A reply is still streaming, a new message can't be sent yet.
    Busy,
    /// The backend failed.
    Backend(Box<dyn BackendError>),
}

impl Error {
    /// Returns the kind of the backend error, if any.
    #[inline]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Busy => None,
            Error::Backend(err) => Some(err.kind()),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Busy => write!(f, "A reply is still being received"),
            Error::Backend(err) => write!(f, "{}: {err}", err.kind()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Busy => None,
            Error::Backend(err) => Some(err.as_ref()),
        }
    }
}

impl From<Box<dyn BackendError>> for Error {
    #[inline]
    fn from(err: Box<dyn BackendError>) -> Self {
        Error::Backend(err)
    }
}
