//! The error type shared by every `bbtrace` crate.

use std::{
    env::VarError,
    fmt::{self, Display},
    io,
    path::Path,
};

/// Main error struct for `bbtrace`
#[derive(Debug)]
pub enum Error {
    /// Serialization error
    Serialize(String),
    /// File related error, with the path the operation was performed on
    File(io::Error, String),
    /// You're holding it wrong
    IllegalState(String),
    /// The argument passed to this method or function is not valid
    IllegalArgument(String),
    /// The performed action is not supported on the current platform
    Unsupported(String),
}

impl Error {
    /// Serialization error
    #[must_use]
    pub fn serialize<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::Serialize(arg.into())
    }
    /// File related error
    #[must_use]
    pub fn file(arg: io::Error) -> Self {
        Error::File(arg, String::new())
    }
    /// File related error on a known path
    #[must_use]
    pub fn file_at<P>(arg: io::Error, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        Error::File(arg, path.as_ref().display().to_string())
    }
    /// You're holding it wrong
    #[must_use]
    pub fn illegal_state<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::IllegalState(arg.into())
    }
    /// The argument passed to this method or function is not valid
    #[must_use]
    pub fn illegal_argument<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::IllegalArgument(arg.into())
    }
    /// This operation is not supported on the current architecture or platform
    #[must_use]
    pub fn unsupported<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::Unsupported(arg.into())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Serialize(s) => write!(f, "Error in Serialization: `{0}`", &s),
            Self::File(err, path) if path.is_empty() => write!(f, "File IO failed: {err}"),
            Self::File(err, path) => write!(f, "File IO failed on `{path}`: {err}"),
            Self::IllegalState(s) => write!(f, "Illegal state: {0}", &s),
            Self::IllegalArgument(s) => write!(f, "Illegal argument: {0}", &s),
            Self::Unsupported(s) => write!(
                f,
                "The operation is not supported on the current platform: {0}",
                &s
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::File(err, _) => Some(err),
            _ => None,
        }
    }
}

/// Stringify the json serializer error
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialize(format!("{err:?}"))
    }
}

/// Create a `bbtrace` Error from io Error
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::file(err)
    }
}

impl From<VarError> for Error {
    fn from(err: VarError) -> Self {
        Self::illegal_argument(format!("Could not read environment variable: {err}"))
    }
}

impl From<clap::Error> for Error {
    fn from(err: clap::Error) -> Self {
        Self::illegal_argument(err.render().to_string())
    }
}
