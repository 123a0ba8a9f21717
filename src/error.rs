use quick_xml::Error as XMLError;
use std::{str::Utf8Error, string::FromUtf8Error};

/// Wrapper around `std::Result`
pub type Result<T> = std::result::Result<T, Error>;

/// Error type returned by transform functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types
#[derive(Debug)]
pub enum Error {
    /// [`std::io`] related error.
    Io(std::io::Error),
    /// Decoding related error.
    /// Maybe the XML declaration has an encoding value that it doesn't recognize,
    /// or it doesn't match its actual encoding,
    CannotDecode,
    /// The input is empty, not well-formed, or references an undeclared entity.
    MalformedXML(String),
    /// The callback returned a rule key that is not recognized.
    UnexpectedRule { key: String, tag: String },
    /// A recognized rule key was used where it cannot apply,
    /// e.g. `insert-at-start` on an empty element.
    InvalidRule {
        key: String,
        tag: String,
        hint: String,
    },
    /// Error returned by a `transform-outer` or `transform-inner` function.
    /// The original error is available through [`std::error::Error::source`].
    Transform(BoxError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO Error: {}", err),
            Error::CannotDecode => write!(f, "Cannot decode XML"),
            Error::MalformedXML(err) => write!(f, "Malformed XML: {}", err),
            Error::UnexpectedRule { key, tag } => write!(
                f,
                "Unexpected key \"{}\" in rules returned by callback for <{}>",
                key, tag
            ),
            Error::InvalidRule { key, tag, hint } => {
                write!(f, "\"{}\" cannot be used for <{}>: {}", key, tag, hint)
            }
            Error::Transform(err) => write!(f, "Transform function failed: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Transform(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<XMLError> for Error {
    fn from(err: XMLError) -> Error {
        match err {
            XMLError::EndEventMismatch { expected, found } => Error::MalformedXML(format!(
                "Closing tag mismatch. Expected {}, found {}",
                expected, found,
            )),
            XMLError::Io(err) => Error::Io(err),
            XMLError::Utf8(_) => Error::CannotDecode,
            err => Error::MalformedXML(err.to_string()),
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_: FromUtf8Error) -> Error {
        Error::CannotDecode
    }
}
impl From<Utf8Error> for Error {
    fn from(_: Utf8Error) -> Error {
        Error::CannotDecode
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
