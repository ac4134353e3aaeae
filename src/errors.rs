use std::{fmt, io, str::Utf8Error};

use quick_xml::events::attributes::AttrError;

/// Crate-wide error type. The first two variants carry the pipeline's own
/// failure modes; the rest wrap errors from the underlying readers and the
/// database.
#[derive(Debug)]
pub enum Error {
    /// The source document could not be parsed. Fatal; halts the stream.
    MalformedSource(String),
    /// A required attribute was absent on an element or one of its children.
    MissingField { element: String, field: String },
    Io(String),
    Csv(String),
    Sql(String),
    Message(String),
}

impl Error {
    pub fn missing_field(element: &str, field: &str) -> Error {
        Error::MissingField {
            element: element.to_string(),
            field: field.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedSource(message) => write!(f, "malformed source: {}", message),
            Error::MissingField { element, field } => {
                write!(f, "missing field '{}' on element '{}'", field, element)
            }
            Error::Io(message) => write!(f, "io error: {}", message),
            Error::Csv(message) => write!(f, "csv error: {}", message),
            Error::Sql(message) => write!(f, "sql error: {}", message),
            Error::Message(message) => write!(f, "{}", message),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        Error::MalformedSource(value.to_string())
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        Error::MalformedSource(value.to_string())
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::MalformedSource(value.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(value: csv::Error) -> Self {
        Error::Csv(value.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Error::Sql(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Message(value.to_string())
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Message(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Message(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
