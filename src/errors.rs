use std::string::FromUtf8Error;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    // Errors from external libraries
    Io(std::io::Error),
    Json(serde_json::Error),
    FromUtf8(FromUtf8Error),
    UrlParse(url::ParseError),
    Http(reqwest::Error),
    Poison(String),

    // Errors from the interception engine
    /// A required transport entry point is missing. Interception does not
    /// partially activate.
    Activation(String),
    /// The mock decision source rejected or returned a malformed
    /// token-exchange response.
    Authorization(String),
    /// Transport-level failure reaching the mock decision source. Not retried.
    ServiceUnavailable(String),
    /// Raised by a user-supplied reply function. Propagates unchanged to the
    /// caller of the intercepted call.
    Callback(String),
    /// A reply descriptor carried a status code outside the HTTP status table.
    InvalidStatus(u16),
    Simple(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(ref err) => err.fmt(f),
            Error::Json(ref err) => err.fmt(f),
            Error::FromUtf8(ref err) => err.fmt(f),
            Error::UrlParse(ref err) => err.fmt(f),
            Error::Http(ref err) => err.fmt(f),
            Error::Poison(ref err) => write!(f, "{}", err),

            Error::Activation(message) => write!(f, "activation error: {message}"),
            Error::Authorization(message) => write!(f, "{message}"),
            Error::ServiceUnavailable(message) => write!(f, "mock decision service unavailable: {message}"),
            Error::Callback(message) => write!(f, "reply function error: {message}"),
            Error::InvalidStatus(status) => write!(f, "invalid HTTP status code: {status}"),

            Error::Simple(ref err) => write!(f, "error occurred: {err}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error::FromUtf8(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        Error::Http(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Error {
        Error::Poison(format!("Mutex poison error: {}", err))
    }
}
