use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

use crate::http::request::ParseError;

/// Fatal/init-time error: wraps anything `Error`-shaped with a colored
/// one-line `Display`. Returned from `main`, never from inside a connection.
pub struct CleanError(pub Box<dyn Error>);

impl Debug for CleanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\r\x1b[K{}", self)
    }
}

impl Display for CleanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[31mERROR\x1b[0m: {}", self.0)
    }
}

impl Error for CleanError {}

#[derive(Debug)]
struct StringError(String);

impl Display for StringError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for StringError {}

impl From<crate::config::ConfigError> for CleanError {
    fn from(e: crate::config::ConfigError) -> Self {
        CleanError(Box::new(StringError(e.to_string())))
    }
}

impl From<std::io::Error> for CleanError {
    fn from(e: std::io::Error) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<std::net::AddrParseError> for CleanError {
    fn from(e: std::net::AddrParseError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<String> for CleanError {
    fn from(s: String) -> Self {
        CleanError(Box::new(StringError(s)))
    }
}

impl From<&str> for CleanError {
    fn from(s: &str) -> Self {
        CleanError(Box::new(StringError(s.to_string())))
    }
}

pub type Result<T> = std::result::Result<T, CleanError>;

/// Per-connection error taxonomy. Never propagated past the connection
/// boundary with `?` — callers match on it and fold it into a response or a
/// `terminate_connection` call instead of bailing out of the main loop.
#[derive(Debug)]
pub enum CoreError {
    Protocol(ParseError),
    ResourceLimit { code: u16 },
    Io(std::io::Error),
    Child(std::io::Error),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Protocol(e) => write!(f, "protocol error: {:?}", e),
            CoreError::ResourceLimit { code } => write!(f, "resource limit, status {code}"),
            CoreError::Io(e) => write!(f, "io error: {e}"),
            CoreError::Child(e) => write!(f, "child process error: {e}"),
        }
    }
}

impl Error for CoreError {}

impl From<ParseError> for CoreError {
    fn from(e: ParseError) -> Self {
        CoreError::Protocol(e)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e)
    }
}
