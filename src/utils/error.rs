use std::io::Error as IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    #[error("Out of memory: {0}")]
    NoMem(String),

    #[error("Wrong state: {0}")]
    WrongState(String),

    #[error("Connect failed: {0}")]
    ConnectFail(String),

    #[error("Read data failed: {0}")]
    ReadData(String),

    #[error("Write data failed: {0}")]
    WriteData(String),

    #[error("Bad data: {0}")]
    BadData(String),

    #[error("Reset: {0}")]
    Reset(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Error::InvalidArg(msg.into())
    }

    /// Create an allocation error
    pub fn no_mem(msg: impl Into<String>) -> Self {
        Error::NoMem(msg.into())
    }

    /// Create a wrong state error
    pub fn wrong_state(msg: impl Into<String>) -> Self {
        Error::WrongState(msg.into())
    }

    /// Create a connect failure
    pub fn connect_fail(msg: impl Into<String>) -> Self {
        Error::ConnectFail(msg.into())
    }

    /// Create a read failure
    pub fn read_data(msg: impl Into<String>) -> Self {
        Error::ReadData(msg.into())
    }

    /// Create a write failure
    pub fn write_data(msg: impl Into<String>) -> Self {
        Error::WriteData(msg.into())
    }

    /// Create a malformed data error
    pub fn bad_data(msg: impl Into<String>) -> Self {
        Error::BadData(msg.into())
    }

    /// Create a reset error
    pub fn reset(msg: impl Into<String>) -> Self {
        Error::Reset(msg.into())
    }

    /// Create a not supported error
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Error::NotSupported(msg.into())
    }

    /// True for errors reported when the peer or a local close ended the session
    pub fn is_closed(&self) -> bool {
        match self {
            Error::Reset(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
