use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Io,
    Eof,
    Protocol,
    Data,
    Internal,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Io => "io",
            ErrorKind::Eof => "eof",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Data => "data",
            ErrorKind::Internal => "internal",
        }
    }
}

pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn protocol<S: fmt::Display>(message: S) -> Self {
        Self {
            kind: ErrorKind::Protocol,
            message: message.to_string(),
        }
    }

    pub fn data<S: fmt::Display>(message: S) -> Self {
        Self {
            kind: ErrorKind::Data,
            message: message.to_string(),
        }
    }

    pub fn internal<S: fmt::Display>(message: S) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.to_string(),
        }
    }

    pub fn eof() -> Self {
        Self {
            kind: ErrorKind::Eof,
            message: "unexpected end of stream".to_owned(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {{ kind: {:?}, message: {:?} }}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Error::eof();
        }
        Self {
            kind: ErrorKind::Io,
            message: e.to_string(),
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(e: std::str::Utf8Error) -> Self {
        Error::protocol(e)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Error::protocol(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::data(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
