use std::fmt;

/// Failure reported by a peripheral link or by the controller queue.
///
/// Transport errors never reach the presentation layer as such: the state machine logs them and
/// turns them into state transitions. The kind is kept for logging and for tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    description: String,
}

impl Error {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    pub(in crate) fn closed() -> Self {
        Self::new(ErrorKind::Closed, "controller event loop has stopped")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl std::error::Error for Error {}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Scanning couldn't be started.
    Scan,

    /// The connection couldn't be established or was lost.
    Connect,

    /// The relay service or characteristic wasn't found on the peripheral.
    Discovery,

    /// Reading the characteristic value failed.
    Read,

    /// The peripheral didn't acknowledge a write.
    Write,

    /// The RSSI query failed.
    SignalStrength,

    /// The Bluetooth adapter isn't powered on or isn't usable.
    Adapter,

    /// The controller event loop has stopped and no longer accepts events.
    Closed,

    /// Error from an unknown source.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Scan => "scan failed",
            Self::Connect => "connection failed",
            Self::Discovery => "discovery failed",
            Self::Read => "read failed",
            Self::Write => "write failed",
            Self::SignalStrength => "RSSI query failed",
            Self::Adapter => "adapter unavailable",
            Self::Closed => "closed",
            Self::Other => "error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_includes_kind_and_description() {
        let e = Error::new(ErrorKind::Write, "ATT error 3");
        assert_eq!(e.to_string(), "write failed: ATT error 3");
        assert_eq!(e.kind(), ErrorKind::Write);
        assert_eq!(Error::closed().kind(), ErrorKind::Closed);
    }
}
