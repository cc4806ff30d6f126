use thiserror::Error;

/// Errors surfaced by the driver.
///
/// Local validation fails before any wire traffic is produced. Stream I/O
/// failures always surface as [`Error::ConnectionLost`]; protocol-level
/// corruption is logged by the dispatcher and then escalates to
/// `ConnectionLost` for every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The transport went down. The session is terminal.
    #[error("connection to the board lost")]
    ConnectionLost,

    /// The board firmware rejected our interface id, or the hardware is
    /// unknown to this library. The session is terminal.
    #[error("incompatible board: {0}")]
    Incompatible(String),

    /// A pin or module pool is exhausted. Nothing was allocated; the
    /// session remains usable.
    #[error("out of resources: {0}")]
    OutOfResource(String),

    /// Operation invoked in the wrong lifecycle state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A parameter fails a capability or range check.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// A blocked wait was cancelled via an interrupt handle.
    #[error("wait interrupted")]
    Interrupted,

    /// Unparseable data from the board. Reported once by the dispatcher,
    /// after which the session dies with `ConnectionLost`.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A TWI transaction was not acknowledged by the slave.
    #[error("transaction aborted by slave")]
    TransactionAborted,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::ConnectionLost => std::io::ErrorKind::BrokenPipe,
            Error::Interrupted => std::io::ErrorKind::Interrupted,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
