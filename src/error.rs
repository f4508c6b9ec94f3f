//! Error kinds shared across the session, pool, and SAN/PGN front-end.

use thiserror::Error;

/// Failure surfaced by any public operation in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The handshake never completed: the transport broke, the engine exited, or it was
    /// cancelled before `uciok` arrived.
    #[error("engine initialization failed: {0}")]
    InitFailure(String),

    /// The session or pool has been disposed; it is absorbing from this point on.
    #[error("session is terminated")]
    Terminated,

    /// A caller-supplied value violated a precondition (empty FEN, empty SAN token, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No piece of the declared kind could geometrically reach the requested square.
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// The engine emitted a `bestmove` line that could not be parsed.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// `bestmove` arrived but no `info` lines carrying a score were observed.
    #[error("no evaluation available")]
    NoEvaluation,

    /// Pool checkout referenced a name with no registered factory.
    #[error("no such engine: {0}")]
    NoSuchEngine(String),

    /// A cancellation signal fired while the operation was suspended.
    #[error("operation cancelled")]
    Cancelled,

    /// Transport-level I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
