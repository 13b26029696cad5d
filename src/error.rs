//! Error types
//!
//! Every operation in this crate returns a [`Result`]. An [`Error`] carries a
//! kind, a human-readable message, the name of the block that produced it
//! (`"core"` unless a component reported it) and a trace of the source
//! locations it crossed on the way back to the caller.

use std::fmt;
use std::panic::Location;

/// Block name used for failures raised inside this crate
pub const CORE_BLOCK: &str = "core";

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input
    InvalidArgument,
    /// API misuse given the current state
    InvalidOperation,
    /// Capacity or contention (dropped frames, property held elsewhere)
    Busy,
    /// Unknown frame, key or resource
    NotFound,
    /// Lock wait expired
    Timeout,
    /// Call raced a closing transition
    Aborted,
    /// Duplicate registration
    AlreadyExists,
    /// Failure reported by a collaborator that fits no other kind
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::Busy => "busy",
            ErrorKind::NotFound => "not found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Aborted => "aborted",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Failure status returned by every fallible operation
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{block}] {kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    block: String,
    trace: Vec<&'static Location<'static>>,
}

impl Error {
    /// Create an error raised in the core block
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            block: CORE_BLOCK.to_string(),
            trace: vec![Location::caller()],
        }
    }

    #[track_caller]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    #[track_caller]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperation, message)
    }

    #[track_caller]
    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Busy, message)
    }

    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[track_caller]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    #[track_caller]
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Aborted, message)
    }

    #[track_caller]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    /// Kind of this failure
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name of the block that raised the failure
    pub fn block(&self) -> &str {
        &self.block
    }

    /// Source locations this error passed through, origin first
    pub fn trace_points(&self) -> &[&'static Location<'static>] {
        &self.trace
    }

    /// Attribute the failure to a named block (usually a component instance)
    pub fn with_block(mut self, block: impl Into<String>) -> Self {
        self.block = block.into();
        self
    }

    /// Record the caller's location in the trace chain
    #[track_caller]
    pub fn trace(mut self) -> Self {
        self.trace.push(Location::caller());
        self
    }
}

/// Attach the caller's location to the error of a failed result
pub trait ResultExt<T> {
    /// Append a trace point if this is an error
    fn traced(self) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    #[track_caller]
    fn traced(self) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(e.trace()),
        }
    }
}
