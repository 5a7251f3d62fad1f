use std::fmt;

/// Status codes returned over the wire and from every backend operation.
///
/// Bit-stable and negative, per the BAKE wire protocol (`Success` is the
/// only non-negative value and is never constructed as a [`BakeError`] —
/// callers represent it by returning `Ok(())`/`Ok(value)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Allocation = -1,
    InvalidArg = -2,
    Mercury = -3,
    Argobots = -4,
    Pmem = -5,
    UnknownTarget = -6,
    UnknownProvider = -7,
    UnknownRegion = -8,
    OutOfBounds = -9,
    Remi = -10,
    OpUnsupported = -11,
    Forbidden = -12,
    BackendType = -13,
    Io = -14,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// The inverse of `as_i32`, used by the client-side RPC wrapper to
    /// recover a taxonomy bucket from the bare status code a response
    /// carries (§7: only the code crosses the wire, never the message).
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            -1 => ErrorCode::Allocation,
            -2 => ErrorCode::InvalidArg,
            -3 => ErrorCode::Mercury,
            -4 => ErrorCode::Argobots,
            -5 => ErrorCode::Pmem,
            -6 => ErrorCode::UnknownTarget,
            -7 => ErrorCode::UnknownProvider,
            -8 => ErrorCode::UnknownRegion,
            -9 => ErrorCode::OutOfBounds,
            -10 => ErrorCode::Remi,
            -11 => ErrorCode::OpUnsupported,
            -12 => ErrorCode::Forbidden,
            -13 => ErrorCode::BackendType,
            -14 => ErrorCode::Io,
            _ => return None,
        })
    }
}

/// The BAKE error taxonomy (§7). Every RPC handler and backend operation
/// maps its failures down to one of these before it crosses a boundary.
#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("RPC transport error: {0}")]
    Mercury(String),

    #[error("task scheduling error: {0}")]
    Argobots(String),

    #[error("pmem pool error: {0}")]
    Pmem(String),

    #[error("unknown target {0}")]
    UnknownTarget(String),

    #[error("unknown provider")]
    UnknownProvider,

    #[error("unknown region {0}")]
    UnknownRegion(String),

    #[error("out of bounds access: {0}")]
    OutOfBounds(String),

    #[error("migration error: {0}")]
    Remi(String),

    #[error("operation unsupported on this backend: {0}")]
    OpUnsupported(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unknown backend type {0}")]
    BackendType(u32),

    #[error("backend I/O error: {0}")]
    Io(String),
}

impl BakeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BakeError::Allocation(_) => ErrorCode::Allocation,
            BakeError::InvalidArg(_) => ErrorCode::InvalidArg,
            BakeError::Mercury(_) => ErrorCode::Mercury,
            BakeError::Argobots(_) => ErrorCode::Argobots,
            BakeError::Pmem(_) => ErrorCode::Pmem,
            BakeError::UnknownTarget(_) => ErrorCode::UnknownTarget,
            BakeError::UnknownProvider => ErrorCode::UnknownProvider,
            BakeError::UnknownRegion(_) => ErrorCode::UnknownRegion,
            BakeError::OutOfBounds(_) => ErrorCode::OutOfBounds,
            BakeError::Remi(_) => ErrorCode::Remi,
            BakeError::OpUnsupported(_) => ErrorCode::OpUnsupported,
            BakeError::Forbidden(_) => ErrorCode::Forbidden,
            BakeError::BackendType(_) => ErrorCode::BackendType,
            BakeError::Io(_) => ErrorCode::Io,
        }
    }

    pub fn op_unsupported(op: impl Into<String>) -> Self {
        BakeError::OpUnsupported(op.into())
    }

    /// Reconstructs a best-effort error from a status code a remote peer
    /// returned. The detail string never crosses the wire, only the code,
    /// so the rebuilt variant's message is necessarily generic.
    pub fn from_remote_status(status: i32) -> Self {
        match ErrorCode::from_i32(status) {
            Some(ErrorCode::Allocation) => BakeError::Allocation("remote".into()),
            Some(ErrorCode::InvalidArg) => BakeError::InvalidArg("remote".into()),
            Some(ErrorCode::Argobots) => BakeError::Argobots("remote".into()),
            Some(ErrorCode::Pmem) => BakeError::Pmem("remote".into()),
            Some(ErrorCode::UnknownTarget) => BakeError::UnknownTarget("remote".into()),
            Some(ErrorCode::UnknownProvider) => BakeError::UnknownProvider,
            Some(ErrorCode::UnknownRegion) => BakeError::UnknownRegion("remote".into()),
            Some(ErrorCode::OutOfBounds) => BakeError::OutOfBounds("remote".into()),
            Some(ErrorCode::Remi) => BakeError::Remi("remote".into()),
            Some(ErrorCode::OpUnsupported) => BakeError::OpUnsupported("remote".into()),
            Some(ErrorCode::Forbidden) => BakeError::Forbidden("remote".into()),
            Some(ErrorCode::BackendType) => BakeError::BackendType(0),
            Some(ErrorCode::Io) => BakeError::Io("remote".into()),
            Some(ErrorCode::Mercury) | None => BakeError::Mercury(format!("remote status {status}")),
        }
    }
}

impl From<std::io::Error> for BakeError {
    fn from(err: std::io::Error) -> Self {
        BakeError::Io(err.to_string())
    }
}

/// Formats an error the way the CLI front-ends print it:
/// `"<context> (<code>) <message>"`, matching the original `bake_perror`.
pub fn format_error(context: &str, err: &BakeError) -> String {
    format!("{context} ({}) {err}", err.code().as_i32())
}

pub type Result<T> = std::result::Result<T, BakeError>;

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_bit_stable() {
        assert_eq!(ErrorCode::Allocation.as_i32(), -1);
        assert_eq!(ErrorCode::Io.as_i32(), -14);
    }

    #[test]
    fn perror_format_matches_convention() {
        let err = BakeError::UnknownRegion("deadbeef".into());
        let msg = format_error("read", &err);
        assert_eq!(msg, "read (-8) unknown region deadbeef");
    }

    #[test]
    fn remote_status_round_trips_through_the_code() {
        let err = BakeError::OutOfBounds("42+8 exceeds region length 16".into());
        let rebuilt = BakeError::from_remote_status(err.code().as_i32());
        assert_eq!(rebuilt.code(), ErrorCode::OutOfBounds);
    }

    #[test]
    fn unrecognized_status_falls_back_to_mercury() {
        let rebuilt = BakeError::from_remote_status(12345);
        assert_eq!(rebuilt.code(), ErrorCode::Mercury);
    }
}
