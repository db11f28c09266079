//! Unified error types for the wattmeter firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! supervision loop in `main` handles failures uniformly.  All variants are
//! `Copy` so they can be latched and passed around without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The clock source failed or ran backward.
    Clock(ClockError),
    /// An input or output line could not be acquired or registered.
    Line(LineError),
    /// An attribute write was rejected.
    Attribute(AttributeError),
    /// Persistent storage failed.
    Storage(StorageError),
    /// Startup could not complete.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clock(e) => write!(f, "clock: {e}"),
            Self::Line(e) => write!(f, "line: {e}"),
            Self::Attribute(e) => write!(f, "attribute: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Clock errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The clock could not produce a reading (e.g. wall clock before epoch).
    Unavailable,
    /// A reading was earlier than the previously accepted pulse.
    Regressed,
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "clock unavailable"),
            Self::Regressed => write!(f, "clock ran backward"),
        }
    }
}

impl From<ClockError> for Error {
    fn from(e: ClockError) -> Self {
        Self::Clock(e)
    }
}

// ---------------------------------------------------------------------------
// Line errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// GPIO number does not exist on this part.
    InvalidPin(i32),
    /// The line is already claimed by another owner.
    Busy(i32),
    /// GPIO configuration call failed (platform return code).
    ConfigFailed(i32),
    /// The per-pin ISR service could not be installed.
    IsrInstallFailed(i32),
    /// Attaching the pulse handler to the line failed.
    RegisterFailed(i32),
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPin(pin) => write!(f, "GPIO {} does not exist", pin),
            Self::Busy(pin) => write!(f, "GPIO {} already in use", pin),
            Self::ConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::RegisterFailed(rc) => write!(f, "handler registration failed (rc={})", rc),
        }
    }
}

impl From<LineError> for Error {
    fn from(e: LineError) -> Self {
        Self::Line(e)
    }
}

// ---------------------------------------------------------------------------
// Attribute errors
// ---------------------------------------------------------------------------

/// Rejected attribute writes.  Always local and recoverable; the meter
/// state is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeError {
    /// No attribute with that name.
    UnknownAttribute,
    /// The attribute cannot be written.
    ReadOnly,
    /// The written text does not parse for this attribute.
    InvalidValue,
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAttribute => write!(f, "unknown attribute"),
            Self::ReadOnly => write!(f, "attribute is read-only"),
            Self::InvalidValue => write!(f, "invalid value"),
        }
    }
}

impl From<AttributeError> for Error {
    fn from(e: AttributeError) -> Self {
        Self::Attribute(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Stored blob failed to decode.
    Corrupted,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "stored value corrupted"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
