//! Shared domain types: identifiers and the closed error taxonomy.
//!
//! `Error` is returned, never thrown: every mutating and read operation in
//! this crate resolves to `std::result::Result<T, Error>`, following the
//! same flat, candid-friendly shape as the capsule backend this was grown
//! from.

use candid::{CandidType, Deserialize};
use serde::Serialize;

/// Opaque capsule scope handed to us by the access-control layer. We never
/// interpret it beyond equality and use as a storage key.
pub type CapsuleId = String;

/// Opaque memory identifier, allocated on creation.
pub type MemoryId = String;

/// Closed error taxonomy. Every variant maps 1:1 to an error kind an
/// external caller can branch on; string payloads are diagnostic only and
/// must never be parsed by callers.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    NotFound,
    InvalidArgument(String),
    InvalidState(String),
    OutOfRange(String),
    TooLarge(String),
    Conflict(String),
    HashMismatch,
    LengthMismatch,
    IncompleteUpload,
    Unauthorized,
    AlreadyExists,
    Internal(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "not found"),
            Error::InvalidArgument(m) => write!(f, "invalid argument: {m}"),
            Error::InvalidState(m) => write!(f, "invalid state: {m}"),
            Error::OutOfRange(m) => write!(f, "out of range: {m}"),
            Error::TooLarge(m) => write!(f, "too large: {m}"),
            Error::Conflict(m) => write!(f, "conflict: {m}"),
            Error::HashMismatch => write!(f, "hash mismatch"),
            Error::LengthMismatch => write!(f, "length mismatch"),
            Error::IncompleteUpload => write!(f, "incomplete upload"),
            Error::Unauthorized => write!(f, "unauthorized"),
            Error::AlreadyExists => write!(f, "already exists"),
            Error::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

impl std::error::Error for Error {}
