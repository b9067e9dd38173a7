//! Protocol error taxonomy
//!
//! Core operations return [`ProtocolError`] when a request cannot be applied.
//! Errors are either fatal to the offending connection or recoverable, in
//! which case only the single request is rejected and existing state is left
//! untouched.

use crate::registry::{ObjectId, RegistryError};
use crate::surface::Role;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("surface {surface} already has the {existing:?} role, cannot become {requested:?}")]
    RoleAlreadyAssigned {
        surface: ObjectId,
        existing: Role,
        requested: Role,
    },

    #[error("buffer scale {0} is not positive")]
    InvalidScale(i32),

    #[error("unsupported pixel format {0:#010x}")]
    InvalidFormat(u32),

    #[error("invalid buffer dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },

    #[error("invalid stride {stride} or offset {offset} for a pool of {pool_size} bytes")]
    InvalidStride {
        stride: i32,
        offset: i32,
        pool_size: usize,
    },

    #[error("plane index {0} out of range")]
    PlaneIndex(u32),

    #[error("plane {0} was already set")]
    PlaneSet(u32),

    #[error("format {format:#010x} needs {expected} planes, got {actual}")]
    PlaneCount {
        format: u32,
        expected: usize,
        actual: usize,
    },

    #[error("buffer parameters incomplete: {0}")]
    Incomplete(&'static str),

    #[error("buffer parameters were already used")]
    AlreadyUsed,

    #[error("invalid window geometry {width}x{height}")]
    InvalidGeometry { width: i32, height: i32 },

    #[error("{0} cannot be a sub-surface of itself or its descendants")]
    BadSurface(ObjectId),

    #[error("{0} is not a valid parent")]
    InvalidParent(ObjectId),

    #[error("invalid viewport value: {0}")]
    ViewportBadValue(String),

    #[error("surface {surface} already has a {extension} object")]
    ExtensionExists {
        surface: ObjectId,
        extension: &'static str,
    },

    #[error("invalid alpha {0}")]
    InvalidAlpha(f64),

    #[error("invalid resize edge {0}")]
    InvalidResizeEdge(u32),
}

impl ProtocolError {
    /// Fatal errors terminate the offending connection. Everything else only
    /// rejects the request.
    pub fn is_fatal(&self) -> bool {
        match self {
            ProtocolError::Registry(_)
            | ProtocolError::InvalidFormat(_)
            | ProtocolError::InvalidStride { .. }
            | ProtocolError::PlaneIndex(_)
            | ProtocolError::PlaneSet(_)
            | ProtocolError::PlaneCount { .. }
            | ProtocolError::Incomplete(_)
            | ProtocolError::AlreadyUsed
            | ProtocolError::BadSurface(_)
            | ProtocolError::InvalidParent(_) => true,
            ProtocolError::RoleAlreadyAssigned { .. }
            | ProtocolError::InvalidScale(_)
            | ProtocolError::InvalidDimensions { .. }
            | ProtocolError::InvalidGeometry { .. }
            | ProtocolError::ViewportBadValue(_)
            | ProtocolError::ExtensionExists { .. }
            | ProtocolError::InvalidAlpha(_)
            | ProtocolError::InvalidResizeEdge(_) => false,
        }
    }
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
