// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types for the meshing engine
//!
//! Every failure the engine can report maps to one [`MeshError`] variant and a
//! stable integer status code (0 is reserved for success). Construction-time
//! problems (bad criteria, inconsistent domains) are reported before any
//! refinement work starts; a failed call never hands back a partial mesh.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors raised by the meshing engine and its I/O collaborators.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Malformed, non-manifold or inconsistently labeled input geometry.
    #[error("domain inconsistency: {0}")]
    DomainInconsistency(String),

    /// Refinement criteria outside their feasible range.
    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    /// The insertion budget ran out before every facet and cell was good.
    #[error(
        "refinement did not converge after {insertions} insertions ({remaining} elements still violate the criteria)"
    )]
    RefinementDidNotConverge { insertions: usize, remaining: usize },

    /// Zero-measure input reached a computation that needs a proper element.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// An external file could not be read or written.
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file was read but its content could not be interpreted.
    #[error("malformed file {path}: {message}")]
    Format { path: PathBuf, message: String },
}

impl MeshError {
    pub fn domain(message: impl Into<String>) -> Self {
        MeshError::DomainInconsistency(message.into())
    }

    pub fn criteria(message: impl Into<String>) -> Self {
        MeshError::InvalidCriteria(message.into())
    }

    pub fn degenerate(message: impl Into<String>) -> Self {
        MeshError::DegenerateGeometry(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MeshError::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Status code reported across the binding boundary.
    pub fn status_code(&self) -> i32 {
        match self {
            MeshError::DomainInconsistency(_) => 1,
            MeshError::InvalidCriteria(_) => 2,
            MeshError::RefinementDidNotConverge { .. } => 3,
            MeshError::DegenerateGeometry(_) => 4,
            MeshError::Io { .. } => 5,
            MeshError::Format { .. } => 6,
        }
    }
}

/// Collapse a result into the integer status convention (0 = success).
pub fn status_code<T>(result: &MeshResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) => err.status_code(),
    }
}
