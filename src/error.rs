//! Error taxonomy for multilayer computations.
//!
//! Every fallible operation in the library returns a [`StackError`]. The
//! variants are fine grained so that callers can report precise messages,
//! while [`StackError::kind`] folds them into the four broad categories a
//! batch driver usually cares about.
//!
//! Validation always happens before any state is touched, so an `Err` never
//! leaves a [`Multilayer`](crate::multilayer::Multilayer) half updated.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, StackError>;

/// Broad classification of a [`StackError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed construction input: wrong shapes, bad thickness, bad table.
    Config,
    /// A wavelength outside an interpolation domain, or no common domain.
    Range,
    /// A computation was requested before its prerequisites were set.
    State,
    /// A layer index that does not exist or may not be used for the operation.
    Index,
}

/// Quantity that must be set before a computation can proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    Wavelength,
    PropagationAngle(usize),
    Polarization,
    LayerMatrix(usize),
    GlobalMatrices,
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prerequisite::Wavelength => write!(f, "the wavelength"),
            Prerequisite::PropagationAngle(i) => write!(f, "the propagation angle of layer {}", i),
            Prerequisite::Polarization => write!(f, "the polarization"),
            Prerequisite::LayerMatrix(i) => write!(f, "the characteristic matrix of layer {}", i),
            Prerequisite::GlobalMatrices => write!(f, "the global characteristic matrices"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StackError {
    /// Malformed stack or medium specification.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("layer {index}: thickness must be >= 0, got {thickness}")]
    NegativeThickness { index: usize, thickness: f64 },

    #[error("expected one value per layer ({expected}), got {got}")]
    OverrideLength { expected: usize, got: usize },

    #[error("wavelength {wavelength} is outside the valid range [{min}, {max}]")]
    WavelengthOutOfRange { wavelength: f64, min: f64, max: f64 },

    #[error("the media of the stack share no common wavelength range")]
    EmptyRange,

    #[error("interpolation failed: {0}")]
    Interpolation(String),

    #[error("{0} has not been set")]
    Missing(Prerequisite),

    #[error("layer {index} does not exist (the stack has {len} layers)")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Interior-only operation attempted on the top or bottom medium.
    #[error("layer {0} is a semi-infinite terminal medium")]
    TerminalLayer(usize),
}

impl StackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StackError::Config(_)
            | StackError::NegativeThickness { .. }
            | StackError::OverrideLength { .. } => ErrorKind::Config,
            StackError::WavelengthOutOfRange { .. }
            | StackError::EmptyRange
            | StackError::Interpolation(_) => ErrorKind::Range,
            StackError::Missing(_) => ErrorKind::State,
            StackError::IndexOutOfBounds { .. } | StackError::TerminalLayer(_) => ErrorKind::Index,
        }
    }

    pub(crate) fn check_index(index: usize, len: usize) -> Result<()> {
        (index < len)
            .then_some(())
            .ok_or(StackError::IndexOutOfBounds { index, len })
    }

    pub(crate) fn check_interior(index: usize, len: usize) -> Result<()> {
        Self::check_index(index, len)?;
        (index != 0 && index != len - 1)
            .then_some(())
            .ok_or(StackError::TerminalLayer(index))
    }
}
