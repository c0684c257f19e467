//! Error types for lumen_core

use crate::geometry::Rect;
use thiserror::Error;

/// Errors raised while recording a picture
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PictureError {
    /// `restore` with no open `save`/`save_layer`
    #[error("restore without a matching save")]
    UnmatchedRestore,

    /// Recording finished with saves still open
    #[error("unbalanced save/restore: {depth} save(s) left open")]
    UnbalancedSave { depth: usize },

    /// `save_layer` bounds that are empty or not finite
    #[error("invalid layer bounds: {0:?}")]
    InvalidLayerBounds(Rect),
}

/// Result type for lumen_core operations
pub type Result<T> = std::result::Result<T, PictureError>;
