//! Error types for the `relay-world` crate.

use relay_types::UnknownTileCode;

/// Errors that can occur during belief-map operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A tile coordinate lies outside the map bounds.
    #[error("tile ({x}, {y}) is outside the {width}x{height} map")]
    OutOfBounds {
        /// Offending column.
        x: u32,
        /// Offending row.
        y: u32,
        /// Map width.
        width: u32,
        /// Map height.
        height: u32,
    },

    /// The map broadcast contained an unknown tile type code.
    ///
    /// Fatal at map initialisation: the walkability model cannot be
    /// trusted after this.
    #[error(transparent)]
    UnknownTileCode(#[from] UnknownTileCode),

    /// A tile index computation overflowed the platform's address range.
    #[error("map index overflow at ({x}, {y})")]
    IndexOverflow {
        /// Offending column.
        x: u32,
        /// Offending row.
        y: u32,
    },
}
