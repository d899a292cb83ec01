//! Placer module for moving files into their canonical directories.
//!
//! When a file with the same name already exists at the destination the
//! collision is resolved explicitly, and each resolution is logged:
//!
//! - identical content: the source is deleted, the destination is untouched
//! - different content, source newer: the destination is overwritten
//! - different content, source not newer: the destination is kept and a
//!   warning is emitted; the source goes to the conflict directory if one is
//!   configured
//!
//! Moves are atomic renames when source and destination share a filesystem,
//! with a copy-and-delete fallback otherwise.

mod error;
mod fs_placer;
mod types;

pub use error::PlacerError;
pub use fs_placer::FsPlacer;
pub use types::PlacementOutcome;
