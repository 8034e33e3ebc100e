//! Archive (collaborator) layer: a named byte-blob container with
//! directory maintenance, read and write. Knows nothing about level
//! semantics beyond the fixed lump-name window a level occupies.

mod archive;
mod error;

pub use archive::{LEVEL_LUMP_NAMES, LevelGroup, Wad};
pub use error::WadError;
