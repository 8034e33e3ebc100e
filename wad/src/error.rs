use std::io;
use thiserror::Error;

/// Errors raised while opening, reading, or rewriting an archive.
#[derive(Error, Debug)]
pub enum WadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("file is not an IWAD or PWAD")]
    BadMagic,

    #[error("directory extends beyond end of file")]
    DirectoryOutOfBounds,

    #[error("lump index {0} out of range")]
    BadIndex(usize),

    #[error("lump {name} (# {index}) slice {offset}+{size} past EOF ({file_size})")]
    BadOffset {
        index: usize,
        name: String,
        offset: u32,
        size: u32,
        file_size: usize,
    },

    #[error("lump {name} (# {index}) size {size} not a multiple of element size {elem_size}")]
    BadLumpSize {
        index: usize,
        name: String,
        size: usize,
        elem_size: usize,
    },

    #[error("lump name {0:?} is longer than 8 characters")]
    NameTooLong(String),

    #[error("no level marker named {0}")]
    NoSuchLevel(String),

    #[error("level {0} is missing mandatory lump {1}")]
    MissingLevelLump(String, &'static str),
}
