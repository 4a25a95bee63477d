use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    /// The byte-pattern guard did not match at the given offset
    #[error("Pattern mismatch at offset {offset:#x}")]
    PatchMismatch { offset: usize },

    /// Patch or pattern would run past the end of the image
    #[error("Patch out of bounds: offset {offset:#x} + {len} > {image_len}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        image_len: usize,
    },

    /// The image is too small to contain a digest at the published spot
    #[error("Image of {len} bytes cannot hold a digest at offset {offset:#x}")]
    NoRoomForDigest { len: usize, offset: usize },

    #[error("{0}")]
    Custom(#[from] Box<dyn std::error::Error>),
}
