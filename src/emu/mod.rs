//! The emulator/debugger module.

use std::path::PathBuf;

use thiserror::Error;

pub mod alu;
pub mod charset;
pub mod cpu;
pub mod debugger;
pub mod display;
pub mod emulator;
pub mod execute;
pub mod patch;
pub mod peripherals;
pub mod ram;
pub mod registers;
pub mod snapshot;
pub mod special;

/// Which memory region an image is loaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Program memory (6144 bytes).
    Internal,
    /// Data memory (2048 bytes).
    External,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::External => write!(f, "external"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EmuError {
    #[error("{region} image {path:?} unavailable, region zero-filled: {source}")]
    MissingImage {
        region: Region,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid button line: {0}")]
    InvalidButton(u8),
    #[error("invalid breakpoint address: {0:#X}")]
    InvalidBreakpoint(u32),
    #[error("malformed patch entry at column {column}: {fragment:?}")]
    MalformedPatch { column: usize, fragment: String },
    #[error(transparent)]
    Platform(#[from] crate::plat::PlatformError),
}
