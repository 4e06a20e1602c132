//! File formats for the groovebox.
//!
//! Project persistence (voice records, the lock pool and whole projects)
//! and WAV reading and writing for samples and offline renders.

mod persistence;
mod wav_format;

pub use persistence::{
    decode_pool, decode_project, decode_voice, encode_pool, encode_project, encode_voice, Project,
    FORMAT_VERSION,
};
pub use wav_format::{frames_to_wav, load_wav, write_wav, WavSample};

use gb_ir::PoolError;

/// Error type for reading and writing files.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    #[error("invalid header")]
    InvalidHeader,
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("unsupported wav encoding: {0}")]
    UnsupportedEncoding(&'static str),
    /// Structurally valid data that breaks an invariant.
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Binary(#[from] binrw::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
