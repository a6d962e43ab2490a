use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by archive operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The metadata of an input file could not be read.
    #[error("failed to stat `{}`", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The owner or group id of an input file has no name.
    #[error("failed to look up {kind} name for id {id} (owner of `{}`)", path.display())]
    LookupFailure {
        path: PathBuf,
        kind: IdKind,
        id: u32,
    },
    /// The archive to operate on does not exist.
    #[error("archive `{}` does not exist", path.display())]
    ArchiveNotFound { path: PathBuf },
    /// An I/O operation on the archive or on an entry failed.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    /// The archive is not a well-formed ustar archive.
    #[error("corrupt archive at offset {offset}")]
    CorruptArchive {
        offset: u64,
        #[source]
        source: FormatError,
    },
    /// An input file cannot be described by a ustar header.
    #[error("cannot encode a header for `{}`", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
    /// An input path is neither a regular file nor a directory.
    #[error("`{}` has an unsupported file type", path.display())]
    Unsupported { path: PathBuf },
    /// `update` was asked for a file the archive does not contain.
    #[error("`{name}` is not present in the archive")]
    NotInArchive { name: String },
}

/// Which identity database a failed lookup went to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    User,
    Group,
}

impl std::fmt::Display for IdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdKind::User => f.write_str("user"),
            IdKind::Group => f.write_str("group"),
        }
    }
}

/// Violations of the ustar layout, found while encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("header checksum mismatch (stored {stored:o}, computed {computed:o})")]
    BadChecksum { stored: u32, computed: u32 },
    #[error("header is missing the ustar magic")]
    BadMagic,
    #[error("header field `{field}` is not a valid octal number")]
    InvalidNumber { field: &'static str },
    #[error("value {value} does not fit in header field `{field}`")]
    ValueTooLarge { field: &'static str, value: u64 },
    #[error("value of {len} bytes does not fit in header field `{field}`")]
    TooLong { field: &'static str, len: usize },
    #[error("header field `{field}` contains a nul byte")]
    NulByte { field: &'static str },
    #[error("archive ends in the middle of a block ({len} of 512 bytes)")]
    ShortBlock { len: usize },
    #[error("found a block of zeros not followed by a second block of zeros")]
    LoneZeroBlock,
    #[error("entry claims {needed} bytes of payload but only {available} remain")]
    Truncated { needed: u64, available: u64 },
    #[error("archive has no end-of-archive marker")]
    MissingEndMarker,
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Error {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}
