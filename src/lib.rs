//! A library for reading and writing ustar archives
//!
//! This library implements a minimal tar archiver [1] that packs regular
//! files into the POSIX ustar layout: a 512-byte header per entry, payload
//! padded to whole 512-byte blocks, and two zero blocks marking the end of
//! the archive. Archives are read and written a block at a time, so neither
//! the archive nor any member file needs to be resident in memory.
//!
//! The `ops` functions work on archive paths and implement the usual
//! create/append/list/update/extract operations. `Builder` and `Archive`
//! are the streaming halves they are built from.
//!
//! [1]: http://en.wikipedia.org/wiki/Tar_%28computing%29

pub use crate::archive::{Archive, Entries};
pub use crate::block::{
    padded_size, read_block, strip_end_markers, write_block, write_end_markers, write_payload,
    BLOCK_SIZE, END_MARKER_SIZE,
};
pub use crate::builder::Builder;
pub use crate::entry::Entry;
pub use crate::entry_type::EntryType;
pub use crate::error::{Error, FormatError, IdKind, Result};
pub use crate::header::{Decoded, Header};
pub use crate::identity::{IdentityResolver, SystemIdentity};
pub use crate::ops::{append, create, extract, list, update};

mod archive;
pub mod block;
mod builder;
mod entry;
mod entry_type;
mod error;
mod header;
mod identity;
pub mod ops;
