use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use log::{debug, info};

use crate::block;
use crate::error::{Error, Result};
use crate::identity::IdentityResolver;
use crate::Header;

/// A structure for building archives
///
/// This structure has methods for building up an archive from scratch into any
/// arbitrary writer. Each entry is a header block followed by its payload,
/// zero-padded to a whole number of blocks.
pub struct Builder<W: Write> {
    finished: bool,
    obj: W,
}

impl<W: Write> Builder<W> {
    /// Create a new archive builder with the underlying object as the
    /// destination of all data written.
    pub fn new(obj: W) -> Builder<W> {
        Builder {
            finished: false,
            obj,
        }
    }

    /// Unwrap this archive, returning the underlying object.
    ///
    /// This function will finish writing the archive if the `finish` function
    /// hasn't yet been called, returning any I/O error which happens during
    /// that operation.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        Ok(self.obj)
    }

    /// Adds a new entry to this archive.
    ///
    /// This function will append the header specified, followed by exactly
    /// `header.size()` bytes read from `data`. The checksum for the header
    /// should have been set via the `set_cksum` method. If `data` ends early
    /// an error is returned and the archive is left incomplete.
    ///
    /// Note that this will not attempt to seek the archive to a valid position,
    /// so if the archive is in the middle of a read or some other similar
    /// operation then this may corrupt the archive.
    ///
    /// # Examples
    ///
    /// ```
    /// use minitar::{Builder, Header};
    ///
    /// let mut header = Header::new();
    /// header.set_path("foo").unwrap();
    /// header.set_size(4).unwrap();
    /// header.set_cksum();
    ///
    /// let data: &[u8] = &[1, 2, 3, 4];
    ///
    /// let mut ar = Builder::new(Vec::new());
    /// ar.append(&header, data).unwrap();
    /// let data = ar.into_inner().unwrap();
    /// assert_eq!(data.len(), 512 + 512 + 1024);
    /// ```
    pub fn append<R: Read>(&mut self, header: &Header, data: R) -> Result<()> {
        let name = String::from_utf8_lossy(&header.path_bytes()).into_owned();
        let size = header.size().map_err(|source| Error::Encode {
            path: header.path().into_owned(),
            source,
        })?;
        let write_err = |e| Error::io(format!("failed to add `{}` to archive", name), e);

        block::write_block(&mut self.obj, header.as_bytes()).map_err(write_err)?;
        let copied = block::write_payload(&mut self.obj, &mut data.take(size)).map_err(write_err)?;
        if copied != size {
            return Err(write_err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes of content, found {}", size, copied),
            )));
        }
        info!("{}", name);
        debug!("added `{}` ({} bytes)", name, size);
        Ok(())
    }

    /// Adds a file on the local filesystem to this archive.
    ///
    /// The header is built by `Header::from_path`, so the path name inside the
    /// archive is `path` exactly as given, and owner names are resolved with
    /// `identity`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use minitar::{Builder, SystemIdentity};
    ///
    /// let mut ar = Builder::new(Vec::new());
    ///
    /// ar.append_path("foo/bar.txt", &SystemIdentity).unwrap();
    /// ```
    pub fn append_path<P, I>(&mut self, path: P, identity: &I) -> Result<()>
    where
        P: AsRef<Path>,
        I: IdentityResolver + ?Sized,
    {
        let path = path.as_ref();
        let header = Header::from_path(path, identity)?;
        self.append_file(path, &header)
    }

    /// Adds the file at `path` using a header built beforehand, typically by
    /// `Header::from_path`.
    ///
    /// Directory headers are written without reading `path`.
    pub fn append_file<P: AsRef<Path>>(&mut self, path: P, header: &Header) -> Result<()> {
        let path = path.as_ref();
        if header.entry_type().is_dir() {
            return self.append(header, io::empty());
        }
        let file = fs::File::open(path).map_err(|e| {
            Error::io(format!("failed to open `{}` for reading", path.display()), e)
        })?;
        self.append(header, io::BufReader::new(file))
    }

    /// Finish writing this archive, emitting the termination sections.
    ///
    /// This function should only be called when the archive has been written
    /// entirely. Calling it more than once writes the marker only once.
    ///
    /// In most situations the `into_inner` method should be preferred.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        block::write_end_markers(&mut self.obj)
            .and_then(|()| self.obj.flush())
            .map_err(|e| Error::io("failed to write end-of-archive marker", e))
    }
}
