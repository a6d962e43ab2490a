use std::cell::{Cell, RefCell};
use std::fs;
use std::io::prelude::*;
use std::io::{self, SeekFrom};
use std::path::Path;

use log::{error, warn};

use crate::block::{self, padded_size, BLOCK_SIZE};
use crate::entry::Entry;
use crate::error::{Error, FormatError, Result};
use crate::header::{Decoded, Header};

/// A top-level representation of an archive file.
///
/// The archive is walked strictly in order: each header's size field says
/// where the next header starts. Payload that is not read is skipped by
/// seeking, so listing an archive never touches file contents.
pub struct Archive<R: ?Sized + Read + Seek> {
    inner: ArchiveInner<R>,
}

pub(crate) struct ArchiveInner<R: ?Sized> {
    preserve_permissions: bool,
    preserve_mtime: bool,
    pos: Cell<u64>,
    obj: RefCell<R>,
}

/// An iterator over the entries of an archive.
///
/// Yields each entry in archive order and stops after the end-of-archive
/// marker. After the first error the iterator is exhausted.
pub struct Entries<'a, R: 'a + ?Sized + Read + Seek> {
    archive: &'a ArchiveInner<R>,
    next: u64,
    len: u64,
    end: Option<u64>,
    done: bool,
}

impl<R: Read + Seek> Archive<R> {
    /// Create a new archive with the underlying object as the reader.
    pub fn new(obj: R) -> Archive<R> {
        Archive {
            inner: ArchiveInner {
                preserve_permissions: false,
                preserve_mtime: true,
                pos: Cell::new(0),
                obj: RefCell::new(obj),
            },
        }
    }

    /// Unwrap this archive, returning the underlying object.
    pub fn into_inner(self) -> R {
        self.inner.obj.into_inner()
    }

    /// Indicate whether extended permissions (like suid on Unix) are
    /// preserved when unpacking this archive.
    ///
    /// This flag is disabled by default, in which case only the `0o777`
    /// permission bits are restored.
    pub fn set_preserve_permissions(&mut self, preserve: bool) {
        self.inner.preserve_permissions = preserve;
    }

    /// Indicate whether modification times are restored when unpacking this
    /// archive.
    ///
    /// This flag is enabled by default.
    pub fn set_preserve_mtime(&mut self, preserve: bool) {
        self.inner.preserve_mtime = preserve;
    }
}

impl<R: ?Sized + Read + Seek> Archive<R> {
    /// Construct an iterator over the entries in this archive.
    ///
    /// Every call starts over from the first header, so the sequence can be
    /// walked as many times as needed.
    pub fn entries(&mut self) -> Result<Entries<'_, R>> {
        let len = self
            .inner
            .rewind()
            .map_err(|e| Error::io("failed to seek within archive", e))?;
        Ok(Entries {
            archive: &self.inner,
            next: 0,
            len,
            end: None,
            done: false,
        })
    }

    /// Unpacks the contents tarball into the specified `dst`.
    ///
    /// This function will iterate over the entire contents of this tarball,
    /// extracting each file in turn to the location specified by the entry's
    /// path name. Directory entries are handled after everything else, so
    /// their permissions are applied once their contents are in place.
    /// Extraction stops at the first entry that fails.
    ///
    /// This operation is relatively sensitive in that it will not write files
    /// outside of the path specified by `dst`. Files in the archive which have
    /// a '..' in their path are skipped during the unpacking process.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::fs::File;
    /// use minitar::Archive;
    ///
    /// let mut ar = Archive::new(File::open("foo.tar").unwrap());
    /// ar.unpack("foo").unwrap();
    /// ```
    pub fn unpack<P: AsRef<Path>>(&mut self, dst: P) -> Result<()> {
        self._unpack(dst.as_ref())
    }

    fn _unpack(&mut self, dst: &Path) -> Result<()> {
        fs::create_dir_all(dst).map_err(|e| {
            Error::io(format!("failed to create `{}`", dst.display()), e)
        })?;
        let mut directories = Vec::new();
        for entry in self.entries()? {
            let mut file = entry?;
            if file.header().entry_type().is_dir() {
                directories.push(file);
                continue;
            }
            unpack_logged(&mut file, dst)?;
        }

        // Directory modes go on last, deepest first, so a read-only
        // directory doesn't stop the entries below it from being written.
        directories.sort_by(|a, b| b.path_bytes().cmp(&a.path_bytes()));
        for mut dir in directories {
            unpack_logged(&mut dir, dst)?;
        }
        Ok(())
    }
}

fn unpack_logged<R: ?Sized + Read + Seek>(file: &mut Entry<'_, R>, dst: &Path) -> Result<()> {
    file.unpack_in(dst).map(|_| ()).map_err(|e| {
        error!(
            "extraction aborted at `{}`: {}",
            String::from_utf8_lossy(&file.path_bytes()),
            e
        );
        e
    })
}

impl<R: ?Sized + Read + Seek> ArchiveInner<R> {
    pub(crate) fn preserve_permissions(&self) -> bool {
        self.preserve_permissions
    }

    pub(crate) fn preserve_mtime(&self) -> bool {
        self.preserve_mtime
    }

    /// Positions the underlying object at the start and returns its length.
    fn rewind(&self) -> io::Result<u64> {
        let mut obj = self.obj.borrow_mut();
        let len = obj.seek(SeekFrom::End(0))?;
        obj.seek(SeekFrom::Start(0))?;
        self.pos.set(0);
        Ok(len)
    }

    pub(crate) fn seek(&self, pos: u64) -> io::Result<()> {
        if self.pos.get() == pos {
            return Ok(());
        }
        self.obj.borrow_mut().seek(SeekFrom::Start(pos))?;
        self.pos.set(pos);
        Ok(())
    }
}

impl<R: ?Sized + Read> Read for &ArchiveInner<R> {
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        self.obj.borrow_mut().read(into).map(|i| {
            self.pos.set(self.pos.get() + i as u64);
            i
        })
    }
}

impl<'a, R: ?Sized + Read + Seek> Entries<'a, R> {
    /// Returns the offset of the end-of-archive marker.
    ///
    /// This is `None` until the walk has reached both zero blocks of the
    /// marker, and stays `None` for archives that end without one.
    pub fn end_of_archive(&self) -> Option<u64> {
        self.end
    }

    /// Reads the block at `offset`, `None` at a clean end of the archive.
    fn block_at(&self, offset: u64) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let remaining = self.len.saturating_sub(offset);
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < BLOCK_SIZE as u64 {
            return Err(Error::CorruptArchive {
                offset,
                source: FormatError::ShortBlock {
                    len: remaining as usize,
                },
            });
        }
        self.archive
            .seek(offset)
            .and_then(|()| block::read_block(&mut &*self.archive))
            .map_err(|e| Error::io(format!("failed to read archive block at offset {}", offset), e))
    }

    fn next_entry(&mut self) -> Result<Option<Entry<'a, R>>> {
        let header_pos = self.next;
        let block = match self.block_at(header_pos)? {
            Some(block) => block,
            None => {
                warn!(
                    "archive ends at offset {} without an end-of-archive marker",
                    header_pos
                );
                return Ok(None);
            }
        };
        self.next += BLOCK_SIZE as u64;

        // A block of 0s is never valid as a header (because of the checksum),
        // so if it's all zero it must be the first of the two end blocks.
        let header = match Header::from_block(&block) {
            Ok(Decoded::Header(header)) => header,
            Ok(Decoded::EndMarker) => {
                let second = self.next;
                return match self.block_at(second)? {
                    Some(block) if block.iter().all(|b| *b == 0) => {
                        self.end = Some(header_pos);
                        Ok(None)
                    }
                    Some(_) => Err(Error::CorruptArchive {
                        offset: second,
                        source: FormatError::LoneZeroBlock,
                    }),
                    None => {
                        warn!("archive ends after a single zero block");
                        Ok(None)
                    }
                };
            }
            Err(source) => {
                return Err(Error::CorruptArchive {
                    offset: header_pos,
                    source,
                })
            }
        };

        let size = header.size().map_err(|source| Error::CorruptArchive {
            offset: header_pos,
            source,
        })?;
        let file_pos = self.next;
        let needed = padded_size(size);
        let available = self.len - file_pos;
        if needed > available {
            return Err(Error::CorruptArchive {
                offset: header_pos,
                source: FormatError::Truncated { needed, available },
            });
        }
        self.next = file_pos + needed;

        Ok(Some(Entry::new(self.archive, header, header_pos, file_pos, size)))
    }
}

impl<'a, R: ?Sized + Read + Seek> Iterator for Entries<'a, R> {
    type Item = Result<Entry<'a, R>>;

    fn next(&mut self) -> Option<Result<Entry<'a, R>>> {
        // If we hit a previous error, or we reached the end, we're done here
        if self.done {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
