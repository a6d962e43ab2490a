use std::borrow::Cow;
use std::cmp;
use std::fs;
use std::io::prelude::*;
use std::io;
use std::path::{Component, Path};

use filetime::{self, FileTime};
use log::{debug, warn};

use crate::archive::ArchiveInner;
use crate::error::{Error, Result};
use crate::Header;

/// A read-only view into an entry of an archive.
///
/// This structure is a window into a portion of a borrowed archive which can
/// be inspected. It acts as a file handle by implementing the Read trait,
/// yielding exactly the entry's size in bytes; block padding is never
/// returned. Reads re-position the archive first, so an entry stays readable
/// after the iterator that produced it has moved on.
pub struct Entry<'a, R: 'a + ?Sized + Read + Seek> {
    archive: &'a ArchiveInner<R>,
    header: Header,
    header_pos: u64,
    file_pos: u64,
    size: u64,
    pos: u64,
    preserve_permissions: bool,
    preserve_mtime: bool,
}

impl<'a, R: ?Sized + Read + Seek> Entry<'a, R> {
    pub(crate) fn new(
        archive: &'a ArchiveInner<R>,
        header: Header,
        header_pos: u64,
        file_pos: u64,
        size: u64,
    ) -> Entry<'a, R> {
        Entry {
            preserve_permissions: archive.preserve_permissions(),
            preserve_mtime: archive.preserve_mtime(),
            archive,
            header,
            header_pos,
            file_pos,
            size,
            pos: 0,
        }
    }

    /// Returns the path name for this entry.
    pub fn path(&self) -> Cow<'_, Path> {
        self.header.path()
    }

    /// Returns the raw bytes listed for this entry.
    pub fn path_bytes(&self) -> Cow<'_, [u8]> {
        self.header.path_bytes()
    }

    /// Returns access to the header of this entry in the archive.
    ///
    /// This provides access to the metadata for this entry in the archive.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the size of the payload of this entry, without padding.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the starting position, in bytes, of the header of this entry
    /// in the archive.
    pub fn raw_header_position(&self) -> u64 {
        self.header_pos
    }

    /// Returns the starting position, in bytes, of the file of this entry in
    /// the archive.
    pub fn raw_file_position(&self) -> u64 {
        self.file_pos
    }

    /// Indicate whether extended permissions (like suid on Unix) are
    /// preserved when unpacking this entry.
    pub fn set_preserve_permissions(&mut self, preserve: bool) {
        self.preserve_permissions = preserve;
    }

    /// Indicate whether the modification time is restored when unpacking
    /// this entry.
    pub fn set_preserve_mtime(&mut self, preserve: bool) {
        self.preserve_mtime = preserve;
    }

    /// Extracts this entry into the directory `dst`, below which the
    /// entry's own path name is created.
    ///
    /// Leading `/` and `.` components of the name are ignored. Entries whose
    /// names contain `..` are skipped, in which case `false` is returned.
    /// Missing parent directories are created.
    pub fn unpack_in<P: AsRef<Path>>(&mut self, dst: P) -> Result<bool> {
        let dst = dst.as_ref();
        let mut file_dst = dst.to_path_buf();
        for part in self.path().components() {
            match part {
                // Leading '/' characters, root paths, and '.'
                // components are just ignored and treated as "empty
                // components"
                Component::Prefix(..) | Component::RootDir | Component::CurDir => continue,

                // If any part of the filename is '..', then skip over
                // unpacking the file to prevent directory traversal
                // security issues.
                Component::ParentDir => {
                    warn!(
                        "skipping `{}`: path contains `..`",
                        self.path().display()
                    );
                    return Ok(false);
                }

                Component::Normal(part) => file_dst.push(part),
            }
        }

        // Skip cases where only slashes or '.' parts were seen, because
        // this is effectively an empty filename.
        if *dst == *file_dst {
            return Ok(true);
        }

        if let Some(parent) = file_dst.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("failed to create `{}`", parent.display()), e)
            })?;
        }
        self.unpack(&file_dst)?;
        Ok(true)
    }

    /// Writes this entry to the specified location.
    ///
    /// Regular files are created at `dst`, replacing any existing
    /// non-directory there, and receive exactly `size` bytes; the
    /// permission bits and modification time are then restored. Directory
    /// entries create a directory, or reuse an existing one, and restore its
    /// permission bits. Links and special files are skipped. Intermediate
    /// directories must already exist.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::fs::File;
    /// use minitar::Archive;
    ///
    /// let mut ar = Archive::new(File::open("foo.tar").unwrap());
    ///
    /// for (i, file) in ar.entries().unwrap().enumerate() {
    ///     let mut file = file.unwrap();
    ///     file.unpack(format!("file-{}", i)).unwrap();
    /// }
    /// ```
    pub fn unpack<P: AsRef<Path>>(&mut self, dst: P) -> Result<()> {
        self._unpack(dst.as_ref())
    }

    fn _unpack(&mut self, dst: &Path) -> Result<()> {
        let kind = self.header.entry_type();
        if kind.is_dir() {
            debug!("creating directory `{}`", dst.display());
            // If the directory already exists just let it slide
            if !fs::metadata(dst).map(|m| m.is_dir()).unwrap_or(false) {
                fs::create_dir(dst).map_err(|e| {
                    Error::io(format!("failed to create directory `{}`", dst.display()), e)
                })?;
            }
            return self.restore_mode(dst);
        } else if kind.is_special() {
            warn!(
                "skipping `{}`: {:?} entries are not supported",
                self.path().display(),
                kind
            );
            return Ok(());
        }

        // Unrecognized typeflags are treated as regular files, as POSIX
        // requires.
        debug!("extracting `{}` ({} bytes)", dst.display(), self.size);
        if let Ok(meta) = fs::symlink_metadata(dst) {
            if !meta.is_dir() {
                fs::remove_file(dst).map_err(|e| {
                    Error::io(format!("failed to replace `{}`", dst.display()), e)
                })?;
            }
        }
        let name = String::from_utf8_lossy(&self.header.path_bytes()).into_owned();
        let unpack_err = |e| {
            Error::io(
                format!("failed to unpack `{}` into `{}`", name, dst.display()),
                e,
            )
        };
        let mut f = fs::File::create(dst).map_err(unpack_err)?;
        let copied = io::copy(self, &mut f).map_err(unpack_err)?;
        if copied != self.size {
            return Err(unpack_err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "failed to write entire file",
            )));
        }
        drop(f);

        if self.preserve_mtime {
            if let Ok(mtime) = self.header.mtime() {
                let mtime = FileTime::from_unix_time(mtime as i64, 0);
                filetime::set_file_times(dst, mtime, mtime).map_err(|e| {
                    Error::io(format!("failed to set mtime for `{}`", dst.display()), e)
                })?;
            }
        }
        self.restore_mode(dst)
    }

    fn restore_mode(&self, dst: &Path) -> Result<()> {
        if let Ok(mode) = self.header.mode() {
            set_perms(dst, mode, self.preserve_permissions).map_err(|e| {
                Error::io(
                    format!("failed to set permissions to {:o} for `{}`", mode, dst.display()),
                    e,
                )
            })?;
        }
        return Ok(());

        #[cfg(unix)]
        fn set_perms(dst: &Path, mode: u32, preserve: bool) -> io::Result<()> {
            use std::os::unix::prelude::*;

            let mode = if preserve { mode & 0o7777 } else { mode & 0o777 };
            fs::set_permissions(dst, fs::Permissions::from_mode(mode))
        }
        #[cfg(not(unix))]
        fn set_perms(dst: &Path, mode: u32, _preserve: bool) -> io::Result<()> {
            let mut perm = fs::metadata(dst)?.permissions();
            perm.set_readonly(mode & 0o200 != 0o200);
            fs::set_permissions(dst, perm)
        }
    }
}

impl<R: ?Sized + Read + Seek> Read for Entry<'_, R> {
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.size || into.is_empty() {
            return Ok(0);
        }
        self.archive.seek(self.file_pos + self.pos)?;
        let max = cmp::min(self.size - self.pos, into.len() as u64) as usize;
        let n = (&mut &*self.archive).read(&mut into[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ended in the middle of an entry",
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}
