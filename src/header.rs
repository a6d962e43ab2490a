#[cfg(unix)]
use std::os::unix::prelude::*;

use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use crate::block::BLOCK_SIZE;
use crate::error::{Error, FormatError, IdKind, Result};
use crate::identity::IdentityResolver;
use crate::EntryType;

/// Representation of the header of an entry in an archive.
///
/// The layout is the POSIX ustar header: every numeric field is zero-padded
/// octal ASCII terminated by a NUL, strings are NUL-padded.
#[repr(C)]
#[allow(missing_docs)]
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub cksum: [u8; 8],
    pub typeflag: [u8; 1],
    pub linkname: [u8; 100],

    // UStar format
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub dev_major: [u8; 8],
    pub dev_minor: [u8; 8],
    pub prefix: [u8; 155],
    pub pad: [u8; 12],
}

const _: () = assert!(mem::size_of::<Header>() == BLOCK_SIZE);

/// Offsets of the checksum field within a header block.
const CKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// The result of decoding one 512-byte block at a header position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A valid ustar header.
    Header(Header),
    /// An all-zero block, the first half of the end-of-archive marker.
    EndMarker,
}

impl Header {
    /// Creates a new blank ustar header ready to be filled in.
    ///
    /// The header describes an empty regular file; the checksum is left
    /// unset.
    pub fn new() -> Header {
        let mut header = Header::zeroed();
        header.magic = *b"ustar\0";
        header.version = *b"00";
        header.typeflag = [EntryType::Regular.as_byte()];
        header
    }

    fn zeroed() -> Header {
        Header {
            name: [0; 100],
            mode: [0; 8],
            uid: [0; 8],
            gid: [0; 8],
            size: [0; 12],
            mtime: [0; 12],
            cksum: [0; 8],
            typeflag: [0; 1],
            linkname: [0; 100],
            magic: [0; 6],
            version: [0; 2],
            uname: [0; 32],
            gname: [0; 32],
            dev_major: [0; 8],
            dev_minor: [0; 8],
            prefix: [0; 155],
            pad: [0; 12],
        }
    }

    /// Builds the header describing the file at `path`.
    ///
    /// The file is inspected with `fs::metadata`, so symlinks are followed.
    /// The name stored in the header is `path` exactly as given, with a
    /// trailing `/` added for directories. Owner and group ids are turned
    /// into names through `identity`; an id without a name fails with
    /// `Error::LookupFailure` instead of producing a header with an empty
    /// name. The checksum is computed last.
    pub fn from_path<I>(path: &Path, identity: &I) -> Result<Header>
    where
        I: IdentityResolver + ?Sized,
    {
        let meta = fs::metadata(path).map_err(|source| Error::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        let encode = |source| Error::Encode {
            path: path.to_path_buf(),
            source,
        };

        let mut header = Header::new();
        if meta.is_file() {
            header.set_path(path).map_err(encode)?;
            header.set_size(meta.len()).map_err(encode)?;
        } else if meta.is_dir() {
            header.set_path(dir_name(path)).map_err(encode)?;
            header.set_size(0).map_err(encode)?;
            header.set_entry_type(EntryType::dir());
        } else {
            return Err(Error::Unsupported {
                path: path.to_path_buf(),
            });
        }
        header.fill_from(path, &meta, identity)?;
        header.set_cksum();
        Ok(header)
    }

    /// Decodes a block read at a header position.
    ///
    /// An all-zero block yields `Decoded::EndMarker`. Anything else must
    /// carry a matching checksum and the ustar magic.
    pub fn from_block(block: &[u8; BLOCK_SIZE]) -> std::result::Result<Decoded, FormatError> {
        if block.iter().all(|b| *b == 0) {
            return Ok(Decoded::EndMarker);
        }
        let mut header = Header::zeroed();
        header.as_mut_bytes().copy_from_slice(block);

        let stored = header.cksum()?;
        let computed = header.calculate_cksum();
        if stored != computed {
            return Err(FormatError::BadChecksum { stored, computed });
        }
        if !header.is_ustar() {
            return Err(FormatError::BadMagic);
        }
        Ok(Decoded::Header(header))
    }

    fn is_ustar(&self) -> bool {
        &self.magic[..5] == b"ustar"
    }

    /// Returns a view into this header as a byte array.
    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        // SAFETY: `Header` is `repr(C)`, made only of byte arrays and exactly
        // `BLOCK_SIZE` bytes long, so it has alignment 1 and no padding.
        unsafe { &*(self as *const Header as *const [u8; BLOCK_SIZE]) }
    }

    fn as_mut_bytes(&mut self) -> &mut [u8; BLOCK_SIZE] {
        // SAFETY: see `as_bytes`; every bit pattern is a valid `Header`.
        unsafe { &mut *(self as *mut Header as *mut [u8; BLOCK_SIZE]) }
    }

    /// Returns the file size this header represents.
    ///
    /// May return an error if the field is corrupted.
    pub fn size(&self) -> std::result::Result<u64, FormatError> {
        octal_from("size", &self.size)
    }

    /// Encodes the `size` argument into the size field of this header.
    pub fn set_size(&mut self, size: u64) -> std::result::Result<(), FormatError> {
        octal_into("size", &mut self.size, size)
    }

    /// Returns the path name stored in this header as a byte array.
    ///
    /// A non-empty ustar `prefix` field is joined to the name with a `/`.
    pub fn path_bytes(&self) -> Cow<'_, [u8]> {
        let prefix = truncate(&self.prefix);
        if !self.is_ustar() || prefix.is_empty() {
            Cow::Borrowed(truncate(&self.name))
        } else {
            let mut bytes = prefix.to_vec();
            bytes.push(b'/');
            bytes.extend_from_slice(truncate(&self.name));
            Cow::Owned(bytes)
        }
    }

    /// Returns the path name stored in this header.
    pub fn path(&self) -> Cow<'_, Path> {
        bytes2path(self.path_bytes())
    }

    /// Sets the path name for this header.
    ///
    /// Only the 100-byte `name` field is used; longer paths are rejected
    /// rather than split into the prefix field.
    pub fn set_path<P: AsRef<Path>>(&mut self, p: P) -> std::result::Result<(), FormatError> {
        let bytes = path2bytes(p.as_ref());
        copy_into("name", &mut self.name, &bytes)?;
        self.prefix = [0; 155];
        Ok(())
    }

    /// Returns the mode bits for this file.
    ///
    /// May return an error if the field is corrupted.
    pub fn mode(&self) -> std::result::Result<u32, FormatError> {
        octal_from("mode", &self.mode).map(|u| u as u32)
    }

    /// Encodes the `mode` provided into this header.
    ///
    /// Only the permission, setuid, setgid and sticky bits are kept.
    pub fn set_mode(&mut self, mode: u32) {
        // 0o7777 always fits in seven octal digits.
        let _ = octal_into("mode", &mut self.mode, u64::from(mode & 0o7777));
    }

    /// Returns the value of the owner's user ID field.
    pub fn uid(&self) -> std::result::Result<u32, FormatError> {
        octal_from("uid", &self.uid).map(|u| u as u32)
    }

    /// Encodes the `uid` provided into this header.
    pub fn set_uid(&mut self, uid: u32) -> std::result::Result<(), FormatError> {
        octal_into("uid", &mut self.uid, u64::from(uid))
    }

    /// Returns the value of the group's ID field.
    pub fn gid(&self) -> std::result::Result<u32, FormatError> {
        octal_from("gid", &self.gid).map(|u| u as u32)
    }

    /// Encodes the `gid` provided into this header.
    pub fn set_gid(&mut self, gid: u32) -> std::result::Result<(), FormatError> {
        octal_into("gid", &mut self.gid, u64::from(gid))
    }

    /// Returns the last modification time in Unix time format.
    pub fn mtime(&self) -> std::result::Result<u64, FormatError> {
        octal_from("mtime", &self.mtime)
    }

    /// Encodes the `mtime` provided into this header.
    ///
    /// Note that this time is typically a number of seconds passed since
    /// January 1, 1970.
    pub fn set_mtime(&mut self, mtime: u64) -> std::result::Result<(), FormatError> {
        octal_into("mtime", &mut self.mtime, mtime)
    }

    /// Return the username of the owner of this file, if valid utf8.
    pub fn username(&self) -> Option<&str> {
        std::str::from_utf8(truncate(&self.uname)).ok()
    }

    /// Sets the username inside this header.
    pub fn set_username(&mut self, name: &str) -> std::result::Result<(), FormatError> {
        copy_into("uname", &mut self.uname, name.as_bytes())
    }

    /// Return the group name of the owner of this file, if valid utf8.
    pub fn groupname(&self) -> Option<&str> {
        std::str::from_utf8(truncate(&self.gname)).ok()
    }

    /// Sets the group name inside this header.
    pub fn set_groupname(&mut self, name: &str) -> std::result::Result<(), FormatError> {
        copy_into("gname", &mut self.gname, name.as_bytes())
    }

    /// Returns the device major number.
    pub fn device_major(&self) -> std::result::Result<u32, FormatError> {
        octal_from("devmajor", &self.dev_major).map(|u| u as u32)
    }

    /// Encodes the value `major` into the dev_major field of this header.
    pub fn set_device_major(&mut self, major: u32) -> std::result::Result<(), FormatError> {
        octal_into("devmajor", &mut self.dev_major, u64::from(major))
    }

    /// Returns the device minor number.
    pub fn device_minor(&self) -> std::result::Result<u32, FormatError> {
        octal_from("devminor", &self.dev_minor).map(|u| u as u32)
    }

    /// Encodes the value `minor` into the dev_minor field of this header.
    pub fn set_device_minor(&mut self, minor: u32) -> std::result::Result<(), FormatError> {
        octal_into("devminor", &mut self.dev_minor, u64::from(minor))
    }

    /// Returns the type of file described by this header.
    pub fn entry_type(&self) -> EntryType {
        EntryType::new(self.typeflag[0])
    }

    /// Sets the type of file that will be described by this header.
    pub fn set_entry_type(&mut self, ty: EntryType) {
        self.typeflag = [ty.as_byte()];
    }

    /// Returns the checksum field of this header.
    ///
    /// May return an error if the field is corrupted.
    pub fn cksum(&self) -> std::result::Result<u32, FormatError> {
        octal_from("chksum", &self.cksum).map(|u| u as u32)
    }

    /// Computes the checksum of the current contents of this header.
    ///
    /// This is the unsigned sum of all 512 bytes with the checksum field
    /// itself counted as eight spaces.
    pub fn calculate_cksum(&self) -> u32 {
        let bytes = self.as_bytes();
        let sum: u32 = bytes[..CKSUM_RANGE.start]
            .iter()
            .chain(&bytes[CKSUM_RANGE.end..])
            .map(|b| u32::from(*b))
            .sum();
        sum + CKSUM_RANGE.len() as u32 * u32::from(b' ')
    }

    /// Sets the checksum field of this header based on the current fields in
    /// this header.
    pub fn set_cksum(&mut self) {
        let cksum = self.calculate_cksum();
        // The largest possible sum, 512 * 255, needs six octal digits.
        let _ = octal_into("chksum", &mut self.cksum, u64::from(cksum));
    }

    #[cfg(unix)]
    fn fill_from<I>(&mut self, path: &Path, meta: &fs::Metadata, identity: &I) -> Result<()>
    where
        I: IdentityResolver + ?Sized,
    {
        let encode = |source| Error::Encode {
            path: path.to_path_buf(),
            source,
        };
        self.set_mode(meta.mode());
        // Timestamps before the epoch cannot be expressed in an octal field.
        self.set_mtime(meta.mtime().max(0) as u64).map_err(encode)?;
        self.set_uid(meta.uid()).map_err(encode)?;
        self.set_gid(meta.gid()).map_err(encode)?;

        let uname = identity
            .user_name(meta.uid())
            .ok_or_else(|| Error::LookupFailure {
                path: path.to_path_buf(),
                kind: IdKind::User,
                id: meta.uid(),
            })?;
        self.set_username(&uname).map_err(encode)?;
        let gname = identity
            .group_name(meta.gid())
            .ok_or_else(|| Error::LookupFailure {
                path: path.to_path_buf(),
                kind: IdKind::Group,
                id: meta.gid(),
            })?;
        self.set_groupname(&gname).map_err(encode)?;

        let (major, minor) = device_numbers(meta.dev());
        self.set_device_major(major).map_err(encode)?;
        self.set_device_minor(minor).map_err(encode)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn fill_from<I>(&mut self, path: &Path, meta: &fs::Metadata, identity: &I) -> Result<()>
    where
        I: IdentityResolver + ?Sized,
    {
        use std::time::UNIX_EPOCH;

        let encode = |source| Error::Encode {
            path: path.to_path_buf(),
            source,
        };
        // There's no concept of a mode here, so do a best approximation.
        let mode = match (meta.is_dir(), meta.permissions().readonly()) {
            (true, false) => 0o755,
            (true, true) => 0o555,
            (false, false) => 0o644,
            (false, true) => 0o444,
        };
        self.set_mode(mode);
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.set_mtime(mtime).map_err(encode)?;
        self.set_uid(0).map_err(encode)?;
        self.set_gid(0).map_err(encode)?;
        let uname = identity.user_name(0).ok_or_else(|| Error::LookupFailure {
            path: path.to_path_buf(),
            kind: IdKind::User,
            id: 0,
        })?;
        self.set_username(&uname).map_err(encode)?;
        let gname = identity.group_name(0).ok_or_else(|| Error::LookupFailure {
            path: path.to_path_buf(),
            kind: IdKind::Group,
            id: 0,
        })?;
        self.set_groupname(&gname).map_err(encode)?;
        self.set_device_major(0).map_err(encode)?;
        self.set_device_minor(0).map_err(encode)?;
        Ok(())
    }
}

impl Default for Header {
    fn default() -> Header {
        Header::new()
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("path", &self.path())
            .field("mode", &self.mode())
            .field("uid", &self.uid())
            .field("gid", &self.gid())
            .field("size", &self.size())
            .field("mtime", &self.mtime())
            .field("cksum", &self.cksum())
            .field("entry_type", &self.entry_type())
            .field("username", &self.username())
            .field("groupname", &self.groupname())
            .finish()
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[allow(unused_unsafe)] // `major`/`minor` are safe fns in newer libc releases
fn device_numbers(dev: u64) -> (u32, u32) {
    let dev = dev as libc::dev_t;
    unsafe { (libc::major(dev) as u32, libc::minor(dev) as u32) }
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn device_numbers(_dev: u64) -> (u32, u32) {
    (0, 0)
}

fn dir_name(path: &Path) -> PathBuf {
    let mut bytes = path2bytes(path).into_owned();
    if bytes.last() != Some(&b'/') {
        bytes.push(b'/');
    }
    bytes2path(Cow::Owned(bytes)).into_owned()
}

fn octal_from(field: &'static str, slice: &[u8]) -> std::result::Result<u64, FormatError> {
    let digits = trim_spaces(truncate(slice));
    digits.iter().try_fold(0u64, |acc, b| match b {
        b'0'..=b'7' => acc
            .checked_mul(8)
            .map(|acc| acc + u64::from(b - b'0'))
            .ok_or(FormatError::InvalidNumber { field }),
        _ => Err(FormatError::InvalidNumber { field }),
    })
}

/// Writes `val` as zero-padded octal filling all but the last byte of `dst`,
/// which becomes the NUL terminator.
fn octal_into(field: &'static str, dst: &mut [u8], val: u64) -> std::result::Result<(), FormatError> {
    let width = dst.len() - 1;
    let o = format!("{:0width$o}", val, width = width);
    if o.len() > width {
        return Err(FormatError::ValueTooLarge { field, value: val });
    }
    dst[..width].copy_from_slice(o.as_bytes());
    dst[width] = 0;
    Ok(())
}

fn truncate(slice: &[u8]) -> &[u8] {
    match slice.iter().position(|i| *i == 0) {
        Some(i) => &slice[..i],
        None => slice,
    }
}

fn trim_spaces(mut slice: &[u8]) -> &[u8] {
    while let [b' ', rest @ ..] = slice {
        slice = rest;
    }
    while let [rest @ .., b' '] = slice {
        slice = rest;
    }
    slice
}

/// Copies `bytes` into the `slot` provided, NUL-padding the remainder and
/// returning an error if the `bytes` array is too long or if it contains any
/// nul bytes.
fn copy_into(field: &'static str, slot: &mut [u8], bytes: &[u8]) -> std::result::Result<(), FormatError> {
    if bytes.len() > slot.len() {
        Err(FormatError::TooLong {
            field,
            len: bytes.len(),
        })
    } else if bytes.contains(&0) {
        Err(FormatError::NulByte { field })
    } else {
        slot.fill(0);
        slot[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(unix)]
fn path2bytes(p: &Path) -> Cow<'_, [u8]> {
    Cow::Borrowed(p.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path2bytes(p: &Path) -> Cow<'_, [u8]> {
    match p.as_os_str().to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

#[cfg(unix)]
fn bytes2path(bytes: Cow<'_, [u8]>) -> Cow<'_, Path> {
    use std::ffi::{OsStr, OsString};

    match bytes {
        Cow::Borrowed(bytes) => Cow::Borrowed(Path::new(OsStr::from_bytes(bytes))),
        Cow::Owned(bytes) => Cow::Owned(PathBuf::from(OsString::from_vec(bytes))),
    }
}

#[cfg(not(unix))]
fn bytes2path(bytes: Cow<'_, [u8]>) -> Cow<'_, Path> {
    Cow::Owned(PathBuf::from(String::from_utf8_lossy(&bytes).into_owned()))
}
