// See https://en.wikipedia.org/wiki/Tar_%28computing%29#UStar_format
/// Indicate for the type of file described by a header.
///
/// Each `Header` has an `entry_type` method returning an instance of this type
/// which can be used to inspect what the header is describing. Only regular
/// files and directories are written by this crate; the remaining ustar
/// types are recognized on read so they can be skipped.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntryType {
    /// Regular file
    Regular,
    /// Hard link
    Link,
    /// Symbolic link
    Symlink,
    /// Character device
    Char,
    /// Block device
    Block,
    /// Directory
    Directory,
    /// Named pipe (fifo)
    Fifo,
    /// Any other typeflag byte.
    Other(u8),
}

impl EntryType {
    /// Creates a new entry type from a raw byte.
    ///
    /// Note that the other named constructors of entry type may be more
    /// appropriate to create a file type from.
    pub fn new(byte: u8) -> EntryType {
        match byte {
            b'\x00' | b'0' | b'7' => EntryType::Regular,
            b'1' => EntryType::Link,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::Char,
            b'4' => EntryType::Block,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b => EntryType::Other(b),
        }
    }

    /// Returns the raw underlying byte that this entry type represents.
    ///
    /// Regular files always encode as `'0'`, even if they were decoded from
    /// the old-style NUL byte or the contiguous-file `'7'`.
    pub fn as_byte(&self) -> u8 {
        match *self {
            EntryType::Regular => b'0',
            EntryType::Link => b'1',
            EntryType::Symlink => b'2',
            EntryType::Char => b'3',
            EntryType::Block => b'4',
            EntryType::Directory => b'5',
            EntryType::Fifo => b'6',
            EntryType::Other(b) => b,
        }
    }

    /// Creates a new entry type representing a regular file.
    pub fn file() -> EntryType {
        EntryType::Regular
    }

    /// Creates a new entry type representing a directory.
    pub fn dir() -> EntryType {
        EntryType::Directory
    }

    /// Returns whether this type represents a regular file.
    pub fn is_file(&self) -> bool {
        self == &EntryType::Regular
    }

    /// Returns whether this type represents a directory.
    pub fn is_dir(&self) -> bool {
        self == &EntryType::Directory
    }

    /// Returns whether this is a link or special file, none of which are
    /// restored on extraction.
    pub fn is_special(&self) -> bool {
        matches!(
            *self,
            EntryType::Link
                | EntryType::Symlink
                | EntryType::Char
                | EntryType::Block
                | EntryType::Fifo
        )
    }
}

#[cfg(test)]
mod tests {
    use super::EntryType;

    #[test]
    fn regular_aliases() {
        assert!(EntryType::new(0).is_file());
        assert!(EntryType::new(b'0').is_file());
        assert!(EntryType::new(b'7').is_file());
        assert_eq!(EntryType::new(0).as_byte(), b'0');
    }

    #[test]
    fn unknown_is_not_special() {
        let ty = EntryType::new(b'x');
        assert_eq!(ty, EntryType::Other(b'x'));
        assert!(!ty.is_special());
        assert!(!ty.is_file());
        assert!(EntryType::new(b'2').is_special());
        assert!(EntryType::dir().is_dir());
    }
}
