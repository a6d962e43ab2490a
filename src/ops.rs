//! Whole-archive operations on archive files: create, append, list,
//! update and extract.
//!
//! Each operation holds at most one handle on the archive at a time. None
//! of them is atomic: an operation that fails after it started writing
//! leaves the partial archive on disk, and deciding what to do with it is
//! up to the caller (writing to a temporary path and renaming on success
//! gives all-or-nothing behaviour).

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom};
use std::path::Path;

use log::info;

use crate::block;
use crate::error::{Error, FormatError, Result};
use crate::identity::IdentityResolver;
use crate::{Archive, Builder, Header};

/// Creates `archive` holding `files`, replacing any existing file there.
///
/// Every input is inspected before the archive is opened, so a missing or
/// unreadable input fails without touching an existing archive.
pub fn create<P, Q, I>(archive: P, files: &[Q], identity: &I) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    I: IdentityResolver + ?Sized,
{
    let archive = archive.as_ref();
    let headers = encode_all(files, identity)?;
    let file = File::create(archive).map_err(|e| {
        Error::io(format!("failed to create archive `{}`", archive.display()), e)
    })?;
    write_entries(file, files, &headers)?;
    info!(
        "created `{}` with {} entries",
        archive.display(),
        headers.len()
    );
    Ok(())
}

/// Adds `files` to the end of the existing `archive`.
///
/// The archive must exist and be readable up to its end-of-archive marker.
/// The marker and anything after it (such as the zero padding some writers
/// add) are stripped, the new entries are written where the marker was, and
/// a new marker is written after them.
pub fn append<P, Q, I>(archive: P, files: &[Q], identity: &I) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    I: IdentityResolver + ?Sized,
{
    let archive = archive.as_ref();
    let end = end_marker_offset(archive)?;
    let headers = encode_all(files, identity)?;

    block::strip_end_markers(archive, end).map_err(|e| {
        Error::io(format!("failed to truncate `{}`", archive.display()), e)
    })?;
    let mut file = OpenOptions::new()
        .write(true)
        .open(archive)
        .map_err(|e| Error::io(format!("failed to open `{}` for writing", archive.display()), e))?;
    file.seek(SeekFrom::End(0))
        .map_err(|e| Error::io(format!("failed to seek within `{}`", archive.display()), e))?;
    write_entries(file, files, &headers)?;
    info!(
        "appended {} entries to `{}`",
        headers.len(),
        archive.display()
    );
    Ok(())
}

/// Returns the name of every entry in `archive`, in archive order.
///
/// Names appear once per entry, so a file appended more than once is listed
/// more than once. Use `Archive::entries` to walk the archive lazily.
pub fn list<P: AsRef<Path>>(archive: P) -> Result<Vec<String>> {
    let mut ar = open(archive.as_ref())?;
    let mut names = Vec::new();
    for entry in ar.entries()? {
        let entry = entry?;
        names.push(String::from_utf8_lossy(&entry.path_bytes()).into_owned());
    }
    Ok(names)
}

/// Re-adds `files` to `archive`, each of which must already be in it.
///
/// The previous copies stay where they are; readers take the last entry
/// with a given name. Names are compared without leading `./` and trailing
/// `/`, so `./a` matches a stored `a`. If any file is not yet in the archive,
/// nothing is written and `Error::NotInArchive` names the first such file.
pub fn update<P, Q, I>(archive: P, files: &[Q], identity: &I) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    I: IdentityResolver + ?Sized,
{
    let archive = archive.as_ref();
    let present = list(archive)?;
    let present = present
        .iter()
        .map(|name| normalize_name(name))
        .collect::<HashSet<_>>();
    for file in files {
        let name = file.as_ref().to_string_lossy();
        if !present.contains(normalize_name(&name)) {
            return Err(Error::NotInArchive {
                name: name.into_owned(),
            });
        }
    }
    append(archive, files, identity)
}

/// Extracts every entry of `archive` below the directory `dst`.
///
/// Extraction stops at the first entry that cannot be written; entries
/// extracted before it are left in place.
pub fn extract<P, Q>(archive: P, dst: Q) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let archive = archive.as_ref();
    let dst = dst.as_ref();
    open(archive)?.unpack(dst)?;
    info!(
        "extracted `{}` into `{}`",
        archive.display(),
        dst.display()
    );
    Ok(())
}

fn open(archive: &Path) -> Result<Archive<BufReader<File>>> {
    let file = open_existing(archive)?;
    Ok(Archive::new(BufReader::new(file)))
}

fn open_existing(archive: &Path) -> Result<File> {
    File::open(archive).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::ArchiveNotFound {
            path: archive.to_path_buf(),
        },
        _ => Error::io(format!("failed to open `{}`", archive.display()), e),
    })
}

/// Walks the whole archive and returns the offset of its end-of-archive
/// marker. The handle is closed again before this returns.
fn end_marker_offset(archive: &Path) -> Result<u64> {
    let mut ar = open(archive)?;
    let mut entries = ar.entries()?;
    for entry in entries.by_ref() {
        entry?;
    }
    if let Some(end) = entries.end_of_archive() {
        return Ok(end);
    }
    let len = fs::metadata(archive)
        .map_err(|e| Error::io(format!("failed to stat `{}`", archive.display()), e))?
        .len();
    Err(Error::CorruptArchive {
        offset: len,
        source: FormatError::MissingEndMarker,
    })
}

/// Strips leading `./` components and trailing slashes.
fn normalize_name(mut name: &str) -> &str {
    while let Some(rest) = name.strip_prefix("./") {
        name = rest.trim_start_matches('/');
    }
    name.trim_end_matches('/')
}

fn encode_all<Q, I>(files: &[Q], identity: &I) -> Result<Vec<Header>>
where
    Q: AsRef<Path>,
    I: IdentityResolver + ?Sized,
{
    files
        .iter()
        .map(|path| Header::from_path(path.as_ref(), identity))
        .collect()
}

fn write_entries<Q: AsRef<Path>>(file: File, files: &[Q], headers: &[Header]) -> Result<()> {
    let mut builder = Builder::new(BufWriter::new(file));
    for (path, header) in files.iter().zip(headers) {
        builder.append_file(path, header)?;
    }
    let out = builder.into_inner()?;
    let file = out
        .into_inner()
        .map_err(|e| Error::io("failed to flush archive", e.into_error()))?;
    file.sync_all()
        .map_err(|e| Error::io("failed to sync archive", e))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    struct Names;

    impl IdentityResolver for Names {
        fn user_name(&self, _uid: u32) -> Option<String> {
            Some("alice".to_string())
        }

        fn group_name(&self, _gid: u32) -> Option<String> {
            Some("staff".to_string())
        }
    }

    #[test]
    fn missing_input_leaves_existing_archive_alone() {
        let td = tempfile::tempdir().unwrap();
        let ar = td.path().join("ar.tar");
        fs::write(&ar, b"precious").unwrap();

        let err = create(&ar, &[td.path().join("nope")], &Names).unwrap_err();
        assert!(matches!(err, Error::Stat { .. }), "{:?}", err);
        assert_eq!(fs::read(&ar).unwrap(), b"precious");
    }

    #[test]
    fn append_rejects_unreadable_archive() {
        let td = tempfile::tempdir().unwrap();
        let ar = td.path().join("ar.tar");
        fs::write(&ar, vec![1u8; 2048]).unwrap();
        let input = td.path().join("a");
        fs::write(&input, b"a").unwrap();

        let err = append(&ar, &[&input], &Names).unwrap_err();
        match err {
            Error::CorruptArchive { offset, source } => {
                assert_eq!(offset, 0);
                assert!(matches!(source, FormatError::BadChecksum { .. }));
            }
            e => panic!("unexpected error {:?}", e),
        }
        assert_eq!(fs::read(&ar).unwrap(), vec![1u8; 2048]);
    }

    #[test]
    fn append_requires_footer() {
        let td = tempfile::tempdir().unwrap();
        let ar = td.path().join("ar.tar");
        let input = td.path().join("a");
        fs::write(&input, b"a").unwrap();
        create(&ar, &[&input], &Names).unwrap();

        // Keep the entry, drop one or both blocks of the marker.
        for len in [1024u64, 1536] {
            let file = OpenOptions::new().write(true).open(&ar).unwrap();
            file.set_len(len).unwrap();
            drop(file);

            let err = append(&ar, &[&input], &Names).unwrap_err();
            match err {
                Error::CorruptArchive { offset, source } => {
                    assert_eq!(offset, len);
                    assert_eq!(source, FormatError::MissingEndMarker);
                }
                e => panic!("unexpected error {:?}", e),
            }
            assert_eq!(fs::metadata(&ar).unwrap().len(), len);
        }
    }

    #[test]
    fn names_compare_without_dot_prefix() {
        assert_eq!(normalize_name("a"), "a");
        assert_eq!(normalize_name("./a"), "a");
        assert_eq!(normalize_name(".//./d/"), "d");
        assert_eq!(normalize_name("d/./e"), "d/./e");
        assert_eq!(normalize_name("../a"), "../a");
    }
}
