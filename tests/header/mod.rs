use std::path::Path;

use minitar::{Decoded, EntryType, FormatError, Header};

fn decode(header: &Header) -> Result<Header, FormatError> {
    match Header::from_block(header.as_bytes())? {
        Decoded::Header(h) => Ok(h),
        Decoded::EndMarker => panic!("decoded an end marker"),
    }
}

#[test]
fn default_magic() {
    let h = Header::new();
    assert_eq!(&h.magic, b"ustar\0");
    assert_eq!(&h.version, b"00");
    assert_eq!(h.entry_type(), EntryType::Regular);
    assert_eq!(t!(h.size()), 0);
}

#[test]
fn goto_checksum() {
    let mut h = Header::new();
    t!(h.set_path("a.txt"));
    t!(h.set_size(5));
    h.set_cksum();

    let bytes = h.as_bytes();
    assert_eq!(bytes[155], 0);
    let sum = bytes
        .iter()
        .enumerate()
        .map(|(i, b)| if (148..156).contains(&i) { 32 } else { u32::from(*b) })
        .sum::<u32>();
    assert_eq!(t!(h.cksum()), sum);
    assert_eq!(h.calculate_cksum(), sum);
    assert_eq!(&bytes[148..155], format!("{:07o}", sum).as_bytes());
}

#[test]
fn decode_what_was_encoded() {
    let mut h = Header::new();
    t!(h.set_path("dir/file"));
    t!(h.set_size(1234));
    h.set_mode(0o640);
    t!(h.set_uid(1000));
    t!(h.set_gid(100));
    t!(h.set_mtime(1_700_000_000));
    t!(h.set_username("alice"));
    t!(h.set_groupname("staff"));
    t!(h.set_device_major(8));
    t!(h.set_device_minor(1));
    h.set_cksum();

    let d = t!(decode(&h));
    assert_eq!(d, h);
    assert_eq!(d.path(), Path::new("dir/file"));
    assert_eq!(t!(d.size()), 1234);
    assert_eq!(t!(d.mode()), 0o640);
    assert_eq!(t!(d.uid()), 1000);
    assert_eq!(t!(d.gid()), 100);
    assert_eq!(t!(d.mtime()), 1_700_000_000);
    assert_eq!(d.username(), Some("alice"));
    assert_eq!(d.groupname(), Some("staff"));
    assert_eq!(t!(d.device_major()), 8);
    assert_eq!(t!(d.device_minor()), 1);
}

#[test]
fn zero_block_is_end_marker() {
    let block = [0u8; 512];
    assert!(matches!(Header::from_block(&block), Ok(Decoded::EndMarker)));
}

#[test]
fn checksum_mismatch() {
    let mut h = Header::new();
    t!(h.set_path("a"));
    h.set_cksum();
    h.name[0] = b'b';
    match decode(&h) {
        Err(FormatError::BadChecksum { stored, computed }) => assert_eq!(stored + 1, computed),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn bad_magic() {
    let mut h = Header::new();
    t!(h.set_path("a"));
    h.magic = *b"gnutar";
    h.set_cksum();
    assert_eq!(decode(&h), Err(FormatError::BadMagic));
}

#[test]
fn space_terminated_checksum() {
    // Some writers store the checksum as six digits, a NUL and a space.
    let mut h = Header::new();
    t!(h.set_path("a"));
    let sum = h.calculate_cksum();
    h.cksum = [0; 8];
    h.cksum[..6].copy_from_slice(format!("{:06o}", sum).as_bytes());
    h.cksum[7] = b' ';
    assert_eq!(t!(h.cksum()), sum);
    assert!(decode(&h).is_ok());
}

#[test]
fn path_too_long() {
    let mut h = Header::new();
    t!(h.set_path("x".repeat(100)));
    assert_eq!(h.path_bytes().len(), 100);
    assert_eq!(
        h.set_path("x".repeat(101)),
        Err(FormatError::TooLong {
            field: "name",
            len: 101
        })
    );
}

#[test]
fn prefix_is_joined() {
    let mut h = Header::new();
    t!(h.set_path("file"));
    h.prefix[..3].copy_from_slice(b"dir");
    assert_eq!(&*h.path_bytes(), b"dir/file");
    // Writing a path clears the prefix again.
    t!(h.set_path("other"));
    assert_eq!(&*h.path_bytes(), b"other");
}

#[test]
fn names_fit_their_fields() {
    let mut h = Header::new();
    t!(h.set_username(&"u".repeat(32)));
    assert_eq!(h.username().map(str::len), Some(32));
    assert!(matches!(
        h.set_username(&"u".repeat(33)),
        Err(FormatError::TooLong { field: "uname", .. })
    ));
    assert!(matches!(
        h.set_groupname(&"g".repeat(33)),
        Err(FormatError::TooLong { field: "gname", .. })
    ));
}

#[test]
fn numeric_limits() {
    let mut h = Header::new();
    t!(h.set_size(0o77777777777));
    assert_eq!(t!(h.size()), 0o77777777777);
    assert_eq!(
        h.set_size(0o100000000000),
        Err(FormatError::ValueTooLarge {
            field: "size",
            value: 0o100000000000
        })
    );
    t!(h.set_uid(0o7777777));
    assert!(matches!(
        h.set_uid(0o10000000),
        Err(FormatError::ValueTooLarge { field: "uid", .. })
    ));
}

#[test]
fn mode_keeps_permission_bits() {
    let mut h = Header::new();
    h.set_mode(0o100644);
    assert_eq!(t!(h.mode()), 0o644);
    assert_eq!(&h.mode, b"0000644\0");
    h.set_mode(0o4755);
    assert_eq!(t!(h.mode()), 0o4755);
}

#[test]
fn invalid_octal() {
    let mut h = Header::new();
    h.size = *b"0000000009a\0";
    assert!(matches!(
        h.size(),
        Err(FormatError::InvalidNumber { field: "size" })
    ));
    h.mtime = *b"  1234567  \0";
    assert_eq!(t!(h.mtime()), 0o1234567);
}

#[test]
fn entry_types() {
    let mut h = Header::new();
    h.set_entry_type(EntryType::dir());
    assert!(h.entry_type().is_dir());
    assert_eq!(h.typeflag, [b'5']);
    h.typeflag = [0];
    assert!(h.entry_type().is_file());
    h.typeflag = [b'2'];
    assert_eq!(h.entry_type(), EntryType::Symlink);
}
