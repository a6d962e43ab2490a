#![no_main]

use libfuzzer_sys::fuzz_target;

use std::io::{Cursor, Read};

use minitar::{Archive, Decoded, Header, BLOCK_SIZE};
use tempfile::tempdir;

fuzz_target!(|data: &[u8]| {
    // Any block must decode to a header, an end marker or a format error.
    if let Some(block) = data.get(..BLOCK_SIZE) {
        let block: &[u8; BLOCK_SIZE] = block.try_into().unwrap();
        if let Ok(Decoded::Header(header)) = Header::from_block(block) {
            assert_eq!(header.as_bytes(), block);
            let _ = header.size();
            let _ = header.mtime();
        }
    }

    // Walk the archive reading every payload, twice.
    let mut archive = Archive::new(Cursor::new(data));
    for _ in 0..2 {
        let entries = match archive.entries() {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(_) => break,
            };
            let mut buf = Vec::new();
            if entry.read_to_end(&mut buf).is_ok() {
                assert_eq!(buf.len() as u64, entry.size());
            }
        }
    }

    // Extraction must stay inside the destination.
    let dst = tempdir().unwrap();
    let _ = Archive::new(Cursor::new(data)).unpack(dst.path().join("out"));
});
