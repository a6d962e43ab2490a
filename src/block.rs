//! Block-level I/O: every read and write of an archive is a whole number of
//! 512-byte blocks.

use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::path::Path;

/// Size of one archive block.
pub const BLOCK_SIZE: usize = 512;

/// Size of the end-of-archive marker: two zero blocks.
pub const END_MARKER_SIZE: u64 = 2 * BLOCK_SIZE as u64;

/// Rounds `size` up to the next multiple of the block size.
pub fn padded_size(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

/// Reads one block.
///
/// Returns `Ok(None)` when the stream is already exhausted. A stream ending
/// partway through a block is an `UnexpectedEof` error; callers treat that
/// as a damaged archive, never as a normal end.
pub fn read_block<R: Read + ?Sized>(src: &mut R) -> io::Result<Option<[u8; BLOCK_SIZE]>> {
    let mut block = [0u8; BLOCK_SIZE];
    match fill(src, &mut block)? {
        0 => Ok(None),
        BLOCK_SIZE => Ok(Some(block)),
        n => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("archive ends after {} bytes of a {} byte block", n, BLOCK_SIZE),
        )),
    }
}

/// Writes one block.
pub fn write_block<W: Write + ?Sized>(dst: &mut W, block: &[u8; BLOCK_SIZE]) -> io::Result<()> {
    dst.write_all(block)
}

/// Copies all of `src` into `dst` one block at a time, zero-padding the final
/// partial block.
///
/// Returns the number of payload bytes copied, not counting padding.
pub fn write_payload<W, R>(dst: &mut W, src: &mut R) -> io::Result<u64>
where
    W: Write + ?Sized,
    R: Read + ?Sized,
{
    let mut block = [0u8; BLOCK_SIZE];
    let mut total = 0;
    loop {
        let n = fill(src, &mut block)?;
        if n == 0 {
            break;
        }
        block[n..].fill(0);
        write_block(dst, &block)?;
        total += n as u64;
        if n < BLOCK_SIZE {
            break;
        }
    }
    Ok(total)
}

/// Writes the end-of-archive marker.
pub fn write_end_markers<W: Write + ?Sized>(dst: &mut W) -> io::Result<()> {
    let zero = [0u8; BLOCK_SIZE];
    write_block(dst, &zero)?;
    write_block(dst, &zero)
}

/// Truncates the file at `path` to `end`, the offset of the first block of
/// its end-of-archive marker.
///
/// Everything from the marker on is dropped, including any zero padding a
/// writer added after it. The handle used for the truncation is closed
/// before this returns; the caller must not hold any other handle on `path`
/// while calling it.
pub fn strip_end_markers(path: &Path, end: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    if end > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("end-of-archive offset {} is past the end of the file ({} bytes)", end, len),
        ));
    }
    file.set_len(end)?;
    file.sync_all()
}

/// Reads until `buf` is full or the stream ends, returning the byte count.
fn fill<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match src.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::{self, Cursor, Read};

    use super::*;

    /// Hands out at most `chunk` bytes per read call.
    struct Dribble<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Dribble<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn padded_sizes() {
        assert_eq!(padded_size(0), 0);
        assert_eq!(padded_size(1), 512);
        assert_eq!(padded_size(512), 512);
        assert_eq!(padded_size(600), 1024);
    }

    #[test]
    fn payload_is_block_aligned_and_zero_padded() {
        for &len in &[0usize, 1, 5, 511, 512, 513, 600, 1024, 1500] {
            let data = vec![0xa5u8; len];
            let mut out = Vec::new();
            let copied = write_payload(&mut out, &mut Dribble { data: &data, chunk: 7 }).unwrap();
            assert_eq!(copied, len as u64);
            assert_eq!(out.len() as u64, padded_size(len as u64));
            assert_eq!(&out[..len], &data[..]);
            assert!(out[len..].iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn short_block_is_an_error() {
        let mut src = Cursor::new(vec![1u8; 700]);
        assert!(read_block(&mut src).unwrap().is_some());
        let err = read_block(&mut src).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn exhausted_stream_is_none() {
        let mut src = Cursor::new(Vec::new());
        assert!(read_block(&mut src).unwrap().is_none());
    }

    #[test]
    fn end_markers() {
        let mut out = vec![7u8; 512];
        write_end_markers(&mut out).unwrap();
        assert_eq!(out.len(), 1536);
        assert!(out[512..].iter().all(|b| *b == 0));
    }

    #[test]
    fn strip_drops_padding_after_marker() {
        let td = tempfile::tempdir().unwrap();
        let padded = td.path().join("padded");
        let mut data = vec![1u8; 512];
        data.resize(10 * 512, 0);
        fs::write(&padded, &data).unwrap();
        strip_end_markers(&padded, 512).unwrap();
        assert_eq!(fs::read(&padded).unwrap(), vec![1u8; 512]);

        let err = strip_end_markers(&padded, 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(fs::metadata(&padded).unwrap().len(), 512);
    }
}
