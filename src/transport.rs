//! Page-granular positional I/O against the backing file, with the
//! transient-failure retry policy from spec.md §4.3.
//!
//! Grounded on the teacher's `storage::DiskManager`, which reads/writes
//! fixed-size pages through `std::os::unix::fs::FileExt::{read_at,
//! write_at}` rather than a stateful `seek` + `read`/`write` pair — the
//! same positional-I/O substitution this crate makes for spec.md's
//! seek-then-read/write transport, noted as a REDESIGN FLAG in
//! SPEC_FULL.md rather than applied silently.

use std::fs::File;
use std::io::{self, ErrorKind};
use std::os::unix::fs::FileExt;

use crate::error::{PagedFileError, Result};
use crate::geometry::{Geometry, PageNo};
use crate::header::{FILE_HEADER_SZ, FileHeader};

const RETRY_COUNT: u32 = 3;

fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Reads exactly `buf.len()` bytes starting at `offset`, retrying up to
/// [`RETRY_COUNT`] times on a transient error. A non-transient error is
/// returned immediately. Short reads (legitimate EOF partway through) are
/// reported as `Ok(0)` — the caller treats this as "page not present",
/// never as a partial/corrupt page.
fn read_exact_at_retrying(file: &File, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let mut read_sz = 0usize;
    while read_sz < buf.len() {
        let mut retries = RETRY_COUNT;
        loop {
            match file.read_at(&mut buf[read_sz..], offset + read_sz as u64) {
                Ok(0) => return Ok(0),
                Ok(n) => {
                    read_sz += n;
                    break;
                }
                Err(e) if is_transient(&e) && retries > 0 => {
                    retries -= 1;
                    continue;
                }
                Err(e) if is_transient(&e) => {
                    // retries exhausted on a transient failure: legitimate EOF-like short read
                    log::warn!("transient read error at offset {offset} survived {RETRY_COUNT} retries: {e}");
                    return Ok(0);
                }
                Err(e) => return Err(PagedFileError::Io(e)),
            }
        }
    }
    Ok(read_sz)
}

fn write_exact_at_retrying(file: &File, offset: u64, buf: &[u8]) -> Result<()> {
    let mut write_sz = 0usize;
    while write_sz < buf.len() {
        let mut retries = RETRY_COUNT;
        loop {
            match file.write_at(&buf[write_sz..], offset + write_sz as u64) {
                Ok(0) => {
                    return Err(PagedFileError::Io(io::Error::new(
                        ErrorKind::WriteZero,
                        "write_at wrote zero bytes",
                    )));
                }
                Ok(n) => {
                    write_sz += n;
                    break;
                }
                Err(e) if is_transient(&e) && retries > 0 => {
                    retries -= 1;
                    continue;
                }
                Err(e) => return Err(PagedFileError::Io(e)),
            }
        }
    }
    Ok(())
}

/// Reads the raw (IV ‖ ciphertext) bytes of page `pgno` into `buf`
/// (`buf.len()` must equal `geometry.page_sz`). Returns the number of
/// bytes actually read: `geometry.page_sz` on success, `0` on EOF/short
/// read (the page does not exist on disk yet).
pub fn read_page(file: &File, geometry: &Geometry, pgno: PageNo, buf: &mut [u8]) -> Result<usize> {
    debug_assert_eq!(buf.len(), geometry.page_sz as usize);
    read_exact_at_retrying(file, geometry.phys(pgno), buf)
}

/// Writes the raw (IV ‖ ciphertext) bytes of page `pgno`. All-or-nothing:
/// a failure after retries leaves the page corrupted on disk and is
/// surfaced as `Err`.
pub fn write_page(file: &File, geometry: &Geometry, pgno: PageNo, buf: &[u8]) -> Result<()> {
    debug_assert_eq!(buf.len(), geometry.page_sz as usize);
    write_exact_at_retrying(file, geometry.phys(pgno), buf)
}

/// Reads and validates the whole-file header at offset 0.
///
/// `Ok(None)` means the file is empty (no header written yet — not an
/// error). `Err(HeaderMismatch)` means the file exists but carries a
/// foreign magic; the caller must not proceed to write into it.
pub fn read_file_header(file: &File) -> Result<Option<FileHeader>> {
    let mut buf = [0u8; FILE_HEADER_SZ];
    let read = read_exact_at_retrying(file, 0, &mut buf)?;
    if read == 0 {
        return Ok(None);
    }
    if read < FILE_HEADER_SZ {
        // a short read here means a foreign or truncated file, not "empty"
        return Err(PagedFileError::HeaderMismatch);
    }
    FileHeader::from_bytes(&buf).map(Some)
}

/// Writes a freshly-constructed file header at offset 0. Invoked lazily,
/// exactly once, the first time a write finds no existing header.
pub fn write_file_header(file: &File, header: FileHeader) -> Result<()> {
    write_exact_at_retrying(file, 0, &header.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::CIPHER_ID_AES_256_CBC;
    use std::fs::OpenOptions;

    fn temp_file() -> (tempfile::TempDir, File) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paged.bin");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();
        (dir, file)
    }

    fn geo() -> Geometry {
        Geometry::new(512, 16, 16, 8).unwrap()
    }

    #[test]
    fn reading_a_page_past_eof_returns_zero() {
        let (_dir, file) = temp_file();
        let geo = geo();
        let mut buf = vec![0u8; geo.page_sz as usize];
        let n = read_page(&file, &geo, 0, &mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn write_then_read_page_round_trips() {
        let (_dir, file) = temp_file();
        let geo = geo();
        let page = vec![0x5Au8; geo.page_sz as usize];
        write_page(&file, &geo, 2, &page).unwrap();

        let mut buf = vec![0u8; geo.page_sz as usize];
        let n = read_page(&file, &geo, 2, &mut buf).unwrap();
        assert_eq!(n, geo.page_sz as usize);
        assert_eq!(buf, page);

        // page 0 was never explicitly written, but writing page 2 extended
        // the file past it, leaving a sparse hole. A positional read that
        // falls entirely within the file's new bounds reads that hole as a
        // full, successful read of zero bytes — not a short read. Turning
        // that all-zero page into "empty" is `decode_page`'s magic-mismatch
        // check, one layer up, not this layer's job.
        let mut other = vec![0u8; geo.page_sz as usize];
        let n = read_page(&file, &geo, 0, &mut other).unwrap();
        assert_eq!(n, geo.page_sz as usize);
        assert!(other.iter().all(|&b| b == 0));
    }

    #[test]
    fn file_header_round_trips_through_the_file() {
        let (_dir, file) = temp_file();
        assert!(read_file_header(&file).unwrap().is_none());

        let header = FileHeader::new(512, CIPHER_ID_AES_256_CBC);
        write_file_header(&file, header).unwrap();

        let read_back = read_file_header(&file).unwrap().unwrap();
        assert_eq!(read_back, header);
    }

    #[test]
    fn foreign_header_is_rejected() {
        let (_dir, file) = temp_file();
        file.write_at(&[0xFFu8; FILE_HEADER_SZ], 0).unwrap();
        assert!(matches!(
            read_file_header(&file),
            Err(PagedFileError::HeaderMismatch)
        ));
    }
}
