//! The range-oriented front door: [`PagedFile`] turns the page-at-a-time
//! codec and transport layers into the POSIX-like read/write/seek/truncate
//! surface described in SPEC_FULL.md §4.4.
//!
//! Grounded on the teacher's `storage::BufferPool`, which is the analogous
//! "owns the scratch buffers, drives the lower layers, exposes a range API"
//! component one layer up from `DiskManager`.

use std::fs::File;
use std::io::{self, SeekFrom};

use zeroize::{Zeroize, Zeroizing};

use crate::cipher::{Aes256Cbc, PageCipher};
use crate::codec::{decode_page, encode_page};
use crate::error::{PagedFileError, Result};
use crate::geometry::Geometry;
use crate::header::{FileHeader, PAGE_HEADER_RECORD_SZ};
use crate::transport;

/// How a [`PagedFile`] was opened. Held verbatim and handed back through
/// [`PagedFile::flags`]; the engine itself never branches on it — per
/// spec.md, enforcing read-only access is the host application's job, not
/// this layer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlags {
    ReadOnly,
    ReadWrite,
}

/// A random-access file whose contents are transparently paged and
/// encrypted on disk. The logical (plaintext) byte stream behaves like a
/// POSIX file: callers see a flat address space and a single seek pointer,
/// never the underlying page/IV/header framing.
///
/// Generic over the cipher only so the engine's own tests can swap in
/// [`crate::cipher::Plain`] and exercise paging logic without paying for
/// AES on every test; [`PagedFile::open`] always produces an
/// [`Aes256Cbc`]-backed instance.
pub struct PagedFile<C: PageCipher = Aes256Cbc> {
    file: File,
    geometry: Geometry,
    cipher: C,
    key: Zeroizing<Vec<u8>>,
    seek_ptr: u64,
    header_verified: bool,
    flags: OpenFlags,
    // Scratch buffers, owned once for the life of the handle instead of
    // allocated per call — see SPEC_FULL.md §4.3 and §9 (design notes).
    raw_page: Zeroizing<Vec<u8>>,
    assembly: Zeroizing<Vec<u8>>,
    codec_scratch: Zeroizing<Vec<u8>>,
}

impl PagedFile<Aes256Cbc> {
    /// Opens `file` as an AES-256-CBC paged file with the given page size.
    /// `key` must be exactly 32 bytes.
    pub fn open(file: File, key: &[u8], page_sz: u32, flags: OpenFlags) -> Result<Self> {
        Self::open_with_cipher(file, Aes256Cbc, key, page_sz, flags)
    }
}

impl<C: PageCipher> PagedFile<C> {
    /// Opens `file` under an arbitrary [`PageCipher`]. Geometry is derived
    /// and validated from `cipher`'s block/IV sizes and `page_sz` — see
    /// [`Geometry::new`] for the rejected configurations.
    pub fn open_with_cipher(file: File, cipher: C, key: &[u8], page_sz: u32, flags: OpenFlags) -> Result<Self> {
        if key.len() != cipher.key_size() {
            return Err(PagedFileError::InvalidGeometry(format!(
                "key must be {} bytes, got {}",
                cipher.key_size(),
                key.len()
            )));
        }
        let geometry = Geometry::new(
            page_sz,
            cipher.block_size() as u32,
            cipher.iv_size() as u32,
            PAGE_HEADER_RECORD_SZ,
        )?;

        let page_sz = geometry.page_sz as usize;
        let scratch_sz = (geometry.page_header_sz + geometry.data_sz) as usize;
        let data_sz = geometry.data_sz as usize;

        Ok(Self {
            file,
            geometry,
            cipher,
            key: Zeroizing::new(key.to_vec()),
            seek_ptr: 0,
            header_verified: false,
            flags,
            raw_page: Zeroizing::new(vec![0u8; page_sz]),
            assembly: Zeroizing::new(vec![0u8; data_sz]),
            codec_scratch: Zeroizing::new(vec![0u8; scratch_sz]),
        })
    }

    /// How this handle was opened.
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// The page geometry in effect for this handle.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Logical size of the file in bytes: `(page_count - 1) * data_sz +
    /// data_sz_used` of the last page, or `0` if no page has ever been
    /// written.
    pub fn size(&mut self) -> Result<u64> {
        let file_len = self.file.metadata()?.len();
        let page_count = self.geometry.page_count_on_disk(file_len);
        if page_count == 0 {
            return Ok(0);
        }
        let last_pgno = page_count - 1;
        let n = transport::read_page(&self.file, &self.geometry, last_pgno, &mut self.raw_page)?;
        if n == 0 {
            return Err(PagedFileError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "last page is present by file length but unreadable",
            )));
        }
        let used = decode_page(&self.cipher, &self.geometry, &self.key, &self.raw_page, &mut self.codec_scratch)?;
        Ok(last_pgno * self.geometry.data_sz as u64 + used as u64)
    }

    /// Moves the logical seek pointer. `SeekFrom::End` that cannot
    /// determine the current size (e.g. a corrupted last page) leaves the
    /// pointer unchanged rather than erroring — matching the source
    /// behavior this crate preserves verbatim (SPEC_FULL.md §9, preserved
    /// open question: SEEK_END silent failure).
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(off) => off,
            SeekFrom::Current(delta) => offset_by(self.seek_ptr, delta)?,
            SeekFrom::End(delta) => match self.size() {
                Ok(sz) => offset_by(sz, delta)?,
                Err(_) => return Ok(self.seek_ptr),
            },
        };
        self.seek_ptr = target;
        Ok(self.seek_ptr)
    }

    /// Truncates the file to the page containing `offset`, discarding
    /// everything from the start of that page onward. Page-granular, not
    /// byte-granular — preserved verbatim from the source behavior this
    /// crate does not redesign (SPEC_FULL.md §9). Does not touch the seek
    /// pointer, matching `csf_truncate`: a seek pointer left past the new
    /// end of file is not an error, the next read just returns 0 at EOF.
    pub fn truncate(&mut self, offset: u64) -> Result<()> {
        let pgno = self.geometry.page_of(offset);
        let phys = self.geometry.phys(pgno);
        self.file.set_len(phys)?;
        Ok(())
    }

    /// Reads up to `buf.len()` plaintext bytes starting at the current
    /// seek pointer, advancing it by the number of bytes actually read.
    /// Stops early (without error) at the first never-written or
    /// short/corrupt page — matching the source's "return what you got"
    /// read semantics.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.seek_ptr == 0 {
            let file_len = self.file.metadata()?.len();
            if self.geometry.page_count_on_disk(file_len) >= 1 {
                self.verify_header()?;
            }
        }

        let data_sz = self.geometry.data_sz as usize;
        let header_sz = self.geometry.page_header_sz as usize;
        let start_page = self.geometry.page_of(self.seek_ptr);
        let mut intra = self.geometry.intra(self.seek_ptr) as usize;
        let pages_to_read = self.geometry.pages_for_len(buf.len() as u64 + intra as u64);

        let file_len = self.file.metadata()?.len();
        let disk_pages = self.geometry.page_count_on_disk(file_len);

        let mut out_off = 0usize;
        let mut remaining = buf.len();

        for i in 0..pages_to_read {
            let pgno = start_page + i;
            if pgno >= disk_pages {
                break;
            }
            let n_read = transport::read_page(&self.file, &self.geometry, pgno, &mut self.raw_page)?;
            if n_read == 0 {
                break;
            }
            let used = match decode_page(&self.cipher, &self.geometry, &self.key, &self.raw_page, &mut self.codec_scratch) {
                Ok(used) => used as usize,
                Err(_) => break,
            };
            if used <= intra {
                break; // nothing valid left at or past our read point on this page
            }
            let want = remaining.min(data_sz - intra);
            let have = (used - intra).min(want);
            if have == 0 {
                break;
            }
            let src = &self.codec_scratch[header_sz + intra..header_sz + intra + have];
            buf[out_off..out_off + have].copy_from_slice(src);

            out_off += have;
            remaining -= have;
            self.seek_ptr += have as u64;
            intra = 0;

            if have < want {
                // the page ran out of valid data before filling the caller's request
                break;
            }
        }
        Ok(out_off)
    }

    /// Writes `buf.len()` plaintext bytes at the current seek pointer,
    /// advancing it. Writing past the current end of file sparsely
    /// back-fills the gap (SPEC_FULL.md §4.4, step 2): the previous last
    /// page is re-sealed to full width, intermediate pages are written as
    /// all-zero, and the page immediately before the new data is written
    /// with only its leading gap zeroed.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.header_verified {
            self.write_or_verify_header()?;
        }

        let data_sz = self.geometry.data_sz as usize;
        let header_sz = self.geometry.page_header_sz as usize;
        let start_page = self.geometry.page_of(self.seek_ptr);
        let mut intra = self.geometry.intra(self.seek_ptr) as usize;
        let pages_to_write = self.geometry.pages_for_len(buf.len() as u64 + intra as u64);

        let file_len = self.file.metadata()?.len();
        let disk_pages = self.geometry.page_count_on_disk(file_len);
        if start_page > disk_pages {
            self.backfill(disk_pages, start_page)?;
        }

        let mut in_off = 0usize;
        let mut remaining = buf.len();

        for i in 0..pages_to_write {
            let pgno = start_page + i;
            let capacity = data_sz - intra;
            let to_copy = remaining.min(capacity);

            let n_read = transport::read_page(&self.file, &self.geometry, pgno, &mut self.raw_page)?;
            let existing_len = if n_read == 0 {
                self.assembly.fill(0);
                0usize
            } else {
                let used = decode_page(&self.cipher, &self.geometry, &self.key, &self.raw_page, &mut self.codec_scratch)? as usize;
                self.assembly.copy_from_slice(&self.codec_scratch[header_sz..header_sz + data_sz]);
                used
            };

            self.assembly[intra..intra + to_copy].copy_from_slice(&buf[in_off..in_off + to_copy]);
            let new_len = (intra + to_copy).max(existing_len);

            encode_page(
                &self.cipher,
                &self.geometry,
                &self.key,
                &self.assembly[..new_len],
                &mut self.codec_scratch,
                &mut self.raw_page,
            )?;
            transport::write_page(&self.file, &self.geometry, pgno, &self.raw_page)?;

            in_off += to_copy;
            remaining -= to_copy;
            self.seek_ptr += to_copy as u64;
            intra = 0;
        }
        Ok(in_off)
    }

    fn verify_header(&mut self) -> Result<()> {
        transport::read_file_header(&self.file)?;
        self.header_verified = true;
        Ok(())
    }

    fn write_or_verify_header(&mut self) -> Result<()> {
        match transport::read_file_header(&self.file)? {
            Some(_) => {}
            None => {
                let header = FileHeader::new(self.geometry.page_sz, self.cipher.cipher_id());
                transport::write_file_header(&self.file, header)?;
            }
        }
        self.header_verified = true;
        Ok(())
    }

    /// Extends the file from `disk_pages` pages up to (but not including)
    /// `start_page`, per SPEC_FULL.md §4.4 step 2:
    /// 1. re-seal the previous last page to full `data_sz` width (its
    ///    trailing, never-written bytes become zero rather than staying
    ///    implicit in a short `data_sz_used`);
    /// 2. write every wholly-skipped page in between as all-zero, full
    ///    width. `start_page` itself is not touched here — the ordinary
    ///    per-page write loop handles it, since `assembly` already starts
    ///    zeroed and only the caller's bytes get overlaid past its
    ///    intra-page offset.
    fn backfill(&mut self, disk_pages: u64, start_page: u64) -> Result<()> {
        let data_sz = self.geometry.data_sz as usize;
        let header_sz = self.geometry.page_header_sz as usize;

        if disk_pages > 0 {
            let last = disk_pages - 1;
            let n_read = transport::read_page(&self.file, &self.geometry, last, &mut self.raw_page)?;
            self.assembly.fill(0);
            if n_read != 0 {
                let used = decode_page(&self.cipher, &self.geometry, &self.key, &self.raw_page, &mut self.codec_scratch)? as usize;
                self.assembly[..used].copy_from_slice(&self.codec_scratch[header_sz..header_sz + used]);
            }
            encode_page(&self.cipher, &self.geometry, &self.key, &self.assembly[..data_sz], &mut self.codec_scratch, &mut self.raw_page)?;
            transport::write_page(&self.file, &self.geometry, last, &self.raw_page)?;
        }

        self.assembly.fill(0);
        for pgno in disk_pages..start_page {
            encode_page(&self.cipher, &self.geometry, &self.key, &self.assembly[..data_sz], &mut self.codec_scratch, &mut self.raw_page)?;
            transport::write_page(&self.file, &self.geometry, pgno, &self.raw_page)?;
        }
        Ok(())
    }
}

fn offset_by(base: u64, delta: i64) -> Result<u64> {
    if delta >= 0 {
        base.checked_add(delta as u64).ok_or(PagedFileError::InvalidSeek)
    } else {
        base.checked_sub(delta.unsigned_abs()).ok_or(PagedFileError::InvalidSeek)
    }
}

impl<C: PageCipher> Drop for PagedFile<C> {
    fn drop(&mut self) {
        self.key.zeroize();
        self.raw_page.zeroize();
        self.assembly.zeroize();
        self.codec_scratch.zeroize();
    }
}

impl<C: PageCipher> io::Read for PagedFile<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        PagedFile::read(self, buf).map_err(io::Error::from)
    }
}

impl<C: PageCipher> io::Write for PagedFile<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PagedFile::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<C: PageCipher> io::Seek for PagedFile<C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        PagedFile::seek(self, pos).map_err(io::Error::from)
    }
}
