//! Pure offset/page arithmetic. Nothing in this module touches a file
//! handle or the seek pointer — the orchestrator in [`crate::file`] supplies
//! every offset explicitly, so these functions stay trivially unit-testable.

use crate::error::{PagedFileError, Result};
use crate::header::FILE_HEADER_SZ;

/// Page number, a disk-relative index (not a byte offset).
pub type PageNo = u64;

/// Immutable per-file geometry, fixed for the lifetime of a [`crate::PagedFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Total on-disk size of one page, in bytes: `iv_sz + page_header_sz + data_sz`.
    pub page_sz: u32,
    /// Cipher block size; every sub-size below must be a multiple of it.
    pub block_sz: u32,
    /// IV length in bytes, drawn fresh for every page write.
    pub iv_sz: u32,
    /// Size of the (padded) page header record, a multiple of `block_sz`.
    pub page_header_sz: u32,
    /// Plaintext payload capacity per page: `page_sz - iv_sz - page_header_sz`.
    pub data_sz: u32,
}

impl Geometry {
    /// Derives a validated geometry from a caller-chosen page size and a
    /// cipher's block/IV sizes and raw page-header record size.
    ///
    /// Rejects configurations the C original only asserted on: a `page_sz`
    /// that isn't block-aligned, or one too small to leave a positive
    /// `data_sz`. See SPEC_FULL.md §9 ("`data_sz` must be positive").
    pub fn new(page_sz: u32, block_sz: u32, iv_sz: u32, header_record_sz: u32) -> Result<Self> {
        if block_sz == 0 {
            return Err(PagedFileError::InvalidGeometry(
                "block size must be positive".into(),
            ));
        }
        if page_sz == 0 || page_sz % block_sz != 0 {
            return Err(PagedFileError::InvalidGeometry(format!(
                "page_sz {page_sz} must be a positive multiple of block_sz {block_sz}"
            )));
        }
        if iv_sz % block_sz != 0 {
            return Err(PagedFileError::InvalidGeometry(format!(
                "iv_sz {iv_sz} must be a multiple of block_sz {block_sz}"
            )));
        }
        // round the header record up to the next block boundary
        let page_header_sz = if header_record_sz % block_sz == 0 {
            header_record_sz
        } else {
            (header_record_sz / block_sz + 1) * block_sz
        };
        let used = iv_sz
            .checked_add(page_header_sz)
            .ok_or_else(|| PagedFileError::InvalidGeometry("page geometry overflows".into()))?;
        if used >= page_sz {
            return Err(PagedFileError::InvalidGeometry(format!(
                "page_sz {page_sz} too small for iv_sz {iv_sz} + page_header_sz {page_header_sz}"
            )));
        }
        let data_sz = page_sz - used;
        if data_sz % block_sz != 0 {
            return Err(PagedFileError::InvalidGeometry(format!(
                "data_sz {data_sz} must be a multiple of block_sz {block_sz}"
            )));
        }
        Ok(Self {
            page_sz,
            block_sz,
            iv_sz,
            page_header_sz,
            data_sz,
        })
    }

    /// Logical offset -> page index (floor division).
    pub fn page_of(&self, off: u64) -> PageNo {
        off / self.data_sz as u64
    }

    /// Logical offset -> byte offset within its page.
    pub fn intra(&self, off: u64) -> u64 {
        off % self.data_sz as u64
    }

    /// Number of pages needed to hold `n` bytes of plaintext, ceiling division.
    pub fn pages_for_len(&self, n: u64) -> u64 {
        n.div_ceil(self.data_sz as u64)
    }

    /// Page index -> physical byte offset of that page's first byte.
    pub fn phys(&self, pgno: PageNo) -> u64 {
        FILE_HEADER_SZ as u64 + pgno * self.page_sz as u64
    }

    /// Number of whole pages currently present on disk, given the file's
    /// total byte length. Partial trailing bytes are a corruption
    /// indicator and are logged, not propagated as an error — the caller
    /// still gets a best-effort page count.
    pub fn page_count_on_disk(&self, file_len: u64) -> u64 {
        if file_len < FILE_HEADER_SZ as u64 {
            return 0;
        }
        let body = file_len - FILE_HEADER_SZ as u64;
        let remainder = body % self.page_sz as u64;
        if remainder != 0 {
            log::warn!(
                "file body length {body} is not a multiple of page_sz {} (remainder {remainder}); \
                 ignoring the trailing partial page",
                self.page_sz
            );
        }
        body / self.page_sz as u64
    }
}
