use thiserror::Error;

/// Everything that can go wrong while paging, framing, or en/decrypting a
/// [`crate::PagedFile`]. Every engine operation returns a `Result` built on
/// this type instead of the sentinel `-1`/`0` convention of the original
/// C implementation; callers decide policy from the variant, per spec.
#[derive(Debug, Error)]
pub enum PagedFileError {
    /// A positional read/write on the backing file failed after retries,
    /// or failed outright on a non-transient error kind.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// `page_sz`/`iv_sz`/`block_sz`/`page_header_sz` fail the alignment or
    /// positivity constraints required to construct a [`crate::PagedFile`].
    #[error("invalid page geometry: {0}")]
    InvalidGeometry(String),

    /// A caller asked the codec to encode more plaintext than fits on one
    /// page.
    #[error("payload of {len} bytes exceeds page capacity of {data_sz} bytes")]
    PayloadTooLarge { len: usize, data_sz: usize },

    /// CBC produced a ciphertext whose length disagrees with the expected
    /// `page_header_sz + data_sz`. This can only happen from a cipher
    /// implementation bug or a corrupted scratch buffer; it is always
    /// fatal.
    #[error("cipher produced {actual} bytes, expected {expected}")]
    CipherLengthMismatch { expected: usize, actual: usize },

    /// The file already carries a header whose magic does not match ours;
    /// refusing to read (or overwrite) a foreign file.
    #[error("file header magic mismatch — not a cryptofile-formatted file")]
    HeaderMismatch,

    /// `seek(SeekFrom::Current(n))` with `n` negative enough to drive the
    /// logical pointer below zero.
    #[error("seek would move the logical pointer below zero")]
    InvalidSeek,
}

pub type Result<T> = std::result::Result<T, PagedFileError>;

impl From<PagedFileError> for std::io::Error {
    fn from(err: PagedFileError) -> Self {
        match err {
            PagedFileError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}
