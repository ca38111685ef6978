//! The block cipher is, per spec, an external collaborator — the paging
//! and framing logic in [`crate::codec`] never inlines AES directly. This
//! module is the seam: a small [`PageCipher`] trait with a real AES-256-CBC
//! implementation (the `aes`/`cbc` RustCrypto pairing, grounded on the
//! pack's `ringo380-idb-utils` example, whose `Cargo.toml` depends on the
//! same two crates for the same mode) and a `Plain` no-op used by the
//! engine's own test suite to exercise paging logic without paying for
//! encryption.

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use rand::RngCore;

use crate::error::{PagedFileError, Result};
use crate::header::CIPHER_ID_AES_256_CBC;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// A block-cipher in CBC-compatible mode, operating in place over an
/// exactly block-aligned buffer (no padding — the caller guarantees
/// alignment by construction, per spec).
pub trait PageCipher {
    /// Cipher block size in bytes (also the required IV size for CBC).
    fn block_size(&self) -> usize;
    /// IV size in bytes this cipher expects.
    fn iv_size(&self) -> usize;
    /// Key size in bytes this cipher expects.
    fn key_size(&self) -> usize;
    /// The on-disk `cipher_id` this implementation corresponds to.
    fn cipher_id(&self) -> u32;

    /// Fills `iv` (already sized to [`Self::iv_size`]) with fresh random
    /// bytes from a cryptographic RNG.
    fn generate_iv(&self, iv: &mut [u8]);

    /// Encrypts `buf` in place. `buf.len()` must be a positive multiple of
    /// [`Self::block_size`].
    fn encrypt_in_place(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>;

    /// Decrypts `buf` in place. `buf.len()` must be a positive multiple of
    /// [`Self::block_size`].
    fn decrypt_in_place(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>;
}

/// AES-256 in CBC mode, no padding. The default and only cipher named by
/// the on-disk format's `CIPHER_ID_AES_256_CBC`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Aes256Cbc;

impl PageCipher for Aes256Cbc {
    fn block_size(&self) -> usize {
        16
    }

    fn iv_size(&self) -> usize {
        16
    }

    fn key_size(&self) -> usize {
        32
    }

    fn cipher_id(&self) -> u32 {
        CIPHER_ID_AES_256_CBC
    }

    fn generate_iv(&self, iv: &mut [u8]) {
        rand::thread_rng().fill_bytes(iv);
    }

    fn encrypt_in_place(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        let encryptor = Aes256CbcEnc::new(key.into(), iv.into());
        let out = encryptor
            .encrypt_padded_mut::<NoPadding>(buf, len)
            .map_err(|_| PagedFileError::CipherLengthMismatch {
                expected: len,
                actual: 0,
            })?;
        debug_assert_eq!(out.len(), len);
        Ok(())
    }

    fn decrypt_in_place(&self, key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        let decryptor = Aes256CbcDec::new(key.into(), iv.into());
        let out = decryptor
            .decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| PagedFileError::CipherLengthMismatch {
                expected: len,
                actual: 0,
            })?;
        debug_assert_eq!(out.len(), len);
        Ok(())
    }
}

/// A no-op "cipher" that copies plaintext straight through, preserving the
/// IV-space-then-payload layout byte for byte. Exists purely so the
/// engine's paging/framing/back-fill logic can be unit tested without
/// pulling real AES into every test. Never used outside `#[cfg(test)]`
/// callers of this crate — there is no way to select it from
/// [`crate::PagedFile::open`]'s public API.
#[derive(Debug, Default, Clone, Copy)]
pub struct Plain;

impl PageCipher for Plain {
    fn block_size(&self) -> usize {
        16
    }

    fn iv_size(&self) -> usize {
        16
    }

    fn key_size(&self) -> usize {
        32
    }

    fn cipher_id(&self) -> u32 {
        0
    }

    fn generate_iv(&self, iv: &mut [u8]) {
        rand::thread_rng().fill_bytes(iv);
    }

    fn encrypt_in_place(&self, _key: &[u8], _iv: &[u8], _buf: &mut [u8]) -> Result<()> {
        Ok(())
    }

    fn decrypt_in_place(&self, _key: &[u8], _iv: &[u8], _buf: &mut [u8]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes256cbc_round_trips() {
        let cipher = Aes256Cbc;
        let key = [0x42u8; 32];
        let mut iv = [0u8; 16];
        cipher.generate_iv(&mut iv);

        let plaintext = b"0123456789abcdef0123456789abcdef".to_vec(); // 2 blocks
        let mut buf = plaintext.clone();
        cipher.encrypt_in_place(&key, &iv, &mut buf).unwrap();
        assert_ne!(buf, plaintext);
        cipher.decrypt_in_place(&key, &iv, &mut buf).unwrap();
        assert_eq!(buf, plaintext);
    }

    #[test]
    fn distinct_ivs_yield_distinct_ciphertext() {
        let cipher = Aes256Cbc;
        let key = [0x11u8; 32];
        let plaintext = [0xAAu8; 32];

        let mut iv_a = [0u8; 16];
        let mut iv_b = [0u8; 16];
        cipher.generate_iv(&mut iv_a);
        cipher.generate_iv(&mut iv_b);
        assert_ne!(iv_a, iv_b, "RNG produced the same IV twice — vanishingly unlikely");

        let mut buf_a = plaintext.to_vec();
        let mut buf_b = plaintext.to_vec();
        cipher.encrypt_in_place(&key, &iv_a, &mut buf_a).unwrap();
        cipher.encrypt_in_place(&key, &iv_b, &mut buf_b).unwrap();
        assert_ne!(buf_a, buf_b);
    }

    #[test]
    fn plain_cipher_is_identity() {
        let cipher = Plain;
        let mut buf = b"some exact block bytes here!!!!".to_vec();
        let original = buf.clone();
        cipher.encrypt_in_place(&[0u8; 32], &[0u8; 16], &mut buf).unwrap();
        assert_eq!(buf, original);
    }
}
