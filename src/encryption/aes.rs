//! AES-128 in CBC mode with PKCS#7 padding (crypt filter method AESV2).
//!
//! Encrypted payloads carry their 16-byte IV as a prefix.

use crate::error::{Error, Result};
use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

fn check_key(key: &[u8]) -> Result<()> {
    if key.len() != 16 {
        return Err(Error::Encryption(format!("AES-128 key must be 16 bytes, got {}", key.len())));
    }
    Ok(())
}

/// Encrypt `data`, returning `iv || ciphertext`.
pub fn aes128_encrypt(key: &[u8], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    check_key(key)?;
    let pad = 16 - (data.len() % 16);
    let mut buffer = data.to_vec();
    buffer.extend(std::iter::repeat(pad as u8).take(pad));
    let len = buffer.len();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|_| Error::Encryption("AES encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(16 + len);
    out.extend_from_slice(iv);
    out.extend_from_slice(&buffer);
    Ok(out)
}

/// Decrypt `iv || ciphertext` and strip the padding.
pub fn aes128_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_key(key)?;
    if data.len() < 16 {
        return Err(Error::Encryption("AES payload shorter than its IV".to_string()));
    }
    let (iv, body) = data.split_at(16);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    if body.len() % 16 != 0 {
        return Err(Error::Encryption("AES payload is not block aligned".to_string()));
    }

    let mut buffer = body.to_vec();
    let plain = Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::Encryption("AES decryption failed".to_string()))?;
    let pad = plain.last().copied().unwrap_or(0) as usize;
    if pad == 0 || pad > 16 || plain[plain.len() - pad..].iter().any(|&b| b as usize != pad) {
        return Err(Error::Encryption("invalid PKCS#7 padding".to_string()));
    }
    Ok(plain[..plain.len() - pad].to_vec())
}

/// A fresh random IV.
pub fn random_iv() -> [u8; 16] {
    uuid::Uuid::new_v4().into_bytes()
}
