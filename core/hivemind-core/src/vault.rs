//! Credential vault: authenticated encryption for secrets stored at rest.
//!
//! Tokens have the shape `nonceHex:tagHex:cipherHex`. The key is the SHA-256
//! digest of the process-wide secret and every call draws a fresh 96-bit
//! nonce, so re-encrypting the same token never yields the same string.
//!
//! The key is a bare hash of the secret with no per-installation salt. That is
//! weaker than a real KDF; it is kept so one `DATA_SECRET_KEY` keeps working
//! across machines.

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce, Tag};
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("cipher token is malformed: {0}")]
    Malformed(&'static str),

    /// Tag did not verify: wrong secret or tampered ciphertext.
    #[error("cipher token failed authentication")]
    Authentication,

    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("cipher initialization failed")]
    Cipher,
}

fn cipher_for(secret: &str) -> Result<ChaCha20Poly1305, VaultError> {
    let key = Sha256::digest(secret.as_bytes());
    ChaCha20Poly1305::new_from_slice(key.as_slice()).map_err(|_| VaultError::Cipher)
}

pub fn encrypt(plaintext: &str, secret: &str) -> Result<String, VaultError> {
    let cipher = cipher_for(secret)?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| VaultError::Cipher)?;

    Ok(format!(
        "{}:{}:{}",
        hex::encode(nonce),
        hex::encode(tag.as_slice()),
        hex::encode(&buffer)
    ))
}

pub fn decrypt(token: &str, secret: &str) -> Result<String, VaultError> {
    let mut parts = token.split(':');
    let (Some(nonce_hex), Some(tag_hex), Some(cipher_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(VaultError::Malformed("expected three segments"));
    };

    let nonce = hex::decode(nonce_hex).map_err(|_| VaultError::Malformed("nonce is not hex"))?;
    let tag = hex::decode(tag_hex).map_err(|_| VaultError::Malformed("tag is not hex"))?;
    let mut buffer =
        hex::decode(cipher_hex).map_err(|_| VaultError::Malformed("ciphertext is not hex"))?;

    // from_slice panics on length mismatch
    if nonce.len() != NONCE_LEN {
        return Err(VaultError::Malformed("nonce must be 12 bytes"));
    }
    if tag.len() != TAG_LEN {
        return Err(VaultError::Malformed("tag must be 16 bytes"));
    }

    let cipher = cipher_for(secret)?;
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&nonce),
            b"",
            &mut buffer,
            Tag::from_slice(&tag),
        )
        .map_err(|_| VaultError::Authentication)?;

    String::from_utf8(buffer).map_err(|_| VaultError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flip_hex_byte(segment: &str, index: usize) -> String {
        let mut bytes = hex::decode(segment).unwrap();
        bytes[index] ^= 0x01;
        hex::encode(bytes)
    }

    #[test]
    fn round_trips_plaintext() {
        for plaintext in ["", "T1", "ghp_0123456789abcdef", "unicodé ✓"] {
            let token = encrypt(plaintext, "secret").unwrap();
            assert_eq!(decrypt(&token, "secret").unwrap(), plaintext);
        }
    }

    #[test]
    fn token_has_three_hex_segments() {
        let token = encrypt("abc", "secret").unwrap();
        let parts: Vec<&str> = token.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), NONCE_LEN * 2);
        assert_eq!(parts[1].len(), TAG_LEN * 2);
        assert_eq!(parts[2].len(), 3 * 2);
    }

    #[test]
    fn nonces_differ_between_calls() {
        let a = encrypt("same", "secret").unwrap();
        let b = encrypt("same", "secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_secret_fails_authentication() {
        let token = encrypt("T1", "s1").unwrap();
        assert_eq!(decrypt(&token, "s2"), Err(VaultError::Authentication));
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let token = encrypt("payload", "secret").unwrap();
        let parts: Vec<&str> = token.split(':').collect();
        for index in 0..TAG_LEN {
            let tampered = format!("{}:{}:{}", parts[0], flip_hex_byte(parts[1], index), parts[2]);
            assert_eq!(decrypt(&tampered, "secret"), Err(VaultError::Authentication));
        }
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let token = encrypt("payload", "secret").unwrap();
        let parts: Vec<&str> = token.split(':').collect();
        for index in 0.."payload".len() {
            let tampered = format!("{}:{}:{}", parts[0], parts[1], flip_hex_byte(parts[2], index));
            assert_eq!(decrypt(&tampered, "secret"), Err(VaultError::Authentication));
        }
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(matches!(decrypt("", "s"), Err(VaultError::Malformed(_))));
        assert!(matches!(decrypt("a:b", "s"), Err(VaultError::Malformed(_))));
        assert!(matches!(decrypt("zz:zz:zz", "s"), Err(VaultError::Malformed(_))));
        assert!(matches!(decrypt("00:00:00:00", "s"), Err(VaultError::Malformed(_))));

        let token = encrypt("x", "s").unwrap();
        let truncated = &token[2..];
        assert!(decrypt(truncated, "s").is_err());
    }
}
