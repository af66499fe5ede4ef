//! String encryption for stored credential fields using AES-256-GCM.
//!
//! Two wire formats are understood:
//! - **Current**: `base64([12-byte nonce][ciphertext with 16-byte auth tag])`,
//!   nonce drawn fresh from the key for every write.
//! - **Legacy**: `base64([ciphertext with 16-byte auth tag])` encrypted under
//!   an all-zero nonce. Only ever read, never written.
//!
//! Decoding tries the formats in [`DECODE_ORDER`]; the first that
//! authenticates wins. Legacy records are not rewritten here; callers
//! that want them upgraded must store them again.

use base64::{
    alphabet,
    engine::{general_purpose::STANDARD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};
use crate::keystore::{KeyHandle, NONCE_SIZE, TAG_SIZE};
use crate::models::FormatVersion;

/// Nonce implied by legacy blobs.
const LEGACY_FIXED_NONCE: [u8; NONCE_SIZE] = [0u8; NONCE_SIZE];

/// Order in which stored formats are tried when decrypting.
pub const DECODE_ORDER: [FormatVersion; 2] = [FormatVersion::Current, FormatVersion::Legacy];

/// Decoder accepting padded and unpadded input.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A parsed encrypted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub format: FormatVersion,
    /// All zero for legacy blobs.
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the 16-byte tag appended.
    pub ciphertext: Vec<u8>,
}

impl StoredBlob {
    /// Interpret raw decoded bytes as a blob of the given format.
    pub fn parse(data: &[u8], format: FormatVersion) -> VaultResult<Self> {
        match format {
            FormatVersion::Current => {
                if data.len() <= NONCE_SIZE {
                    return Err(VaultError::MalformedInput(format!(
                        "Blob too short for nonce prefix: {} bytes",
                        data.len()
                    )));
                }
                let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
                let mut nonce = [0u8; NONCE_SIZE];
                nonce.copy_from_slice(nonce_bytes);
                Ok(Self {
                    format,
                    nonce,
                    ciphertext: ciphertext.to_vec(),
                })
            }
            FormatVersion::Legacy => {
                if data.len() < TAG_SIZE {
                    return Err(VaultError::MalformedInput(format!(
                        "Blob too short for authentication tag: {} bytes",
                        data.len()
                    )));
                }
                Ok(Self {
                    format,
                    nonce: LEGACY_FIXED_NONCE,
                    ciphertext: data.to_vec(),
                })
            }
        }
    }

    /// Serialize to the base64 text kept in the key-value store.
    pub fn encode(&self) -> String {
        match self.format {
            FormatVersion::Current => {
                let mut output = self.nonce.to_vec();
                output.extend_from_slice(&self.ciphertext);
                STANDARD.encode(output)
            }
            FormatVersion::Legacy => STANDARD.encode(&self.ciphertext),
        }
    }

    fn open(&self, key: &KeyHandle) -> VaultResult<Zeroizing<Vec<u8>>> {
        key.open(&self.nonce, &self.ciphertext)
    }
}

/// Encrypt `plaintext` into a current-format blob.
pub fn seal(plaintext: &str, key: &KeyHandle) -> VaultResult<StoredBlob> {
    let (nonce, ciphertext) = key.seal(plaintext.as_bytes())?;
    Ok(StoredBlob {
        format: FormatVersion::Current,
        nonce,
        ciphertext,
    })
}

/// Encrypt `plaintext` and return the base64 text to persist.
pub fn encrypt(plaintext: &str, key: &KeyHandle) -> VaultResult<String> {
    Ok(seal(plaintext, key)?.encode())
}

/// Decrypt a stored field, accepting both current and legacy formats.
pub fn decrypt(blob: &str, key: &KeyHandle) -> VaultResult<Zeroizing<String>> {
    decrypt_detailed(blob, key).map(|(plaintext, _)| plaintext)
}

/// Like [`decrypt`], also reporting which format the blob was in.
pub fn decrypt_detailed(
    blob: &str,
    key: &KeyHandle,
) -> VaultResult<(Zeroizing<String>, FormatVersion)> {
    let data = decode_base64(blob)?;

    let mut last_error = VaultError::AuthenticationFailed;
    for format in DECODE_ORDER {
        match StoredBlob::parse(&data, format).and_then(|parsed| parsed.open(key)) {
            Ok(plaintext) => {
                if format == FormatVersion::Legacy {
                    debug!("Decrypted legacy fixed-nonce blob for alias {}", key.alias());
                }
                let text = std::str::from_utf8(&plaintext).map_err(|_| {
                    VaultError::MalformedInput("Decrypted data is not valid UTF-8".into())
                })?;
                return Ok((Zeroizing::new(text.to_owned()), format));
            }
            Err(e) => {
                debug!("{:?} decode attempt failed: {}", format, e);
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Decode base64, ignoring embedded whitespace such as MIME line breaks.
fn decode_base64(blob: &str) -> VaultResult<Zeroizing<Vec<u8>>> {
    let compact: Vec<u8> = blob
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64
        .decode(compact)
        .map(Zeroizing::new)
        .map_err(|e| VaultError::MalformedInput(format!("Invalid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::KEY_SIZE;
    use crate::models::KeyTier;
    use aes_gcm::{
        aead::{Aead, KeyInit},
        Aes256Gcm, Nonce,
    };
    use std::collections::HashSet;

    const KEY_BYTES: [u8; KEY_SIZE] = [0x42; KEY_SIZE];

    fn test_key() -> KeyHandle {
        KeyHandle::from_key_bytes("test", KeyTier::Standard, &KEY_BYTES, true).unwrap()
    }

    fn legacy_blob(plaintext: &str, key: &[u8; KEY_SIZE]) -> Vec<u8> {
        let cipher = Aes256Gcm::new_from_slice(key).unwrap();
        cipher
            .encrypt(Nonce::from_slice(&[0u8; NONCE_SIZE]), plaintext.as_bytes())
            .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let key = test_key();
        for plaintext in ["a", "p@ss", "correct horse battery staple", "пароль 🔑"] {
            let blob = encrypt(plaintext, &key).unwrap();
            assert_eq!(decrypt(&blob, &key).unwrap().as_str(), plaintext);
        }
    }

    #[test]
    fn test_encrypt_emits_current_format() {
        let key = test_key();
        let blob = encrypt("p@ss", &key).unwrap();
        let (plaintext, format) = decrypt_detailed(&blob, &key).unwrap();
        assert_eq!(plaintext.as_str(), "p@ss");
        assert_eq!(format, FormatVersion::Current);

        let raw = STANDARD.decode(&blob).unwrap();
        assert_eq!(raw.len(), NONCE_SIZE + "p@ss".len() + TAG_SIZE);
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = test_key();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let blob = seal("same plaintext", &key).unwrap();
            assert!(seen.insert(blob.nonce), "nonce reused");
        }
    }

    #[test]
    fn test_legacy_blob_decrypts() {
        let key = test_key();
        let blob = STANDARD.encode(legacy_blob("p@ss", &KEY_BYTES));
        let (plaintext, format) = decrypt_detailed(&blob, &key).unwrap();
        assert_eq!(plaintext.as_str(), "p@ss");
        assert_eq!(format, FormatVersion::Legacy);
    }

    #[test]
    fn test_legacy_blob_with_line_wrapping() {
        let key = test_key();
        let long = "x".repeat(120);
        let encoded = STANDARD.encode(legacy_blob(&long, &KEY_BYTES));
        let wrapped: String = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| format!("{}\n", std::str::from_utf8(line).unwrap()))
            .collect();
        assert_eq!(decrypt(&wrapped, &key).unwrap().as_str(), long);
    }

    #[test]
    fn test_legacy_blob_round_trips_through_stored_blob() {
        let raw = legacy_blob("p@ss", &KEY_BYTES);
        let parsed = StoredBlob::parse(&raw, FormatVersion::Legacy).unwrap();
        assert_eq!(parsed.nonce, LEGACY_FIXED_NONCE);
        assert_eq!(parsed.encode(), STANDARD.encode(&raw));
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let key = test_key();
        let blob = seal("p@ss", &key).unwrap();
        let raw = STANDARD.decode(blob.encode()).unwrap();

        for byte in NONCE_SIZE..raw.len() {
            for bit in 0..8 {
                let mut tampered = raw.clone();
                tampered[byte] ^= 1 << bit;
                let result = decrypt(&STANDARD.encode(&tampered), &key);
                assert!(
                    matches!(result, Err(VaultError::AuthenticationFailed)),
                    "byte {} bit {} not detected",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_tampered_nonce_fails_authentication() {
        let key = test_key();
        let mut raw = STANDARD.decode(encrypt("p@ss", &key).unwrap()).unwrap();
        raw[0] ^= 0x01;
        assert!(matches!(
            decrypt(&STANDARD.encode(&raw), &key),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let blob = encrypt("p@ss", &test_key()).unwrap();
        let other = KeyHandle::from_key_bytes("other", KeyTier::Standard, &[0x24; KEY_SIZE], true)
            .unwrap();
        assert!(matches!(
            decrypt(&blob, &other),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        assert!(matches!(
            decrypt("not base64 at all!", &test_key()),
            Err(VaultError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_short_buffer_is_malformed() {
        let key = test_key();
        for len in [0usize, 8, NONCE_SIZE, TAG_SIZE - 1] {
            let blob = STANDARD.encode(vec![0u8; len]);
            assert!(
                matches!(decrypt(&blob, &key), Err(VaultError::MalformedInput(_))),
                "len {}",
                len
            );
        }
    }

    #[test]
    fn test_non_utf8_plaintext_is_malformed() {
        let cipher = Aes256Gcm::new_from_slice(&KEY_BYTES).unwrap();
        let nonce = [9u8; NONCE_SIZE];
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), [0xffu8, 0xfe, 0xfd].as_slice())
            .unwrap();
        let blob = StoredBlob {
            format: FormatVersion::Current,
            nonce,
            ciphertext,
        };
        assert!(matches!(
            decrypt(&blob.encode(), &test_key()),
            Err(VaultError::MalformedInput(_))
        ));
    }
}
