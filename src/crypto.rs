use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

pub const CREDENTIAL_KEY_ENV: &str = "LUREBOX_CREDENTIAL_KEY";
pub const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;
const TAG_BYTES: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("credential key missing: set {CREDENTIAL_KEY_ENV} to 64 hex characters")]
    KeyMissing,

    #[error("credential key must be 64 hex characters (32 bytes)")]
    KeyInvalid,

    #[error("malformed credential envelope")]
    MalformedEnvelope,

    #[error("credential encryption failed")]
    EncryptionFailed,

    #[error("credential decryption failed")]
    DecryptionFailed,
}

/// Symmetric cipher for refresh tokens at rest.
///
/// Envelope format is `nonce:tag:ciphertext`, all hex, with a fresh random
/// 96-bit nonce per call. The tag is verified before any plaintext is
/// released; every failure collapses into a typed error so callers treat the
/// credential as unusable instead of crashing the request.
pub struct CredentialCipher {
    key: [u8; KEY_BYTES],
}

impl CredentialCipher {
    pub fn new(key: [u8; KEY_BYTES]) -> Self {
        Self { key }
    }

    pub fn from_hex(raw: &str) -> Result<Self, CryptoError> {
        let decoded = hex_decode(raw.trim()).map_err(|_| CryptoError::KeyInvalid)?;
        let key: [u8; KEY_BYTES] = decoded.try_into().map_err(|_| CryptoError::KeyInvalid)?;
        Ok(Self::new(key))
    }

    /// Reads the key from the environment. A missing or malformed key is a
    /// startup failure for any command that touches credentials, not a
    /// per-request condition.
    pub fn from_env() -> Result<Self, CryptoError> {
        let raw = std::env::var(CREDENTIAL_KEY_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(CryptoError::KeyMissing)?;
        Self::from_hex(&raw)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let unbound = UnboundKey::new(&CHACHA20_POLY1305, &self.key)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let key = LessSafeKey::new(unbound);

        let mut nonce_bytes = [0u8; NONCE_BYTES];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut buffer = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut buffer,
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

        // seal appends the tag; the envelope keeps it as a separate field
        let tag_start = buffer.len() - TAG_BYTES;
        Ok(format!(
            "{}:{}:{}",
            hex_encode(&nonce_bytes),
            hex_encode(&buffer[tag_start..]),
            hex_encode(&buffer[..tag_start]),
        ))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let mut sections = envelope.split(':');
        let (Some(nonce_hex), Some(tag_hex), Some(ct_hex), None) = (
            sections.next(),
            sections.next(),
            sections.next(),
            sections.next(),
        ) else {
            return Err(CryptoError::MalformedEnvelope);
        };

        let nonce_vec = hex_decode(nonce_hex).map_err(|_| CryptoError::MalformedEnvelope)?;
        let nonce_bytes: [u8; NONCE_BYTES] = nonce_vec
            .try_into()
            .map_err(|_| CryptoError::MalformedEnvelope)?;
        let tag = hex_decode(tag_hex).map_err(|_| CryptoError::MalformedEnvelope)?;
        if tag.len() != TAG_BYTES {
            return Err(CryptoError::MalformedEnvelope);
        }

        let mut buffer = hex_decode(ct_hex).map_err(|_| CryptoError::MalformedEnvelope)?;
        buffer.extend_from_slice(&tag);

        let unbound = UnboundKey::new(&CHACHA20_POLY1305, &self.key)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let key = LessSafeKey::new(unbound);

        let plaintext = key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut buffer,
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::DecryptionFailed)
    }
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

pub(crate) fn hex_decode(raw: &str) -> Result<Vec<u8>, CryptoError> {
    let value = raw.trim();
    if value.len() % 2 != 0 {
        return Err(CryptoError::MalformedEnvelope);
    }

    let mut out = Vec::with_capacity(value.len() / 2);
    let bytes = value.as_bytes();
    let mut idx = 0usize;
    while idx < bytes.len() {
        let hi = decode_hex_nibble(bytes[idx]).ok_or(CryptoError::MalformedEnvelope)?;
        let lo = decode_hex_nibble(bytes[idx + 1]).ok_or(CryptoError::MalformedEnvelope)?;
        out.push((hi << 4) | lo);
        idx += 2;
    }
    Ok(out)
}

fn decode_hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{hex_decode, hex_encode, CredentialCipher, CryptoError, KEY_BYTES};

    fn cipher_with(byte: u8) -> CredentialCipher {
        CredentialCipher::new([byte; KEY_BYTES])
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = cipher_with(0x11);
        let envelope = cipher.encrypt("1//refresh-token-abc").expect("encrypt");
        let plaintext = cipher.decrypt(&envelope).expect("decrypt");
        assert_eq!(plaintext, "1//refresh-token-abc");
    }

    #[test]
    fn envelope_has_three_hex_sections_and_fresh_nonces() {
        let cipher = cipher_with(0x22);
        let first = cipher.encrypt("secret").expect("encrypt");
        let second = cipher.encrypt("secret").expect("encrypt");

        let sections: Vec<&str> = first.split(':').collect();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].len(), 24, "96-bit nonce as hex");
        assert_eq!(sections[1].len(), 32, "128-bit tag as hex");

        assert_ne!(first, second, "nonce must be unique per call");
    }

    #[test]
    fn wrong_key_never_yields_plaintext() {
        let envelope = cipher_with(0x33).encrypt("secret").expect("encrypt");
        let result = cipher_with(0x44).decrypt(&envelope);
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let cipher = cipher_with(0x55);
        let envelope = cipher.encrypt("secret").expect("encrypt");

        let mut sections: Vec<String> = envelope.split(':').map(str::to_string).collect();
        let flipped = if sections[2].ends_with('0') { "1" } else { "0" };
        sections[2].pop();
        sections[2].push_str(flipped);

        let result = cipher.decrypt(&sections.join(":"));
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn tampered_tag_fails_authentication() {
        let cipher = cipher_with(0x66);
        let envelope = cipher.encrypt("secret").expect("encrypt");

        let mut sections: Vec<String> = envelope.split(':').map(str::to_string).collect();
        sections[1] = "00".repeat(16);

        let result = cipher.decrypt(&sections.join(":"));
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn malformed_envelopes_are_typed_failures() {
        let cipher = cipher_with(0x77);
        for raw in ["", "abc", "xx:yy", "zz:zz:zz", "0b:0b:0b:0b", "0b1:0b:0b"] {
            assert_eq!(
                cipher.decrypt(raw),
                Err(CryptoError::MalformedEnvelope),
                "envelope {raw:?} should be rejected as malformed"
            );
        }
    }

    #[test]
    fn key_parsing_rejects_bad_hex() {
        assert!(CredentialCipher::from_hex(&"ab".repeat(32)).is_ok());
        assert_eq!(
            CredentialCipher::from_hex("too-short").map(|_| ()),
            Err(CryptoError::KeyInvalid)
        );
        assert_eq!(
            CredentialCipher::from_hex(&"ab".repeat(16)).map(|_| ()),
            Err(CryptoError::KeyInvalid)
        );
    }

    #[test]
    fn hex_helpers_round_trip() {
        let bytes = [0u8, 1, 0x7f, 0xa5, 0xff];
        assert_eq!(hex_decode(&hex_encode(&bytes)).expect("decode"), bytes);
    }
}
