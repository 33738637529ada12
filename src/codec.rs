//! Activation code codec.
//!
//! A code is the license claims, encrypted and authenticated with AES-256-GCM
//! under a key derived (HKDF-SHA256) from the server's activation secret,
//! then rendered as unpadded base64 (URL-safe symbols, `.` instead of `-`)
//! in dash-separated groups of 8.
//!
//! Sealed format: VERSION (1 byte) || nonce (12 bytes) || ciphertext+tag
//!
//! Plaintext format (big endian):
//! tier (1) || issued_at (8) || expires_at (8) || max_devices (4)
//! || subscriber_len (1) || subscriber || purchase_ref_len (1) || purchase_ref
//!
//! The field bounds below keep every sealed code within `MAX_ENCODED_LEN`
//! characters, so a code is never truncated for display.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

use crate::config::Config;
use crate::models::{LicenseClaims, Tier};

/// Current code format version, authenticated as associated data.
const CODE_VERSION: u8 = 1;

/// Nonce size for AES-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size
const TAG_SIZE: usize = 16;

/// Characters per display group.
pub const GROUP_SIZE: usize = 8;

/// Separator between display groups.
pub const SEPARATOR: char = '-';

/// Maximum base64 characters in a code (32 groups).
pub const MAX_ENCODED_LEN: usize = 256;

/// Maximum display length of a code, separators included.
pub const MAX_CODE_LEN: usize = MAX_ENCODED_LEN + MAX_ENCODED_LEN / GROUP_SIZE - 1;

/// Maximum subscriber identity length in bytes.
pub const MAX_SUBSCRIBER_LEN: usize = 96;

/// Maximum purchase reference length in bytes.
pub const MAX_PURCHASE_REF_LEN: usize = 44;

/// Fixed-size part of the plaintext: tier, two timestamps, device limit and
/// the two length prefixes.
const FIXED_PLAINTEXT_LEN: usize = 1 + 8 + 8 + 4 + 1 + 1;

/// URL-safe base64 alphabet with `.` in place of `-`, so the group separator
/// never occurs inside the encoded data.
const CODE_ALPHABET: alphabet::Alphabet =
    match alphabet::Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789._") {
        Ok(a) => a,
        Err(_) => panic!("invalid code alphabet"),
    };

/// Base64 engine: unpadded both ways. Each sealed code has exactly one
/// accepted spelling, so the canonical form used for record lookups cannot
/// be sidestepped with padding.
const CODE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &CODE_ALPHABET,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("code is empty")]
    Empty,

    #[error("code is longer than {max} characters")]
    TooLong { max: usize },

    #[error("code is not valid base64")]
    Encoding,

    #[error("unsupported code version {0}")]
    Version(u8),

    #[error("code failed authentication")]
    Authentication,

    #[error("malformed code payload")]
    Payload,

    #[error("{field} exceeds {max} bytes")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("encryption failed")]
    Encryption,

    #[error("generated code did not decode to the same license")]
    RoundTrip,
}

/// Encodes license claims into activation codes and back.
///
/// Cheap to clone; holds only the derived key.
#[derive(Clone)]
pub struct CodeCodec {
    key: [u8; 32],
}

impl CodeCodec {
    /// Derive the code cipher key from the shared activation secret.
    pub fn from_secret(secret: &str) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(b"activation-code-v1"), secret.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(b"code-cipher", &mut key)
            .expect("HKDF expand should not fail with valid length");
        Self { key }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::from_secret(&config.activation_secret)
    }

    /// Seal the claims into a display-formatted code.
    ///
    /// Fails at generation time if a field is over its bound or the result
    /// would not fit `MAX_CODE_LEN`; the returned code is verified to decode
    /// back to `claims`.
    pub fn encode(&self, claims: &LicenseClaims) -> Result<String, CodecError> {
        let plaintext = serialize_claims(claims)?;

        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CodecError::Encryption)?;

        let nonce_bytes = {
            use rand::RngCore;
            use rand::rngs::OsRng;
            let mut bytes = [0u8; NONCE_SIZE];
            OsRng.fill_bytes(&mut bytes);
            bytes
        };
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: &plaintext,
                    aad: &[CODE_VERSION],
                },
            )
            .map_err(|_| CodecError::Encryption)?;

        let mut sealed = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        sealed.push(CODE_VERSION);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        let encoded = CODE_BASE64.encode(&sealed);
        if encoded.len() > MAX_ENCODED_LEN {
            return Err(CodecError::TooLong { max: MAX_CODE_LEN });
        }

        let code = format_code(&encoded);

        if self.decode(&code)? != *claims {
            return Err(CodecError::RoundTrip);
        }

        Ok(code)
    }

    /// Recover the claims from a code, tolerating separators and whitespace.
    pub fn decode(&self, code: &str) -> Result<LicenseClaims, CodecError> {
        let cleaned = clean_code(code);
        if cleaned.is_empty() {
            return Err(CodecError::Empty);
        }
        if cleaned.len() > MAX_ENCODED_LEN {
            return Err(CodecError::TooLong { max: MAX_CODE_LEN });
        }

        let sealed = CODE_BASE64
            .decode(cleaned.as_bytes())
            .map_err(|_| CodecError::Encoding)?;

        if sealed.len() < 1 + NONCE_SIZE + TAG_SIZE {
            return Err(CodecError::Payload);
        }
        if sealed[0] != CODE_VERSION {
            return Err(CodecError::Version(sealed[0]));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| CodecError::Encryption)?;
        let nonce = Nonce::from_slice(&sealed[1..1 + NONCE_SIZE]);
        let plaintext = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &sealed[1 + NONCE_SIZE..],
                    aad: &[CODE_VERSION],
                },
            )
            .map_err(|_| CodecError::Authentication)?;

        deserialize_claims(&plaintext)
    }
}

/// Strip separators and whitespace left over from transcription.
pub fn clean_code(code: &str) -> String {
    code.chars()
        .filter(|c| *c != SEPARATOR && !c.is_whitespace())
        .collect()
}

/// Split an encoded code into dash-separated groups of `GROUP_SIZE`.
pub fn format_code(encoded: &str) -> String {
    let mut formatted = String::with_capacity(encoded.len() + encoded.len() / GROUP_SIZE);
    for (i, c) in encoded.chars().enumerate() {
        if i > 0 && i % GROUP_SIZE == 0 {
            formatted.push(SEPARATOR);
        }
        formatted.push(c);
    }
    formatted
}

/// Canonical display form of a user-supplied code, used for lookups.
pub fn normalize_code(code: &str) -> String {
    format_code(&clean_code(code))
}

/// First display group of a code, safe to log.
pub fn code_prefix(code: &str) -> &str {
    code.split(SEPARATOR).next().unwrap_or_default()
}

fn tier_byte(tier: Tier) -> u8 {
    match tier {
        Tier::Personal => 0,
        Tier::Business => 1,
        Tier::Enterprise => 2,
    }
}

fn tier_from_byte(byte: u8) -> Result<Tier, CodecError> {
    match byte {
        0 => Ok(Tier::Personal),
        1 => Ok(Tier::Business),
        2 => Ok(Tier::Enterprise),
        _ => Err(CodecError::Payload),
    }
}

fn serialize_claims(claims: &LicenseClaims) -> Result<Vec<u8>, CodecError> {
    let subscriber = claims.subscriber.as_bytes();
    let purchase_ref = claims.purchase_ref.as_deref().unwrap_or_default().as_bytes();

    if subscriber.len() > MAX_SUBSCRIBER_LEN {
        return Err(CodecError::FieldTooLong {
            field: "subscriber",
            max: MAX_SUBSCRIBER_LEN,
        });
    }
    if purchase_ref.len() > MAX_PURCHASE_REF_LEN {
        return Err(CodecError::FieldTooLong {
            field: "purchase_ref",
            max: MAX_PURCHASE_REF_LEN,
        });
    }

    let mut out = Vec::with_capacity(FIXED_PLAINTEXT_LEN + subscriber.len() + purchase_ref.len());
    out.push(tier_byte(claims.tier));
    out.extend_from_slice(&claims.issued_at.to_be_bytes());
    out.extend_from_slice(&claims.expires_at.to_be_bytes());
    out.extend_from_slice(&claims.max_devices.to_be_bytes());
    out.push(subscriber.len() as u8);
    out.extend_from_slice(subscriber);
    out.push(purchase_ref.len() as u8);
    out.extend_from_slice(purchase_ref);
    Ok(out)
}

/// Cursor over a decrypted payload.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() < n {
            return Err(CodecError::Payload);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let [len] = self.array::<1>()?;
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::Payload)
    }
}

fn deserialize_claims(plaintext: &[u8]) -> Result<LicenseClaims, CodecError> {
    let mut reader = Reader { buf: plaintext };

    let [tier] = reader.array::<1>()?;
    let tier = tier_from_byte(tier)?;
    let issued_at = i64::from_be_bytes(reader.array()?);
    let expires_at = i64::from_be_bytes(reader.array()?);
    let max_devices = u32::from_be_bytes(reader.array()?);
    let subscriber = reader.string()?;
    let purchase_ref = reader.string()?;

    if !reader.buf.is_empty() {
        return Err(CodecError::Payload);
    }

    Ok(LicenseClaims {
        subscriber,
        tier,
        issued_at,
        expires_at,
        max_devices,
        purchase_ref: (!purchase_ref.is_empty()).then_some(purchase_ref),
    })
}
