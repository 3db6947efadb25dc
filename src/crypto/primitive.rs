//! The adaptive Blowfish primitive, exposed through a `crypt`-style interface:
//! plaintext plus a setting string in, encoded hash out. A full encoded hash is
//! also a valid setting, which is what makes verification work.
//!
//! Call [`init`] once at startup. It runs a known-answer probe so a broken
//! backend is caught before any hash is produced or checked.

use std::sync::OnceLock;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use bcrypt::Version;
use thiserror::Error;
use tracing::{error, info};

use crate::crypto::salt::{ALGORITHM_TAG, ENCODED_SALT_LENGTH, SALT_LENGTH};
use crate::crypto::service::{MAX_COST, MIN_COST};

const PROBE_PLAINTEXT: &str = "rasmuslerdorf";
const PROBE_SETTING: &str = "$2y$07$usesomesillystringforsalt$";
const PROBE_EXPECTED: &str = "$2y$07$usesomesillystringfore2uDLvp1Ii2e./U9C8sBjqp8I90dH6hi";

// The last salt character carries 4 bits that bcrypt ignores.
const BCRYPT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::BCRYPT,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

static CAPABILITY: OnceLock<Result<(), PrimitiveError>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    #[error("malformed setting: {0}")]
    InvalidSetting(String),
    #[error("unsupported algorithm tag: {0}")]
    UnsupportedTag(String),
    #[error("invalid cost: {0}")]
    InvalidCost(String),
    #[error("bcrypt backend failed: {0}")]
    Backend(String),
    #[error("blowfish hashing is unavailable: {0}")]
    Unavailable(String),
}

/// Capability of hashing a plaintext under a `$tag$cost$salt` setting.
pub trait CryptPrimitive: Send + Sync {
    fn crypt(&self, plaintext: &[u8], setting: &str) -> Result<String, PrimitiveError>;
}

/// `$2y$` bcrypt backed by the `bcrypt` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct BcryptPrimitive;

impl CryptPrimitive for BcryptPrimitive {
    fn crypt(&self, plaintext: &[u8], setting: &str) -> Result<String, PrimitiveError> {
        let (cost, salt) = parse_setting(setting)?;
        let parts = bcrypt::hash_with_salt(plaintext, cost, salt)
            .map_err(|e| PrimitiveError::Backend(format!("{e}")))?;
        Ok(parts.format_for_version(Version::TwoY))
    }
}

/// Splits `$2y$NN$<salt>[digest]` into cost and raw salt bytes. Anything past
/// the 22 salt characters is ignored.
fn parse_setting(setting: &str) -> Result<(u32, [u8; SALT_LENGTH]), PrimitiveError> {
    let rest = setting
        .strip_prefix('$')
        .ok_or_else(|| PrimitiveError::InvalidSetting("missing leading '$'".to_string()))?;
    let (tag, rest) = rest
        .split_once('$')
        .ok_or_else(|| PrimitiveError::InvalidSetting("missing algorithm tag".to_string()))?;
    if tag != ALGORITHM_TAG {
        return Err(PrimitiveError::UnsupportedTag(tag.to_string()));
    }

    let (cost, encoded_salt) = rest
        .split_once('$')
        .ok_or_else(|| PrimitiveError::InvalidSetting("missing cost".to_string()))?;
    if cost.len() != 2 || !cost.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PrimitiveError::InvalidCost(cost.to_string()));
    }
    let cost: u32 = cost
        .parse()
        .map_err(|_| PrimitiveError::InvalidCost(cost.to_string()))?;
    if !(MIN_COST..=MAX_COST).contains(&cost) {
        return Err(PrimitiveError::InvalidCost(cost.to_string()));
    }

    let encoded_salt = encoded_salt.get(..ENCODED_SALT_LENGTH).ok_or_else(|| {
        PrimitiveError::InvalidSetting(format!("salt shorter than {ENCODED_SALT_LENGTH} characters"))
    })?;
    let decoded = BCRYPT_BASE64
        .decode(encoded_salt)
        .map_err(|e| PrimitiveError::InvalidSetting(format!("salt is not bcrypt base64: {e}")))?;
    let salt: [u8; SALT_LENGTH] = decoded
        .try_into()
        .map_err(|_| PrimitiveError::InvalidSetting("salt decodes to the wrong length".to_string()))?;

    Ok((cost, salt))
}

/// Runs the known-answer vector through `primitive`.
pub fn probe(primitive: &dyn CryptPrimitive) -> Result<(), PrimitiveError> {
    let output = primitive
        .crypt(PROBE_PLAINTEXT.as_bytes(), PROBE_SETTING)
        .map_err(|e| PrimitiveError::Unavailable(format!("known-answer probe failed: {e}")))?;
    if output != PROBE_EXPECTED {
        return Err(PrimitiveError::Unavailable(format!(
            "known-answer probe produced {output}"
        )));
    }
    Ok(())
}

/// One-time process-wide capability check for [`BcryptPrimitive`]. Later calls
/// return the cached outcome.
pub fn init() -> Result<(), PrimitiveError> {
    CAPABILITY
        .get_or_init(|| {
            let outcome = probe(&BcryptPrimitive);
            match &outcome {
                Ok(()) => info!("bcrypt primitive passed the known-answer probe"),
                Err(err) => error!(error = %err, "bcrypt primitive failed the known-answer probe"),
            }
            outcome
        })
        .clone()
}

/// True once [`init`] has run and the probe passed.
pub fn is_initialized() -> bool {
    matches!(CAPABILITY.get(), Some(Ok(())))
}
