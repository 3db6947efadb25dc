//! Salted bcrypt hashing service.
//! A service is built once per cost and reused; it holds no mutable state, so a
//! single instance can be shared across threads.

use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroize;

use crate::crypto::entropy::TieredEntropy;
use crate::crypto::primitive::{BcryptPrimitive, CryptPrimitive, PrimitiveError};
use crate::crypto::salt::{self, SALT_LENGTH};

pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;
pub const DEFAULT_COST: u32 = 10;

#[derive(Debug, Error)]
pub enum HashingError {
    #[error("invalid cost {0}; please use a number between 4 and 31")]
    InvalidCost(u32),
    #[error("no entropy source could supply salt bytes (tried: {})", .attempted.join(", "))]
    EntropyUnavailable { attempted: Vec<String> },
    #[error("crypt primitive failed: {0}")]
    Primitive(#[from] PrimitiveError),
}

pub struct HashingService {
    cost: u32,
    entropy: TieredEntropy,
    primitive: Box<dyn CryptPrimitive>,
}

impl HashingService {
    /// Builds a service with the default entropy chain and the bcrypt backend.
    pub fn new(cost: u32) -> Result<Self, HashingError> {
        Self::with_parts(cost, TieredEntropy::default(), Box::new(BcryptPrimitive))
    }

    pub fn with_parts(
        cost: u32,
        entropy: TieredEntropy,
        primitive: Box<dyn CryptPrimitive>,
    ) -> Result<Self, HashingError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(HashingError::InvalidCost(cost));
        }
        Ok(Self {
            cost,
            entropy,
            primitive,
        })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hashes `value` under a fresh 16-byte salt. The returned string embeds
    /// tag, cost, salt, and digest, so it can later be passed to [`check`].
    /// Only the first 72 bytes of `value` are significant, as with any bcrypt.
    ///
    /// [`check`]: HashingService::check
    pub fn hash(&self, value: &str) -> Result<String, HashingError> {
        let mut salt_bytes = self.entropy.acquire(SALT_LENGTH)?;
        let setting = salt::setting(self.cost, &salt_bytes);
        salt_bytes.zeroize();

        Ok(self.primitive.crypt(value.as_bytes(), &setting)?)
    }

    /// Returns true when `value` rehashes to exactly `hash`. Malformed hashes
    /// are a mismatch, not an error. The final comparison runs in constant time.
    pub fn check(&self, value: &str, hash: &str) -> bool {
        match self.primitive.crypt(value.as_bytes(), hash) {
            Ok(computed) => computed.as_bytes().ct_eq(hash.as_bytes()).into(),
            Err(err) => {
                debug!(error = %err, "hash rejected by crypt primitive");
                false
            }
        }
    }
}

impl Default for HashingService {
    fn default() -> Self {
        Self {
            cost: DEFAULT_COST,
            entropy: TieredEntropy::default(),
            primitive: Box::new(BcryptPrimitive),
        }
    }
}

impl std::fmt::Debug for HashingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashingService")
            .field("cost", &self.cost)
            .field("entropy", &self.entropy)
            .finish_non_exhaustive()
    }
}
