//! Entropy acquisition for salts. Sources are tried in order and the first one
//! that hands back exactly the requested number of bytes wins:
//! - the operating system RNG
//! - a readable entropy device such as `/dev/urandom`
//! - a SHA-256 chain over a clock/pid seeded PRNG, which always succeeds

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::crypto::service::HashingError;

/// Entropy device read by the second tier unless configured otherwise.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/urandom";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single candidate in the entropy fallback chain.
pub trait EntropySource: Send + Sync {
    /// Short label used in logs and in `HashingError::EntropyUnavailable`.
    fn name(&self) -> &'static str;

    /// Returns `length` bytes, or an error if this source cannot supply them.
    fn try_acquire(&self, length: usize) -> Result<Vec<u8>, SourceError>;
}

/// Operating system CSPRNG (`getrandom` and friends).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandomSource;

impl EntropySource for OsRandomSource {
    fn name(&self) -> &'static str {
        "os-random"
    }

    fn try_acquire(&self, length: usize) -> Result<Vec<u8>, SourceError> {
        let mut buffer = vec![0u8; length];
        OsRng
            .try_fill_bytes(&mut buffer)
            .map_err(|e| SourceError::Unavailable(format!("{e}")))?;
        Ok(buffer)
    }
}

/// Reads raw bytes from a character device. The handle only lives for the
/// duration of one `try_acquire` call.
#[derive(Debug, Clone)]
pub struct DeviceSource {
    path: PathBuf,
}

impl DeviceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for DeviceSource {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_PATH)
    }
}

impl EntropySource for DeviceSource {
    fn name(&self) -> &'static str {
        "device"
    }

    fn try_acquire(&self, length: usize) -> Result<Vec<u8>, SourceError> {
        let mut device = File::open(&self.path)?;
        let mut buffer = vec![0u8; length];
        let mut filled = 0;

        while filled < length {
            match device.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    buffer.zeroize();
                    return Err(e.into());
                }
            }
        }

        if filled < length {
            buffer.zeroize();
            return Err(SourceError::ShortRead {
                expected: length,
                actual: filled,
            });
        }
        Ok(buffer)
    }
}

/// Last-resort source: a PRNG seeded from the clock and process id, stretched
/// through a SHA-256 chain. Each round replaces the seed with
/// `SHA-256(next_u32 || seed)` and appends `SHA-256(seed)` to the output.
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestChainSource {
    fixed_seed: Option<u64>,
}

impl DigestChainSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic variant, only useful for reproducing output in tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            fixed_seed: Some(seed),
        }
    }

    fn rng_seed(&self) -> u64 {
        if let Some(seed) = self.fixed_seed {
            return seed;
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        nanos ^ (u64::from(std::process::id()) << 32)
    }
}

impl EntropySource for DigestChainSource {
    fn name(&self) -> &'static str {
        "digest-chain"
    }

    fn try_acquire(&self, length: usize) -> Result<Vec<u8>, SourceError> {
        let mut rng = StdRng::seed_from_u64(self.rng_seed());
        let mut seed = format!("{}{}", rng.next_u32(), std::process::id()).into_bytes();
        let mut output = Vec::with_capacity(length + 32);

        while output.len() < length {
            let mut hasher = Sha256::new();
            hasher.update(rng.next_u32().to_string().as_bytes());
            hasher.update(&seed);
            seed.zeroize();
            seed = hasher.finalize().to_vec();
            output.extend_from_slice(&Sha256::digest(&seed));
        }

        seed.zeroize();
        output.truncate(length);
        Ok(output)
    }
}

/// Ordered fallback chain of entropy sources.
pub struct TieredEntropy {
    sources: Vec<Box<dyn EntropySource>>,
}

impl TieredEntropy {
    pub fn new(sources: Vec<Box<dyn EntropySource>>) -> Self {
        Self { sources }
    }

    /// The default chain, with the device tier reading from `path`.
    pub fn with_device(path: impl Into<PathBuf>) -> Self {
        Self::new(vec![
            Box::new(OsRandomSource),
            Box::new(DeviceSource::new(path)),
            Box::new(DigestChainSource::new()),
        ])
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    /// Returns exactly `length` bytes from the first source able to supply
    /// them. Sources returning the wrong number of bytes count as failures.
    pub fn acquire(&self, length: usize) -> Result<Vec<u8>, HashingError> {
        if self.sources.is_empty() {
            return Err(HashingError::EntropyUnavailable {
                attempted: Vec::new(),
            });
        }
        if length == 0 {
            return Ok(Vec::new());
        }

        let mut attempted = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.try_acquire(length) {
                Ok(bytes) if bytes.len() == length => {
                    debug!(source = source.name(), length, "entropy acquired");
                    return Ok(bytes);
                }
                Ok(mut bytes) => {
                    warn!(
                        source = source.name(),
                        expected = length,
                        actual = bytes.len(),
                        "entropy source returned the wrong length"
                    );
                    bytes.zeroize();
                }
                Err(err) => {
                    warn!(source = source.name(), error = %err, "entropy source failed");
                }
            }
            attempted.push(source.name().to_string());
        }

        Err(HashingError::EntropyUnavailable { attempted })
    }
}

impl Default for TieredEntropy {
    fn default() -> Self {
        Self::with_device(DEFAULT_DEVICE_PATH)
    }
}

impl std::fmt::Debug for TieredEntropy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredEntropy")
            .field("sources", &self.source_names())
            .finish()
    }
}
