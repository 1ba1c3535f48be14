// src/hash.rs

//! Checksums for downloaded archives
//!
//! Index documents may declare a digest for each archive. Two algorithms
//! are understood:
//! - **SHA-256**: the default, written as `sha256:<hex>` or bare 64-digit hex
//! - **SHA-1**: legacy indices, written as `sha1:<hex>`, bare 40-digit hex,
//!   or through the old `sha1` descriptor field

use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    /// Only kept for indices published before SHA-256 support
    Sha1,
}

impl HashAlgorithm {
    /// Get the hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha1 => 20,
        }
    }

    /// Get the hash output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Checksum parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    UnknownAlgorithm(String),
    InvalidLength { expected: usize, got: usize },
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown hash algorithm: {}", name),
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid hash length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

/// A digest value with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex
    pub value: String,
}

impl Checksum {
    /// Create a checksum, validating length and hex digits
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        let expected_len = algorithm.hex_len();

        if value.len() != expected_len {
            return Err(HashError::InvalidLength {
                expected: expected_len,
                got: value.len(),
            });
        }

        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value));
        }

        Ok(Self {
            algorithm,
            value: value.to_lowercase(),
        })
    }

    /// Parse `algo:hex` or bare hex
    ///
    /// Bare values are classified by length: 40 digits is SHA-1,
    /// anything else is validated as SHA-256.
    pub fn parse(s: &str) -> Result<Self, HashError> {
        let s = s.trim();
        if let Some((algo, hex)) = s.split_once(':') {
            return Self::new(algo.parse()?, hex);
        }
        if s.len() == HashAlgorithm::Sha1.hex_len() {
            Self::new(HashAlgorithm::Sha1, s)
        } else {
            Self::new(HashAlgorithm::Sha256, s)
        }
    }

    /// Format as `algo:hex`
    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm.name(), self.value)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_prefixed_string())
    }
}

/// Incremental hasher over either algorithm
pub struct Hasher {
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Sha1(Sha1),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
        };
        Self { state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(hasher) => hasher.update(data),
            HasherState::Sha1(hasher) => hasher.update(data),
        }
    }

    pub fn finalize(self) -> Checksum {
        let (algorithm, value) = match self.state {
            HasherState::Sha256(hasher) => (HashAlgorithm::Sha256, format!("{:x}", hasher.finalize())),
            HasherState::Sha1(hasher) => (HashAlgorithm::Sha1, format!("{:x}", hasher.finalize())),
        };
        Checksum { algorithm, value }
    }
}

/// Compute a checksum of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Checksum {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute a checksum of everything a reader yields
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<Checksum> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Verification result error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub expected: String,
    pub actual: String,
    pub algorithm: HashAlgorithm,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mismatch: expected {}, got {}",
            self.algorithm, self.expected, self.actual
        )
    }
}

impl std::error::Error for VerifyError {}

/// Verify a file against an expected checksum
///
/// Streams the file content to avoid loading it entirely into memory.
pub fn verify_file(path: &Path, expected: &Checksum) -> Result<(), VerifyError> {
    let algorithm = expected.algorithm;
    let mut file = std::fs::File::open(path).map_err(|_| VerifyError {
        expected: expected.value.clone(),
        actual: "<file read error>".to_string(),
        algorithm,
    })?;

    let actual = hash_reader(algorithm, &mut file).map_err(|_| VerifyError {
        expected: expected.value.clone(),
        actual: "<hash read error>".to_string(),
        algorithm,
    })?;

    if actual.value == expected.value {
        Ok(())
    } else {
        Err(VerifyError {
            expected: expected.value.clone(),
            actual: actual.value,
            algorithm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"hello world");
        assert_eq!(
            hash.value,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha1_known_value() {
        let hash = hash_bytes(HashAlgorithm::Sha1, b"hello world");
        assert_eq!(hash.value, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn test_parse_prefixed_and_bare() {
        let sha1 = Checksum::parse("sha1:2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED").unwrap();
        assert_eq!(sha1.algorithm, HashAlgorithm::Sha1);
        assert_eq!(sha1.value, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");

        let bare = Checksum::parse("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed").unwrap();
        assert_eq!(bare.algorithm, HashAlgorithm::Sha1);

        let sha256 = Checksum::parse(
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
        )
        .unwrap();
        assert_eq!(sha256.algorithm, HashAlgorithm::Sha256);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Checksum::parse("abc123"),
            Err(HashError::InvalidLength { .. })
        ));
        assert!(matches!(
            Checksum::parse("md5:00"),
            Err(HashError::UnknownAlgorithm(_))
        ));
        assert!(matches!(
            Checksum::parse("zzzz6c35c94fcfb415dbe95f408b9ce91ee846ed"),
            Err(HashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_hasher_incremental() {
        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), hash_bytes(HashAlgorithm::Sha256, b"hello world"));
    }

    #[test]
    fn test_verify_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), b"hello world").unwrap();

        let good = hash_bytes(HashAlgorithm::Sha1, b"hello world");
        assert!(verify_file(temp.path(), &good).is_ok());

        let bad = Checksum::new(HashAlgorithm::Sha1, "0".repeat(40)).unwrap();
        let err = verify_file(temp.path(), &bad).unwrap_err();
        assert_eq!(err.actual, good.value);
    }
}
