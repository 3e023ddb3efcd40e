use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{BlobError, BlobResult};

/// Hash algorithms a digest may be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    Sha256,
}

impl Algorithm {
    pub fn tag(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
        }
    }

    /// Length of the hex encoding.
    pub fn hex_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "sha256" => Some(Algorithm::Sha256),
            _ => None,
        }
    }
}

/// Content identity: `<algorithm>:<lowercase hex>`.
///
/// Equality is equality of the canonical string.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    /// Parse `sha256:<64 hex>`.
    pub fn parse(raw: &str) -> BlobResult<Self> {
        let (tag, hex) = raw
            .split_once(':')
            .ok_or_else(|| BlobError::malformed_digest(raw, "missing algorithm tag"))?;

        let algorithm = Algorithm::from_tag(tag)
            .ok_or_else(|| BlobError::malformed_digest(raw, format!("unknown algorithm {tag:?}")))?;

        if hex.len() != algorithm.hex_len() {
            return Err(BlobError::malformed_digest(
                raw,
                format!("expected {} hex chars, got {}", algorithm.hex_len(), hex.len()),
            ));
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(BlobError::malformed_digest(raw, "hash must be lowercase hex"));
        }

        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    /// Digest of an in-memory buffer.
    pub fn of(algorithm: Algorithm, data: &[u8]) -> Self {
        let mut d = Digester::new(algorithm);
        d.update(data);
        d.finish()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Whether `data` hashes to this digest.
    pub fn verify(&self, data: &[u8]) -> bool {
        Digest::of(self.algorithm, data) == *self
    }

    /// Relative storage path: `<first two hex>/<hex>`.
    pub fn shard_path(&self) -> String {
        format!("{}/{}", &self.hex[..2], self.hex)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.tag(), self.hex)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm.tag(), &self.hex[..12])
    }
}

impl FromStr for Digest {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = BlobError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_string()
    }
}

/// Incremental hasher producing a [`Digest`].
pub struct Digester {
    algorithm: Algorithm,
    inner: Sha256,
}

impl Digester {
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Sha256 => Self {
                algorithm,
                inner: Sha256::new(),
            },
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finish(self) -> Digest {
        Digest {
            algorithm: self.algorithm,
            hex: hex::encode(self.inner.finalize()),
        }
    }
}
