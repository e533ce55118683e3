//! Hash-based sharding of a queue's mails.
//!
//! The bucket of a mail is derived from a SHA-256 digest of its key, so the
//! assignment is identical across processes, platforms and releases. Process
//! seeded hashers (`ahash`, `std`'s `RandomState`) must not be used here.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::MailKey;

/// A shard of a queue, in `[0, bucket_count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(u32);

impl BucketId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Every bucket of a queue with `bucket_count` buckets, ascending
    pub fn all(bucket_count: u32) -> impl Iterator<Item = Self> + Clone {
        (0..bucket_count.max(1)).map(Self)
    }
}

impl std::fmt::Display for BucketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed 64-bit hash of a key: the first eight bytes of its SHA-256 digest
fn key_hash(key: &MailKey) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(prefix)
}

/// Assign `key` to one of `bucket_count` buckets.
///
/// A `bucket_count` of zero is treated as one.
#[must_use]
pub fn bucket_of(key: &MailKey, bucket_count: u32) -> BucketId {
    let count = i64::from(bucket_count.max(1));

    // rem_euclid keeps negative hashes in [0, count)
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bucket = key_hash(key).rem_euclid(count) as u32;

    BucketId(bucket)
}
