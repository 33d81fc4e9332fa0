//! Verification caches.
//!
//! - [`CredentialCache`]: access key to credential snapshot, expired after a
//!   fixed TTL. A credential disabled or re-roled at the store keeps its old
//!   snapshot here until the entry expires; that bounded staleness is the
//!   price of not hitting the store on every request.
//! - [`SignatureCache`]: memoized signatures keyed by every signing input,
//!   with LRU eviction. Always agrees with recomputation. The body enters
//!   the key as a SHA-256 digest, so a full cache holds at most `capacity`
//!   copies of params and headers plus 32 bytes per body.
//!
//! Both are shared across request tasks. Locks cover single get/insert
//! calls only, never a store read or an HMAC computation. Two tasks missing
//! on the same key both compute and both insert; the values are identical.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cached::{Cached, SizedCache};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use super::models::Credential;
use super::signer::{SignError, SignedRequest, compute_signature};
use super::store::{CredentialStore, StoreError};

/// Default lifetime of a credential snapshot.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(180);

/// Default number of memoized signatures.
pub const DEFAULT_SIGNATURE_CAPACITY: usize = 128;

struct CachedCredential {
    credential: Arc<Credential>,
    expires_at: Instant,
}

impl CachedCredential {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Time-bounded read-through cache of credential lookups.
pub struct CredentialCache {
    entries: DashMap<String, CachedCredential>,
    ttl: Duration,
    stats: CacheStats,
}

impl CredentialCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stats: CacheStats::default(),
        }
    }

    /// Snapshot for `access_key` if present and not expired.
    pub fn get(&self, access_key: &str) -> Option<Arc<Credential>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(access_key) {
            if !entry.is_expired(now) {
                return Some(Arc::clone(&entry.credential));
            }
        }
        // Only drop the entry we saw; a concurrent refresh may have replaced it.
        self.entries
            .remove_if(access_key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn insert(&self, credential: Arc<Credential>) {
        let entry = CachedCredential {
            expires_at: Instant::now() + self.ttl,
            credential,
        };
        self.entries
            .insert(entry.credential.access_key.clone(), entry);
    }

    /// Read through to `store` on a miss.
    ///
    /// Absent keys and store errors are not cached, so a credential
    /// registered after a failed lookup is visible on the next request.
    pub async fn load(
        &self,
        access_key: &str,
        store: &dyn CredentialStore,
    ) -> Result<Option<Arc<Credential>>, StoreError> {
        if let Some(credential) = self.get(access_key) {
            self.stats.hit();
            tracing::debug!(access_key, "[cache] credential hit");
            return Ok(Some(credential));
        }

        self.stats.miss();
        tracing::debug!(access_key, "[cache] credential miss, reading store");
        let Some(credential) = store.find_by_access_key(access_key).await? else {
            return Ok(None);
        };
        let credential = Arc::new(credential);
        self.insert(Arc::clone(&credential));
        Ok(Some(credential))
    }

    /// Drop the snapshot for one key.
    pub fn invalidate(&self, access_key: &str) {
        self.entries.remove(access_key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIAL_TTL)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct SignatureKey {
    access_key: String,
    secret_key: String,
    params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body_digest: [u8; 32],
}

impl SignatureKey {
    fn new(access_key: &str, secret_key: &str, request: &SignedRequest) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            params: request.params().clone(),
            headers: request.headers().clone(),
            body_digest: Sha256::digest(request.body_bytes()).into(),
        }
    }
}

/// Capacity-bounded LRU memo of [`compute_signature`].
pub struct SignatureCache {
    entries: Mutex<SizedCache<SignatureKey, String>>,
    stats: CacheStats,
}

impl SignatureCache {
    /// Create a cache holding at most `capacity` signatures (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(SizedCache::with_size(capacity.max(1))),
            stats: CacheStats::default(),
        }
    }

    /// Return the memoized signature or compute and remember it.
    pub fn get_or_compute(
        &self,
        access_key: &str,
        secret_key: &str,
        request: &SignedRequest,
    ) -> Result<String, SignError> {
        let key = SignatureKey::new(access_key, secret_key, request);

        let cached = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cache_get(&key)
            .cloned();
        if let Some(signature) = cached {
            self.stats.hit();
            return Ok(signature);
        }

        self.stats.miss();
        let signature = compute_signature(access_key, secret_key, request)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cache_set(key, signature.clone());
        Ok(signature)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cache_clear();
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNATURE_CAPACITY)
    }
}
