//! Provider UIDs
//!
//! A UID is a fixed 32-character string: the 3-character site prefix followed
//! by the unpadded URL-safe base64 of the login name, padded out with a
//! site-keyed SHA-256 hex digest. Names whose encoding would leave fewer than
//! 10 digest characters are represented by the digest alone and can only be
//! recovered through the reverse index. The index learns every UID this
//! process hands out and is rebuilt from the directory on a miss, at most
//! once per rebuild interval.

use account_service::LedgerStore;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Total UID length
pub const UID_LEN: usize = 32;

/// Length of the site prefix
pub const PREFIX_LEN: usize = 3;

/// Characters left after the prefix
const BUDGET: usize = UID_LEN - PREFIX_LEN;

/// Minimum digest characters kept after an encoded name
const MIN_PADDING: usize = 10;

/// Shortest encoded prefix worth decoding
const MIN_CANDIDATE: usize = 4;

/// Default minimum time between two full index rebuilds
pub const DEFAULT_REBUILD_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Derive the UID for `user_name`
pub fn generate_uid(prefix: &str, site_url: &str, user_name: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(user_name.as_bytes());
    let digest = sha256_hex(&format!("{}{}", user_name, site_url));

    if encoded.len() > BUDGET - MIN_PADDING {
        format!("{}{}", prefix, &digest[..BUDGET])
    } else {
        format!("{}{}{}", prefix, encoded, &digest[..BUDGET - encoded.len()])
    }
}

/// Decode a base64url candidate, restoring padding and dropping non-printable bytes
fn decode_candidate(candidate: &str) -> Option<String> {
    let padding = match candidate.len() % 4 {
        0 => "",
        2 => "==",
        3 => "=",
        _ => return None,
    };
    let bytes = URL_SAFE.decode(format!("{}{}", candidate, padding)).ok()?;
    let printable: String =
        bytes.into_iter().filter(|b| (0x20..=0x7E).contains(b)).map(char::from).collect();
    if printable.is_empty() {
        None
    } else {
        Some(printable)
    }
}

/// Maps UIDs back to login names
pub struct UidResolver {
    directory: Arc<dyn LedgerStore>,
    prefix: String,
    site_url: String,
    index: DashMap<String, String>,
    /// Time of the last full rebuild
    rebuild: Mutex<Option<Instant>>,
    rebuild_interval: Duration,
}

impl std::fmt::Debug for UidResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UidResolver")
            .field("prefix", &self.prefix)
            .field("indexed", &self.index.len())
            .finish()
    }
}

impl UidResolver {
    pub fn new(
        directory: Arc<dyn LedgerStore>,
        prefix: impl Into<String>,
        site_url: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            prefix: prefix.into(),
            site_url: site_url.into(),
            index: DashMap::new(),
            rebuild: Mutex::new(None),
            rebuild_interval: DEFAULT_REBUILD_INTERVAL,
        }
    }

    pub fn with_rebuild_interval(mut self, rebuild_interval: Duration) -> Self {
        self.rebuild_interval = rebuild_interval;
        self
    }

    /// UID for `user_name`, remembered so it resolves without a rebuild
    pub fn generate(&self, user_name: &str) -> String {
        let uid = generate_uid(&self.prefix, &self.site_url, user_name);
        self.index.insert(uid.clone(), user_name.to_string());
        uid
    }

    async fn exists(&self, user_name: &str) -> account_service::Result<bool> {
        Ok(self.directory.find_by_name(user_name).await?.is_some())
    }

    /// Resolve a UID to the login name of an existing account
    pub async fn resolve(&self, uid: &str) -> account_service::Result<Option<String>> {
        let rest = match uid.strip_prefix(self.prefix.as_str()) {
            Some(rest) if uid.len() == UID_LEN && rest.is_ascii() => rest,
            _ => return Ok(None),
        };

        for len in (MIN_CANDIDATE..=rest.len()).rev() {
            if let Some(name) = decode_candidate(&rest[..len]) {
                if self.exists(&name).await? {
                    return Ok(Some(name));
                }
            }
        }

        if let Some(name) = self.lookup_index(uid).await? {
            return Ok(Some(name));
        }

        if self.rebuild_index().await? {
            self.lookup_index(uid).await
        } else {
            Ok(None)
        }
    }

    async fn lookup_index(&self, uid: &str) -> account_service::Result<Option<String>> {
        let name = match self.index.get(uid) {
            Some(name) => name.value().clone(),
            None => return Ok(None),
        };
        if self.exists(&name).await? {
            Ok(Some(name))
        } else {
            self.index.remove(uid);
            Ok(None)
        }
    }

    /// Regenerate the UID of every account, unless that happened within the
    /// rebuild interval; returns whether a rebuild ran
    async fn rebuild_index(&self) -> account_service::Result<bool> {
        let mut last = self.rebuild.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < self.rebuild_interval {
                return Ok(false);
            }
        }

        let names = self.directory.list_user_names().await?;
        self.index.clear();
        for name in names {
            self.index.insert(generate_uid(&self.prefix, &self.site_url, &name), name);
        }
        *last = Some(Instant::now());
        tracing::debug!("Rebuilt UID index with {} accounts", self.index.len());
        Ok(true)
    }
}
