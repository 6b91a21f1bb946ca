//! Concurrent user store with optional JSON persistence.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{LimiterConfig, StoreConfig};
use crate::error::BalancerError;
use crate::observability::metrics;
use crate::security::rate_limit::TokenBucket;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Unknown user: {0}")]
    UnknownUser(String),
}

/// A registered user as stored and persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    /// Hex SHA-512/256 of the API key; the key itself is never stored.
    pub api_key_hash: String,
    #[serde(flatten)]
    pub bucket: TokenBucket,
}

/// Identity attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub name: String,
}

/// Public view of a user's token settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub capacity: i64,
    pub rate_per_sec: i64,
    pub current_capacity: i64,
}

impl From<&UserRecord> for Profile {
    fn from(record: &UserRecord) -> Self {
        Self {
            name: record.name.clone(),
            capacity: record.bucket.capacity,
            rate_per_sec: record.bucket.rate_per_sec,
            current_capacity: record.bucket.current_capacity,
        }
    }
}

/// Response for a freshly registered user. The only place the API key is revealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedUser {
    pub name: String,
    pub capacity: i64,
    pub rate_per_sec: i64,
    pub api_key: String,
}

/// Thread-safe user registry.
#[derive(Debug)]
pub struct UserStore {
    /// name -> record
    users: DashMap<String, UserRecord>,
    /// api key -> name
    keys: DashMap<String, String>,
    default_capacity: i64,
    default_rate_per_sec: i64,
    persistence_path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl UserStore {
    /// Create an empty, in-memory store.
    pub fn new(limiter: &LimiterConfig) -> Self {
        Self {
            users: DashMap::new(),
            keys: DashMap::new(),
            default_capacity: limiter.default_capacity,
            default_rate_per_sec: limiter.default_rate_per_sec,
            persistence_path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Open the store described by `config`, loading existing users if the file exists.
    pub fn open(config: &StoreConfig, limiter: &LimiterConfig) -> Result<Self, StoreError> {
        let mut store = Self::new(limiter);
        if let Some(path) = &config.persistence_path {
            store.persistence_path = Some(path.clone());
            if path.exists() {
                store.load_from(path)?;
            }
        }
        Ok(store)
    }

    fn load_from(&self, path: &Path) -> Result<(), StoreError> {
        let reader = BufReader::new(File::open(path)?);
        let records: Vec<UserRecord> = serde_json::from_reader(reader)?;
        for record in records {
            self.keys.insert(record.api_key_hash.clone(), record.name.clone());
            self.users.insert(record.name.clone(), record);
        }
        metrics::record_user_count(self.users.len());
        tracing::info!(path = %path.display(), users = self.users.len(), "Loaded users");
        Ok(())
    }

    /// Write a snapshot of all users to the persistence file, if any.
    ///
    /// The snapshot is taken under the write lock, so the last writer always
    /// writes the newest state. The file is replaced atomically by rename.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let records: Vec<UserRecord> = self.users.iter().map(|r| r.value().clone()).collect();

        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &records)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), users = records.len(), "Saved users");
        Ok(())
    }

    /// Register a new user with a full default bucket.
    pub fn create_user(&self, name: &str) -> Result<CreatedUser, BalancerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BalancerError::MalformedRequest("name must not be empty".into()));
        }

        let api_key = Uuid::new_v4().to_string();
        let api_key_hash = hash_key(&api_key);
        let bucket = TokenBucket::new(self.default_capacity, self.default_rate_per_sec);
        match self.users.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(BalancerError::UserExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(UserRecord {
                    name: name.to_string(),
                    api_key_hash: api_key_hash.clone(),
                    bucket,
                });
            }
        }
        self.keys.insert(api_key_hash.clone(), name.to_string());

        if let Err(e) = self.save() {
            self.keys.remove(&api_key_hash);
            self.users.remove(name);
            return Err(e.into());
        }

        metrics::record_user_count(self.users.len());
        tracing::info!(user = %name, "User created");
        Ok(CreatedUser {
            name: name.to_string(),
            capacity: bucket.capacity,
            rate_per_sec: bucket.rate_per_sec,
            api_key,
        })
    }

    /// Resolve an API key to a user.
    pub fn authenticate(&self, api_key: &str) -> Result<AuthenticatedUser, BalancerError> {
        self.keys
            .get(&hash_key(api_key))
            .map(|name| AuthenticatedUser {
                name: name.value().clone(),
            })
            .ok_or(BalancerError::AuthFailure)
    }

    pub fn profile(&self, name: &str) -> Result<Profile, BalancerError> {
        self.users
            .get(name)
            .map(|record| Profile::from(record.value()))
            .ok_or(BalancerError::AuthFailure)
    }

    /// Admission test against the user's live bucket.
    pub fn check_can_request(&self, name: &str) -> Result<(), BalancerError> {
        let record = self.users.get(name).ok_or(BalancerError::AuthFailure)?;
        record.bucket.check_can_request()
    }

    /// Consume one token after a forwarded request.
    pub fn request_done(&self, name: &str) -> Result<(), BalancerError> {
        let mut record = self
            .users
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownUser(name.to_string()))?;
        record.bucket.consume();
        Ok(())
    }

    /// Replace a user's capacity and rate and persist the change.
    pub fn change_tokens(
        &self,
        name: &str,
        capacity: i64,
        rate_per_sec: i64,
    ) -> Result<Profile, BalancerError> {
        let (profile, previous) = {
            let mut record = self.users.get_mut(name).ok_or(BalancerError::AuthFailure)?;
            let previous = record.bucket;
            record.bucket.change(capacity, rate_per_sec)?;
            (Profile::from(record.value()), previous)
        };

        if let Err(e) = self.save() {
            if let Some(mut record) = self.users.get_mut(name) {
                record.bucket.capacity = previous.capacity;
                record.bucket.rate_per_sec = previous.rate_per_sec;
            }
            return Err(e.into());
        }

        tracing::info!(user = %name, capacity, rate_per_sec, "Tokens changed");
        Ok(profile)
    }

    /// Refill every bucket. Returns the number of users touched.
    pub fn refill_all(&self) -> usize {
        let mut count = 0;
        for mut record in self.users.iter_mut() {
            record.bucket.refill();
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn set_current_capacity(&self, name: &str, value: i64) {
        if let Some(mut record) = self.users.get_mut(name) {
            record.bucket.current_capacity = value;
        }
    }
}

fn hash_key(api_key: &str) -> String {
    format!("{:x}", Sha512_256::digest(api_key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> UserStore {
        UserStore::new(&LimiterConfig::default())
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cloud-balancer-{tag}-{}.json", Uuid::new_v4()))
    }

    #[test]
    fn create_and_authenticate() {
        let store = store();
        let created = store.create_user("alice").unwrap();
        assert_eq!(created.capacity, 5);
        assert_eq!(created.rate_per_sec, 1);

        let user = store.authenticate(&created.api_key).unwrap();
        assert_eq!(user.name, "alice");
        assert!(matches!(store.authenticate("nope"), Err(BalancerError::AuthFailure)));
    }

    #[test]
    fn duplicate_name_rejected() {
        let store = store();
        store.create_user("bob").unwrap();
        assert!(matches!(
            store.create_user("bob"),
            Err(BalancerError::UserExists(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_name_rejected() {
        assert!(matches!(
            store().create_user("  "),
            Err(BalancerError::MalformedRequest(_))
        ));
    }

    #[test]
    fn request_done_drains_and_floors() {
        let store = store();
        store.create_user("carol").unwrap();
        for _ in 0..7 {
            store.request_done("carol").unwrap();
        }
        assert_eq!(store.profile("carol").unwrap().current_capacity, 0);
        assert!(matches!(
            store.check_can_request("carol"),
            Err(BalancerError::RateLimitExceeded)
        ));
    }

    #[test]
    fn refill_tick_readmits_empty_user() {
        let store = store();
        store.create_user("dave").unwrap();
        store.set_current_capacity("dave", 0);
        assert!(store.check_can_request("dave").is_err());

        assert_eq!(store.refill_all(), 1);
        assert_eq!(store.profile("dave").unwrap().current_capacity, 1);
        assert!(store.check_can_request("dave").is_ok());
    }

    #[test]
    fn change_tokens_validates() {
        let store = store();
        store.create_user("erin").unwrap();
        assert!(matches!(
            store.change_tokens("erin", 0, 0),
            Err(BalancerError::InvalidArgument(_))
        ));
        let profile = store.change_tokens("erin", 5, 0).unwrap();
        assert_eq!(profile.capacity, 5);
        assert_eq!(profile.rate_per_sec, 0);
    }

    #[test]
    fn concurrent_done_and_refill_keep_bounds() {
        let store = Arc::new(store());
        store.create_user("frank").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        if i % 2 == 0 {
                            store.request_done("frank").unwrap();
                        } else {
                            store.refill_all();
                        }
                        let p = store.profile("frank").unwrap();
                        assert!(p.current_capacity >= 0 && p.current_capacity <= p.capacity);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn persists_and_reloads() {
        let path = temp_path("persist");
        let config = StoreConfig {
            persistence_path: Some(path.clone()),
        };
        let limiter = LimiterConfig::default();

        let key = {
            let store = UserStore::open(&config, &limiter).unwrap();
            let created = store.create_user("gina").unwrap();
            store.change_tokens("gina", 9, 3).unwrap();
            created.api_key
        };

        let reopened = UserStore::open(&config, &limiter).unwrap();
        let user = reopened.authenticate(&key).unwrap();
        let profile = reopened.profile(&user.name).unwrap();
        assert_eq!(profile.capacity, 9);
        assert_eq!(profile.rate_per_sec, 3);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unwritable_path_rolls_back_creation() {
        let config = StoreConfig {
            persistence_path: Some(PathBuf::from("/nonexistent-dir/users.json")),
        };
        let store = UserStore::open(&config, &LimiterConfig::default()).unwrap();
        assert!(matches!(
            store.create_user("hank"),
            Err(BalancerError::Persistence(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn huge_rate_keeps_bucket_bounded() {
        let store = store();
        store.create_user("zed").unwrap();
        store.change_tokens("zed", 5, i64::MAX).unwrap();
        store.set_current_capacity("zed", 1);
        store.refill_all();
        store.refill_all();
        let profile = store.profile("zed").unwrap();
        assert_eq!(profile.current_capacity, 5);
    }

    #[test]
    fn persisted_file_holds_only_key_hashes() {
        let path = temp_path("hashed");
        let config = StoreConfig {
            persistence_path: Some(path.clone()),
        };
        let store = UserStore::open(&config, &LimiterConfig::default()).unwrap();
        let created = store.create_user("ivy").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains(&created.api_key));
        assert!(content.contains(&hash_key(&created.api_key)));
        assert!(matches!(
            store.authenticate(&hash_key(&created.api_key)),
            Err(BalancerError::AuthFailure)
        ));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn concurrent_creates_all_survive_reload() {
        let path = temp_path("concurrent");
        let config = StoreConfig {
            persistence_path: Some(path.clone()),
        };
        let limiter = LimiterConfig::default();
        let store = Arc::new(UserStore::open(&config, &limiter).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|i| store.create_user(&format!("user-{t}-{i}")).unwrap().api_key)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let keys: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let reopened = UserStore::open(&config, &limiter).unwrap();
        assert_eq!(reopened.len(), 80);
        for key in &keys {
            assert!(reopened.authenticate(key).is_ok());
        }

        let _ = std::fs::remove_file(path);
    }
}
