//! Device key persistence and the peer key cache.
//!
//! The device secret lives in a mode-0600 JSON file next to the database,
//! never inside the database itself. Peer public keys come from the remote
//! key directory and are cached in memory for the life of the session.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use plaza_net::RemoteLog;
use plaza_shared::crypto::public_key_from_bytes;
use plaza_shared::{epoch_ms_now, CryptoError, KeyError, KeyPair, PublicKey, UserId};

use crate::error::{Result, SyncError};

const DEVICE_KEY_FILE: &str = "device_key.json";

#[derive(Serialize, Deserialize)]
struct DeviceKeyRecord {
    /// Hex-encoded x25519 secret key.
    secret_key: String,
    /// Hex-encoded public half, for inspection; recomputed on load.
    public_key: String,
    created_at: i64,
}

/// Stores the device keypair in a file only the owning user can read.
pub struct DeviceKeyStore {
    path: PathBuf,
}

impl DeviceKeyStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Key file inside `dir`, conventionally the database directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(DEVICE_KEY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored keypair; `None` when no key has been generated yet.
    pub fn load(&self) -> Result<Option<KeyPair>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KeyError::KeyFile(e.to_string()).into()),
        };
        let record: DeviceKeyRecord =
            serde_json::from_str(&raw).map_err(|e| KeyError::KeyFile(e.to_string()))?;
        let bytes = hex::decode(&record.secret_key).map_err(|_| KeyError::InvalidKeyBytes)?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidKeyBytes)?;
        Ok(Some(KeyPair::from_secret_bytes(&secret)))
    }

    /// Persist the keypair, restricting the file to the owning user.
    pub fn save(&self, keys: &KeyPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| KeyError::KeyFile(e.to_string()))?;
        }
        let record = DeviceKeyRecord {
            secret_key: hex::encode(keys.secret_bytes()),
            public_key: hex::encode(keys.public_key_bytes()),
            created_at: epoch_ms_now(),
        };
        let json =
            serde_json::to_string_pretty(&record).map_err(|e| KeyError::KeyFile(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| KeyError::KeyFile(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(|e| KeyError::KeyFile(e.to_string()))?;
        }

        Ok(())
    }
}

/// Owns the device keypair and the in-memory peer key cache.
pub struct KeyManager {
    user: UserId,
    device: DeviceKeyStore,
    remote: Arc<dyn RemoteLog>,
    keys: RwLock<Option<KeyPair>>,
    peers: RwLock<HashMap<UserId, PublicKey>>,
}

impl KeyManager {
    pub fn new(user: UserId, device: DeviceKeyStore, remote: Arc<dyn RemoteLog>) -> Self {
        Self {
            user,
            device,
            remote,
            keys: RwLock::new(None),
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Make sure this device has a keypair and the directory has its public
    /// half. Safe to call on every startup; a no-op once both hold.
    ///
    /// The key file is the source of truth: a stale or missing directory
    /// record is overwritten with the local public key. With a key file on
    /// disk an unreachable directory is not fatal, so a session can start
    /// offline; first-run key generation must reach the directory, since an
    /// unpublished key can never receive mail.
    pub async fn ensure_device_keys(&self) -> Result<()> {
        if let Some(existing) = self.device.load()? {
            match self.remote.fetch_public_key(&self.user).await {
                Ok(published) => {
                    if published != Some(existing.public_key_bytes()) {
                        info!(user = %self.user, "Publishing device public key");
                        self.remote
                            .publish_public_key(&self.user, &existing.public_key_bytes())
                            .await?;
                    }
                }
                Err(e) => {
                    warn!(user = %self.user, error = %e, "Key directory unreachable; reconciling on next start");
                }
            }
            *self.keys.write().await = Some(existing);
            return Ok(());
        }

        info!(user = %self.user, "Generating device keypair");
        let fresh = KeyPair::generate();
        self.device.save(&fresh)?;
        self.remote
            .publish_public_key(&self.user, &fresh.public_key_bytes())
            .await?;
        *self.keys.write().await = Some(fresh);
        Ok(())
    }

    /// The device keypair. Errors until [`ensure_device_keys`] has run.
    ///
    /// [`ensure_device_keys`]: KeyManager::ensure_device_keys
    pub async fn device_keys(&self) -> Result<KeyPair> {
        self.keys
            .read()
            .await
            .clone()
            .ok_or_else(|| CryptoError::MissingKey(self.user.to_string()).into())
    }

    /// A peer's public key, from the cache or the directory.
    pub async fn peer_key(&self, user: &UserId) -> Result<PublicKey> {
        if let Some(key) = self.peers.read().await.get(user) {
            return Ok(*key);
        }
        let bytes = self
            .remote
            .fetch_public_key(user)
            .await?
            .ok_or_else(|| SyncError::Crypto(CryptoError::MissingKey(user.to_string())))?;
        let key = public_key_from_bytes(&bytes)?;
        debug!(%user, "Cached peer public key");
        self.peers.write().await.insert(user.clone(), key);
        Ok(key)
    }

    /// Seed the cache with a key learned from an incoming message, saving
    /// the directory round-trip on reply.
    pub async fn cache_peer_key(&self, user: &UserId, key: PublicKey) {
        self.peers.write().await.insert(user.clone(), key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRemoteLog;

    #[test]
    fn save_then_load_restores_the_keypair() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceKeyStore::in_dir(dir.path());

        assert!(store.load().unwrap().is_none());

        let keys = KeyPair::generate();
        store.save(&keys).unwrap();

        let restored = store.load().unwrap().unwrap();
        assert_eq!(restored.public_key_bytes(), keys.public_key_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = DeviceKeyStore::in_dir(dir.path());
        store.save(&KeyPair::generate()).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_key_file_is_an_error_not_a_regenerate() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceKeyStore::in_dir(dir.path());
        fs::write(store.path(), "{not json").unwrap();

        assert!(store.load().is_err());
    }

    #[tokio::test]
    async fn ensure_device_keys_generates_and_publishes_once() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemoteLog::new());
        let manager = KeyManager::new(
            UserId::new("amir"),
            DeviceKeyStore::in_dir(dir.path()),
            remote.clone(),
        );

        manager.ensure_device_keys().await.unwrap();
        let first = manager.device_keys().await.unwrap().public_key_bytes();
        assert_eq!(remote.publish_count(), 1);

        manager.ensure_device_keys().await.unwrap();
        let second = manager.device_keys().await.unwrap().public_key_bytes();

        assert_eq!(first, second);
        assert_eq!(remote.publish_count(), 1, "second run must not republish");
    }

    #[tokio::test]
    async fn ensure_device_keys_heals_a_missing_directory_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceKeyStore::in_dir(dir.path());
        let keys = KeyPair::generate();
        store.save(&keys).unwrap();

        let remote = Arc::new(MemoryRemoteLog::new());
        let manager = KeyManager::new(UserId::new("amir"), store, remote.clone());
        manager.ensure_device_keys().await.unwrap();

        assert_eq!(remote.publish_count(), 1);
        assert_eq!(
            remote
                .fetch_public_key(&UserId::new("amir"))
                .await
                .unwrap(),
            Some(keys.public_key_bytes())
        );
    }

    #[tokio::test]
    async fn existing_keys_survive_an_unreachable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceKeyStore::in_dir(dir.path());
        let keys = KeyPair::generate();
        store.save(&keys).unwrap();

        let remote = Arc::new(MemoryRemoteLog::new());
        remote.set_offline(true);

        let manager = KeyManager::new(UserId::new("amir"), store, remote.clone());
        manager.ensure_device_keys().await.unwrap();

        assert_eq!(
            manager.device_keys().await.unwrap().public_key_bytes(),
            keys.public_key_bytes()
        );
        assert_eq!(remote.publish_count(), 0);
    }

    #[tokio::test]
    async fn first_run_requires_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemoteLog::new());
        remote.set_offline(true);

        let manager = KeyManager::new(
            UserId::new("amir"),
            DeviceKeyStore::in_dir(dir.path()),
            remote,
        );

        assert!(manager.ensure_device_keys().await.is_err());
    }

    #[tokio::test]
    async fn peer_keys_are_fetched_once_then_cached() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemoteLog::new());
        let ursula = KeyPair::generate();
        remote
            .publish_public_key(&UserId::new("ursula"), &ursula.public_key_bytes())
            .await
            .unwrap();

        let manager = KeyManager::new(
            UserId::new("amir"),
            DeviceKeyStore::in_dir(dir.path()),
            remote.clone(),
        );

        let a = manager.peer_key(&UserId::new("ursula")).await.unwrap();
        let b = manager.peer_key(&UserId::new("ursula")).await.unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(remote.key_fetch_count(), 1);
    }

    #[tokio::test]
    async fn unknown_peer_key_is_a_crypto_error() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemoteLog::new());
        let manager = KeyManager::new(
            UserId::new("amir"),
            DeviceKeyStore::in_dir(dir.path()),
            remote,
        );

        let err = manager.peer_key(&UserId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, SyncError::Crypto(CryptoError::MissingKey(_))));
    }
}
