/// Application name
pub const APP_NAME: &str = "Plaza";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// x25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// x25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum message body size in bytes (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Key derivation context (BLAKE3) for per-pair direct-message keys
pub const KDF_CONTEXT_DM_KEY: &str = "plaza-dm-key-v1";

/// Default page size for delta-sync requests against the remote log
pub const SYNC_PAGE_SIZE: u32 = 200;

/// Half-width of the time window fetched around an anchor timestamp when
/// back-filling a missing reply target (epoch milliseconds)
pub const BACKFILL_WINDOW_MS: i64 = 12 * 60 * 60 * 1000;

/// Number of random bytes appended to client-generated message ids
pub const MESSAGE_ID_SUFFIX_BYTES: usize = 4;
