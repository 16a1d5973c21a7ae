//! Session configuration, loadable from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use plaza_net::ReconnectPolicy;
use plaza_shared::constants::{BACKFILL_WINDOW_MS, SYNC_PAGE_SIZE};

/// Everything a [`SyncSession`](crate::SyncSession) needs to come up.
///
/// [`SyncConfig::from_env`] reads the following variables, falling back to
/// the defaults below when unset or unparseable:
///
/// - `PLAZA_RELAY_URL`: websocket relay endpoint
/// - `PLAZA_API_URL`: remote message log base URL
/// - `PLAZA_AUTH_TOKEN`: bearer token for the remote log (optional)
/// - `PLAZA_REGION`: region shard announced with presence
/// - `PLAZA_DATA_DIR`: directory holding the database and device key file
/// - `PLAZA_REQUEST_TIMEOUT_MS`: per-request timeout against the remote log
/// - `PLAZA_SYNC_PAGE_SIZE`: messages per catch-up page
/// - `PLAZA_MAX_SEND_ATTEMPTS`: append attempts before a send is parked
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub relay_url: String,
    pub api_url: String,
    pub auth_token: Option<String>,
    pub region: String,
    /// Overrides the platform data directory when set.
    pub data_dir: Option<PathBuf>,
    pub request_timeout: Duration,
    pub sync_page_size: u32,
    /// Half-width of the reference back-fill window, epoch ms.
    pub backfill_window_ms: i64,
    /// Backoff schedule for relay reconnects.
    pub reconnect: ReconnectPolicy,
    /// Backoff schedule for remote log append retries.
    pub send_retry: ReconnectPolicy,
    pub max_send_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relay_url: "wss://relay.plaza.app/ws".to_string(),
            api_url: "https://api.plaza.app".to_string(),
            auth_token: None,
            region: "global".to_string(),
            data_dir: None,
            request_timeout: Duration::from_secs(10),
            sync_page_size: SYNC_PAGE_SIZE,
            backfill_window_ms: BACKFILL_WINDOW_MS,
            reconnect: ReconnectPolicy::default(),
            send_retry: ReconnectPolicy {
                initial: Duration::from_secs(2),
                multiplier: 2.0,
                max: Duration::from_secs(60),
            },
            max_send_attempts: 5,
        }
    }
}

impl SyncConfig {
    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            relay_url: env::var("PLAZA_RELAY_URL").unwrap_or(defaults.relay_url),
            api_url: env::var("PLAZA_API_URL").unwrap_or(defaults.api_url),
            auth_token: env::var("PLAZA_AUTH_TOKEN").ok(),
            region: env::var("PLAZA_REGION").unwrap_or(defaults.region),
            data_dir: env::var("PLAZA_DATA_DIR").ok().map(PathBuf::from),
            request_timeout: parse_env("PLAZA_REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            sync_page_size: parse_env("PLAZA_SYNC_PAGE_SIZE").unwrap_or(defaults.sync_page_size),
            backfill_window_ms: defaults.backfill_window_ms,
            reconnect: defaults.reconnect,
            send_retry: defaults.send_retry,
            max_send_attempts: parse_env("PLAZA_MAX_SEND_ATTEMPTS")
                .unwrap_or(defaults.max_send_attempts),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(%name, %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
