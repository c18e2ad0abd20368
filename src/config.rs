//! Runtime configuration, read from `DOWNLOAD_GATE_*` environment variables.
//!
//! Every value has a default; malformed values are ignored and out-of-range
//! values are clamped rather than rejected.

use std::path::PathBuf;
use std::time::Duration;

use crate::utils::paths::resolve_root_dir;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_COUNTDOWN_SECS: u32 = 15;
pub const DEFAULT_SKIP_AFTER_SECS: u32 = 5;
pub const DEFAULT_SESSION_IDLE_MINS: u64 = 30;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

#[derive(Clone, Debug)]
pub struct GateConfig {
    pub api_url: String,
    pub root_dir: PathBuf,
    pub gate: GatePolicy,
    pub session_idle: Duration,
    pub http_timeout: Duration,
}

/// Countdown rules applied by the redirect flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GatePolicy {
    pub default_countdown_secs: u32,
    pub skip_after_secs: u32,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            default_countdown_secs: DEFAULT_COUNTDOWN_SECS,
            skip_after_secs: DEFAULT_SKIP_AFTER_SECS,
        }
    }
}

impl GateConfig {
    pub fn from_env() -> Self {
        let api_url = std::env::var("DOWNLOAD_GATE_API_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let gate = GatePolicy {
            default_countdown_secs: env_u64("DOWNLOAD_GATE_DEFAULT_COUNTDOWN_SECS")
                .map(|value| value.clamp(1, 600) as u32)
                .unwrap_or(DEFAULT_COUNTDOWN_SECS),
            skip_after_secs: env_u64("DOWNLOAD_GATE_SKIP_AFTER_SECS")
                .map(|value| value.clamp(0, 600) as u32)
                .unwrap_or(DEFAULT_SKIP_AFTER_SECS),
        };

        let session_idle_mins = env_u64("DOWNLOAD_GATE_SESSION_IDLE_MINS")
            .map(|value| value.clamp(1, 24 * 60))
            .unwrap_or(DEFAULT_SESSION_IDLE_MINS);
        let http_timeout_secs = env_u64("DOWNLOAD_GATE_HTTP_TIMEOUT_SECS")
            .map(|value| value.clamp(2, 120))
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        Self {
            api_url,
            root_dir: resolve_root_dir(),
            gate,
            session_idle: Duration::from_secs(session_idle_mins * 60),
            http_timeout: Duration::from_secs(http_timeout_secs),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}
