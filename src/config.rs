use std::time::Duration;

/// Fixed waits used by the action sequencer.
///
/// These are timing heuristics, not guarantees: the host renders its popup
/// menu asynchronously and exposes no "menu ready" signal, so a slow render
/// can outlast `popup_delay` and the sequence falls through to the keyboard
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub hover_delay: Duration,
    pub popup_delay: Duration,
    pub close_delay: Duration,
}

pub const HOVER_DELAY_MS: u64 = 20;
pub const POPUP_DELAY_MS: u64 = 300;
pub const CLOSE_DELAY_MS: u64 = 50;
pub const DEBOUNCE_MS: u64 = 250;
pub const THROTTLE_MS: u64 = 1000;
pub const MIS_MARGIN_FACTOR: f64 = 0.2;

impl Default for Timing {
    fn default() -> Self {
        Self {
            hover_delay: Duration::from_millis(HOVER_DELAY_MS),
            popup_delay: Duration::from_millis(POPUP_DELAY_MS),
            close_delay: Duration::from_millis(CLOSE_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub timing: Timing,
    /// Quiet period after the last mutation before reconciling.
    pub debounce: Duration,
    /// At most one reconciliation per window.
    pub throttle: Duration,
    pub mis_margin_factor: f64,
    pub prefs_path: String,
    pub origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timing: Timing::default(),
            debounce: Duration::from_millis(DEBOUNCE_MS),
            throttle: Duration::from_millis(THROTTLE_MS),
            mis_margin_factor: MIS_MARGIN_FACTOR,
            prefs_path: "./kite-overlay.sqlite".to_string(),
            origin: "https://kite.zerodha.com".to_string(),
        }
    }
}

fn env_ms(key: &str, default: u64) -> Duration {
    Duration::from_millis(
        std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default),
    )
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            timing: Timing {
                hover_delay: env_ms("KX_HOVER_DELAY_MS", HOVER_DELAY_MS),
                popup_delay: env_ms("KX_POPUP_DELAY_MS", POPUP_DELAY_MS),
                close_delay: env_ms("KX_CLOSE_DELAY_MS", CLOSE_DELAY_MS),
            },
            debounce: env_ms("KX_DEBOUNCE_MS", DEBOUNCE_MS),
            throttle: env_ms("KX_THROTTLE_MS", THROTTLE_MS),
            mis_margin_factor: std::env::var("KX_MIS_MARGIN_FACTOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MIS_MARGIN_FACTOR),
            prefs_path: std::env::var("KX_PREFS_PATH")
                .unwrap_or_else(|_| "./kite-overlay.sqlite".to_string()),
            origin: std::env::var("KX_ORIGIN")
                .unwrap_or_else(|_| "https://kite.zerodha.com".to_string()),
        }
    }
}
