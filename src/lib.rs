//! Overlay engine for a brokerage web UI: injects per-row action buttons,
//! derived-figure badges, exclusion/tag controls and page totals into the
//! holdings, positions and open-orders tables, and automates the host's row
//! menu actions.

pub mod action;
pub mod config;
pub mod dom;
pub mod engine;
pub mod inject;
pub mod logging;
pub mod prefs;
pub mod scrape;
pub mod summary;
pub mod watch;
