//! Drives the host's row menu to invoke one of its hidden actions.
//!
//! The sequence is hover row -> hover menu opener -> click opener -> wait for
//! the popup -> resolve the target -> click it. The popup is rendered
//! asynchronously by the host with no completion signal, so every wait is a
//! fixed delay from `Timing`. Success means "a target was found and clicked";
//! nothing verifies that the host acted on it.

use std::cell::RefCell;

use tokio::time::sleep;

use crate::config::Timing;
use crate::dom::{HostDocument, NodeId, SyntheticEvent};
use crate::logging::{log, obj, v_str, warn, Domain, Level};

pub const MENU_OPENER: &str = ".table-menu-button, .icon-more-vertical";
pub const MENU_POPUP: &str = ".table-menu-content, .context-menu, .dropdown";
pub const MENU_ENTRIES: &str = "a, li, button, span";
pub const CLICKABLE: &str = "a, button, li";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Add,
    MarketDepth,
    Chart,
    Breakdown,
    Fundamentals,
    Technicals,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Add,
        ActionKind::MarketDepth,
        ActionKind::Chart,
        ActionKind::Breakdown,
        ActionKind::Fundamentals,
        ActionKind::Technicals,
    ];

    /// Label of the entry in the host menu.
    pub fn display_name(&self) -> &'static str {
        match self {
            ActionKind::Add => "Add",
            ActionKind::MarketDepth => "Market depth",
            ActionKind::Chart => "Chart",
            ActionKind::Breakdown => "Breakdown",
            ActionKind::Fundamentals => "Fundamentals",
            ActionKind::Technicals => "Technicals",
        }
    }

    /// Stable id used on injected buttons.
    pub fn slug(&self) -> &'static str {
        match self {
            ActionKind::Add => "add",
            ActionKind::MarketDepth => "depth",
            ActionKind::Chart => "chart",
            ActionKind::Breakdown => "breakdown",
            ActionKind::Fundamentals => "fundamentals",
            ActionKind::Technicals => "technicals",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.slug() == slug)
    }

    /// Structural marker inside the popup that identifies this entry.
    pub fn probe(&self) -> &'static str {
        match self {
            ActionKind::Add => r#"[data-label="Add"], .icon-plus"#,
            ActionKind::MarketDepth => ".icon-book-open, .icon-market-depth",
            ActionKind::Chart => ".icon-trending-up, .icon-chart",
            ActionKind::Breakdown => ".icon-pie-chart, .icon-breakdown",
            ActionKind::Fundamentals => r#"img[alt="Tijori"], .icon-fundamentals"#,
            ActionKind::Technicals => r#"img[alt="Streak"], .icon-technicals"#,
        }
    }

    /// Global host keyboard shortcut, for the kinds that have one.
    pub fn shortcut(&self) -> Option<char> {
        match self {
            ActionKind::Add => Some('b'),
            ActionKind::MarketDepth => Some('d'),
            ActionKind::Chart => Some('c'),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Row has no menu opener; nothing was dispatched.
    MenuMissing,
    Clicked { target: NodeId },
    KeyboardFallback { key: char },
    /// Target not found and the kind has no shortcut.
    Unresolved,
}

/// Find the clickable menu entry for `kind`: structural probe first, then a
/// case-insensitive text scan over menu entries.
///
/// Popups are searched newest first. The host does not always close a menu
/// when focus moves, so an older row's popup can still be in the document.
pub fn resolve_target<D: HostDocument>(doc: &D, kind: ActionKind) -> Option<NodeId> {
    let root = doc.root();
    let scopes = {
        let mut popups = doc.query_all(root, MENU_POPUP);
        if popups.is_empty() {
            vec![root]
        } else {
            popups.reverse();
            popups
        }
    };

    for scope in &scopes {
        if let Some(marker) = doc.query(*scope, kind.probe()) {
            return Some(doc.closest(marker, CLICKABLE).unwrap_or(marker));
        }
    }

    let needle = kind.display_name().to_lowercase();
    for scope in &scopes {
        let hit = doc
            .query_all(*scope, MENU_ENTRIES)
            .into_iter()
            .find(|el| doc.text(*el).to_lowercase().contains(&needle));
        if let Some(el) = hit {
            return Some(doc.closest(el, CLICKABLE).unwrap_or(el));
        }
    }
    None
}

fn dispatch<D: HostDocument>(doc: &RefCell<D>, node: NodeId, event: SyntheticEvent) {
    doc.borrow_mut().dispatch(node, event);
}

/// Run the menu automation for one row. The document is borrowed only
/// between waits, so reconciliation may run while this is suspended.
pub async fn trigger_action<D: HostDocument>(
    doc: &RefCell<D>,
    row: NodeId,
    kind: ActionKind,
    timing: &Timing,
) -> ActionOutcome {
    let action = kind.display_name();
    let opener = doc.borrow().query(row, MENU_OPENER);
    let Some(opener) = opener else {
        warn(Domain::Action, "menu_missing", obj(&[("action", v_str(action))]));
        return ActionOutcome::MenuMissing;
    };

    dispatch(doc, row, SyntheticEvent::MouseOver);
    sleep(timing.hover_delay).await;
    dispatch(doc, opener, SyntheticEvent::MouseOver);
    sleep(timing.hover_delay).await;
    dispatch(doc, opener, SyntheticEvent::Click);

    // Heuristic wait for the popup; there is no render-complete signal.
    sleep(timing.popup_delay).await;

    let target = resolve_target(&*doc.borrow(), kind);
    if let Some(target) = target {
        log(Level::Info, Domain::Action, "clicked", obj(&[("action", v_str(action))]));
        dispatch(doc, target, SyntheticEvent::Click);
        sleep(timing.close_delay).await;
        dispatch(doc, opener, SyntheticEvent::MouseLeave);
        return ActionOutcome::Clicked { target };
    }

    warn(Domain::Action, "target_missing", obj(&[("action", v_str(action))]));
    dispatch(doc, row, SyntheticEvent::Click);
    let Some(key) = kind.shortcut() else {
        return ActionOutcome::Unresolved;
    };
    let root = doc.borrow().root();
    let key_code = key.to_ascii_uppercase() as u32;
    dispatch(doc, root, SyntheticEvent::KeyDown { key, key_code });
    log(
        Level::Info,
        Domain::Action,
        "keyboard_fallback",
        obj(&[("action", v_str(action)), ("key", v_str(&key.to_string()))]),
    );
    ActionOutcome::KeyboardFallback { key }
}
