//! Idempotent injection of overlay controls into host rows.
//!
//! Every pass walks the tracked tables and, per qualifying row, makes sure the
//! action container (six buttons plus the info badge) exists next to the
//! instrument identifier. Holdings rows also get an exclude toggle and a tag
//! selector. Presence is checked by marker class before creating anything, so
//! repeated passes add nothing; only the badge text and tone are refreshed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::action::ActionKind;
use crate::dom::{ElementSpec, HostDocument, ListenKind, NodeId};
use crate::logging::{debug, obj, v_num, v_str, Domain};
use crate::prefs::Tag;
use crate::scrape::{scrape_row, Badge, PageKind, RowFigures, Tone};
use crate::summary::SECTIONS;

pub const ACTIONS_CLASS: &str = "kx-actions";
pub const BUTTON_CLASS: &str = "kx-btn";
pub const BADGE_CLASS: &str = "kx-badge";
pub const EXCLUDE_CLASS: &str = "kx-exclude";
pub const TAG_CLASS: &str = "kx-tag";

const INSTRUMENT_CELL: &str = "td.instrument";
const IDENTIFIER_ANCHOR: &str = "a.initial, .tradingsymbol";

fn marker(class: &str) -> String {
    format!(".{}", class)
}

/// Which host nodes already carry one of our listeners. Kept by the engine
/// instead of being stamped onto host elements.
#[derive(Debug, Default, Clone)]
pub struct ListenerRegistry {
    attached: HashMap<(NodeId, ListenKind), bool>,
}

impl ListenerRegistry {
    pub fn is_attached(&self, node: NodeId, kind: ListenKind) -> bool {
        self.attached.get(&(node, kind)).copied().unwrap_or(false)
    }

    /// Attach a listener unless one is already registered; true if attached now.
    pub fn attach_once<D: HostDocument>(&mut self, doc: &mut D, node: NodeId, kind: ListenKind) -> bool {
        if self.is_attached(node, kind) {
            return false;
        }
        doc.listen(node, kind);
        self.attached.insert((node, kind), true);
        true
    }

    /// Forget nodes the host has removed.
    pub fn prune<D: HostDocument>(&mut self, doc: &D) {
        self.attached.retain(|(node, _), _| doc.contains(*node));
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub rows: usize,
    pub injected: usize,
    pub refreshed: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    registry: ListenerRegistry,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// One pass over every tracked table.
    pub fn reconcile<D: HostDocument>(
        &mut self,
        doc: &mut D,
        excluded: &BTreeSet<String>,
        tags: &BTreeMap<String, Tag>,
        mis_factor: f64,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for section in SECTIONS.iter() {
            for row in doc.query_all(doc.root(), section.rows) {
                report.rows += 1;
                let Some(fig) = scrape_row(doc, row, mis_factor) else {
                    report.skipped += 1;
                    continue;
                };
                let Some(cell) = doc.query(row, INSTRUMENT_CELL) else {
                    report.skipped += 1;
                    continue;
                };
                let (container, created) = ensure_actions(doc, cell, &fig.symbol);
                if created {
                    report.injected += 1;
                }
                let badge = ensure_child(doc, container, BADGE_CLASS, || ElementSpec::new("span").class(BADGE_CLASS));
                apply_badge(doc, badge, &fig.badge(mis_factor));
                report.refreshed += 1;

                if fig.kind == PageKind::Holdings {
                    ensure_exclude_toggle(doc, container, &fig.symbol, excluded.contains(&fig.symbol));
                    ensure_tag_selector(doc, container, &fig.symbol, tags.get(&fig.symbol).copied().unwrap_or_default());
                }
                self.registry.attach_once(doc, row, ListenKind::Hover);
            }
        }
        self.registry.prune(doc);
        debug(
            Domain::Inject,
            "pass",
            obj(&[
                ("rows", v_num(report.rows as f64)),
                ("injected", v_num(report.injected as f64)),
                ("skipped", v_num(report.skipped as f64)),
            ]),
        );
        report
    }

    /// Refresh a single row's badge (hover/focus hook). Returns the figures
    /// when the row still qualifies.
    pub fn refresh_row<D: HostDocument>(&self, doc: &mut D, row: NodeId, mis_factor: f64) -> Option<RowFigures> {
        if !doc.contains(row) {
            return None;
        }
        let fig = scrape_row(doc, row, mis_factor)?;
        let badge = doc.query(row, &marker(BADGE_CLASS))?;
        apply_badge(doc, badge, &fig.badge(mis_factor));
        Some(fig)
    }
}

fn ensure_child<D, F>(doc: &mut D, parent: NodeId, class: &str, spec: F) -> NodeId
where
    D: HostDocument,
    F: FnOnce() -> ElementSpec,
{
    match doc.query(parent, &marker(class)) {
        Some(existing) => existing,
        None => doc.append(parent, spec()),
    }
}

/// Action container for the instrument cell; `true` when newly created.
/// The container is stamped with the symbol it was created for.
fn ensure_actions<D: HostDocument>(doc: &mut D, cell: NodeId, symbol: &str) -> (NodeId, bool) {
    if let Some(existing) = doc.query(cell, &marker(ACTIONS_CLASS)) {
        return (existing, false);
    }
    let anchor = doc.query(cell, IDENTIFIER_ANCHOR).unwrap_or(cell);
    let container = doc.append(
        anchor,
        ElementSpec::new("div").class(ACTIONS_CLASS).attr("data-symbol", symbol),
    );
    for kind in ActionKind::ALL {
        let button = doc.append(
            container,
            ElementSpec::new("button")
                .class(&format!("{} {}-{}", BUTTON_CLASS, BUTTON_CLASS, kind.slug()))
                .attr("title", kind.display_name())
                .attr("data-action", kind.slug()),
        );
        doc.listen(button, ListenKind::Click);
    }
    (container, true)
}

fn apply_badge<D: HostDocument>(doc: &mut D, badge: NodeId, b: &Badge) {
    if doc.text(badge) != b.text {
        doc.set_text(badge, &b.text);
    }
    if doc.attr(badge, "title").as_deref() != Some(b.tooltip.as_str()) {
        doc.set_attr(badge, "title", &b.tooltip);
    }
    for tone in [Tone::Positive, Tone::Negative] {
        let on = b.tone == Some(tone);
        if doc.has_class(badge, tone.class()) != on {
            doc.toggle_class(badge, tone.class(), on);
        }
    }
}

fn bool_attr(on: bool) -> &'static str {
    if on {
        "true"
    } else {
        "false"
    }
}

fn ensure_exclude_toggle<D: HostDocument>(doc: &mut D, container: NodeId, symbol: &str, excluded: bool) {
    let toggle = match doc.query(container, &marker(EXCLUDE_CLASS)) {
        Some(existing) => existing,
        None => {
            let toggle = doc.append(
                container,
                ElementSpec::new("input")
                    .class(EXCLUDE_CLASS)
                    .attr("type", "checkbox")
                    .attr("title", "Exclude from totals")
                    .attr("data-symbol", symbol),
            );
            doc.listen(toggle, ListenKind::Change);
            toggle
        }
    };
    let want = bool_attr(excluded);
    if doc.attr(toggle, "checked").as_deref() != Some(want) {
        doc.set_attr(toggle, "checked", want);
    }
}

fn ensure_tag_selector<D: HostDocument>(doc: &mut D, container: NodeId, symbol: &str, tag: Tag) {
    let select = match doc.query(container, &marker(TAG_CLASS)) {
        Some(existing) => existing,
        None => {
            let select = doc.append(
                container,
                ElementSpec::new("select")
                    .class(TAG_CLASS)
                    .attr("title", "Tag")
                    .attr("data-symbol", symbol),
            );
            for option in Tag::ALL {
                doc.append(
                    select,
                    ElementSpec::new("option").attr("value", option.as_str()).text(option.as_str()),
                );
            }
            doc.listen(select, ListenKind::Change);
            select
        }
    };
    if doc.attr(select, "value").as_deref() != Some(tag.as_str()) {
        doc.set_attr(select, "value", tag.as_str());
    }
}

/// Symbol a toggle or selector was injected for.
pub fn control_symbol<D: HostDocument>(doc: &D, control: NodeId) -> Option<String> {
    doc.attr(control, "data-symbol")
}

/// Host row that owns an injected control or button.
pub fn owning_row<D: HostDocument>(doc: &D, node: NodeId) -> Option<NodeId> {
    doc.closest(node, "tr")
}

/// Action kind of an injected button.
pub fn button_action<D: HostDocument>(doc: &D, button: NodeId) -> Option<ActionKind> {
    let slug = doc.attr(button, "data-action");
    let kind = slug.as_deref().and_then(ActionKind::from_slug);
    if kind.is_none() {
        debug(Domain::Inject, "not_an_action_button", obj(&[("data_action", v_str(slug.as_deref().unwrap_or("")))]));
    }
    kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;
    use crate::scrape::extract_symbol;

    fn positions_page() -> (MemoryDocument, NodeId) {
        let mut doc = MemoryDocument::new();
        let root = doc.root();
        let section = doc.append(root, ElementSpec::new("div").class("positions"));
        let table = doc.append(section, ElementSpec::new("table"));
        let body = doc.append(table, ElementSpec::new("tbody"));
        let row = doc.append(body, ElementSpec::new("tr"));
        let cell = doc.append(row, ElementSpec::new("td").class("instrument").attr("data-label", "Instrument"));
        doc.append(cell, ElementSpec::new("span").class("tradingsymbol").text("SBIN"));
        doc.append(row, ElementSpec::new("td").attr("data-label", "Qty.").text("50"));
        doc.append(row, ElementSpec::new("td").attr("data-label", "Avg.").text("120.40"));
        (doc, row)
    }

    #[test]
    fn positions_row_gets_buttons_and_badge_only() {
        let (mut doc, row) = positions_page();
        let mut rec = Reconciler::new();
        let report = rec.reconcile(&mut doc, &BTreeSet::new(), &BTreeMap::new(), 0.2);
        assert_eq!(report, ReconcileReport { rows: 1, injected: 1, refreshed: 1, skipped: 0 });
        assert_eq!(doc.query_all(row, ".kx-btn").len(), 6);
        let badge = doc.query(row, ".kx-badge").unwrap();
        assert_eq!(doc.text(badge), "Inv 6,020.00");
        assert!(doc.query(row, ".kx-exclude").is_none());
        assert!(doc.query(row, ".kx-tag").is_none());
        assert!(rec.registry().is_attached(row, ListenKind::Hover));
    }

    #[test]
    fn registry_attaches_once_and_prunes() {
        let (mut doc, row) = positions_page();
        let mut rec = Reconciler::new();
        rec.reconcile(&mut doc, &BTreeSet::new(), &BTreeMap::new(), 0.2);
        rec.reconcile(&mut doc, &BTreeSet::new(), &BTreeMap::new(), 0.2);
        let hover_listeners = doc
            .listeners()
            .iter()
            .filter(|(n, k)| *n == row && *k == ListenKind::Hover)
            .count();
        assert_eq!(hover_listeners, 1);

        doc.remove(row);
        rec.reconcile(&mut doc, &BTreeSet::new(), &BTreeMap::new(), 0.2);
        assert!(rec.registry().is_empty());
    }

    #[test]
    fn symbol_from_row_attribute_survives_injection() {
        let mut doc = MemoryDocument::new();
        let root = doc.root();
        let section = doc.append(root, ElementSpec::new("div").class("holdings"));
        let table = doc.append(section, ElementSpec::new("table"));
        let body = doc.append(table, ElementSpec::new("tbody"));
        let row = doc.append(body, ElementSpec::new("tr").attr("data-symbol", "INFY"));
        let cell = doc.append(row, ElementSpec::new("td").class("instrument").attr("data-label", "Instrument"));
        doc.append(cell, ElementSpec::new("a").class("initial"));
        doc.append(row, ElementSpec::new("td").attr("data-label", "Invested").text("10,000.00"));
        doc.append(row, ElementSpec::new("td").attr("data-label", "Day chg.").text("+2.50%"));

        assert_eq!(extract_symbol(&doc, row).as_deref(), Some("INFY"));
        let excluded: BTreeSet<String> = ["INFY".to_string()].into();
        let mut rec = Reconciler::new();
        rec.reconcile(&mut doc, &excluded, &BTreeMap::new(), 0.2);
        assert_eq!(extract_symbol(&doc, row).as_deref(), Some("INFY"));

        rec.reconcile(&mut doc, &excluded, &BTreeMap::new(), 0.2);
        let toggle = doc.query(row, ".kx-exclude").unwrap();
        assert_eq!(doc.attr(toggle, "checked").as_deref(), Some("true"));
        assert_eq!(doc.attr(toggle, "data-symbol").as_deref(), Some("INFY"));
    }

    #[test]
    fn button_lookup_resolves_kind() {
        let (mut doc, row) = positions_page();
        Reconciler::new().reconcile(&mut doc, &BTreeSet::new(), &BTreeMap::new(), 0.2);
        let chart = doc.query(row, ".kx-btn-chart").unwrap();
        assert_eq!(button_action(&doc, chart), Some(ActionKind::Chart));
        assert_eq!(owning_row(&doc, chart), Some(row));
    }
}
