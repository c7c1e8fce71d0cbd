//! Wiring of the synchronization engine.
//!
//! ```text
//! mutation ──► Debounce ──► Throttle ──► Reconciler ──► badges
//!                                            │
//!                                            └──► Summary (per section)
//! UI events ──► Preferences ──► Summary
//! button click ──► action task (runs independently of the loop)
//! ```
//!
//! Everything runs on one cooperative timeline. The document is shared as
//! `Rc<RefCell<_>>` so that an in-flight action task and a reconciliation pass
//! can interleave at the action's wait points.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Instant;

use crate::action::{trigger_action, ActionKind, ActionOutcome};
use crate::config::Config;
use crate::dom::{HostDocument, NodeId};
use crate::inject::{button_action, control_symbol, owning_row, ReconcileReport, Reconciler};
use crate::logging::{log, obj, v_num, v_str, warn, Domain, Level};
use crate::prefs::{KeyValueStore, Preferences, Tag};
use crate::scrape::PageKind;
use crate::summary::{recompute, section_for, SummaryOutcome, SECTIONS};
use crate::watch::{CounterWatch, Debounce, Notifier, Throttle};

/// The host's open-orders counter in the navigation bar.
pub const ORDERS_COUNTER: &str = r#"a[href="/orders"] .count, .orders-count"#;

/// User interaction on an injected control, as reported by the host binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    ActionClicked { button: NodeId },
    ExcludeToggled { toggle: NodeId },
    TagSelected { selector: NodeId, tag: Tag },
    RowHovered { row: NodeId },
}

/// An action the user asked for; run it with `Engine::action_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAction {
    pub row: NodeId,
    pub kind: ActionKind,
}

pub struct Engine<D: HostDocument, S: KeyValueStore> {
    doc: Rc<RefCell<D>>,
    prefs: Preferences<S>,
    reconciler: Reconciler,
    debounce: Debounce,
    throttle: Throttle,
    counter: CounterWatch,
    notifier: Box<dyn Notifier>,
    cfg: Config,
}

impl<D: HostDocument, S: KeyValueStore> Engine<D, S> {
    pub fn new(doc: Rc<RefCell<D>>, prefs: Preferences<S>, notifier: Box<dyn Notifier>, cfg: Config) -> Self {
        Self {
            doc,
            prefs,
            reconciler: Reconciler::new(),
            debounce: Debounce::new(cfg.debounce),
            throttle: Throttle::new(cfg.throttle),
            counter: CounterWatch::new(),
            notifier,
            cfg,
        }
    }

    pub fn document(&self) -> Rc<RefCell<D>> {
        Rc::clone(&self.doc)
    }

    pub fn prefs(&self) -> &Preferences<S> {
        &self.prefs
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Document mutation callback. Reconciliation is deferred to `tick`; the
    /// orders counter is checked immediately.
    pub fn on_mutation(&mut self, now: Instant) {
        self.debounce.note(now);
        self.watch_counter();
    }

    /// Run a reconciliation pass if the mutation burst has gone quiet and the
    /// throttle window allows it.
    pub fn tick(&mut self, now: Instant) -> Option<ReconcileReport> {
        if !self.debounce.ready(now) || !self.throttle.try_acquire(now) {
            return None;
        }
        self.debounce.clear();
        Some(self.reconcile_now())
    }

    /// Unconditional pass: inject/refresh rows, then recompute every summary.
    pub fn reconcile_now(&mut self) -> ReconcileReport {
        let excluded = self.prefs.get_excluded();
        let tags = self.prefs.get_tags();
        let report = {
            let mut doc = self.doc.borrow_mut();
            self.reconciler.reconcile(&mut *doc, &excluded, &tags, self.cfg.mis_margin_factor)
        };
        if report.injected > 0 {
            log(
                Level::Info,
                Domain::Inject,
                "injected",
                obj(&[
                    ("rows", v_num(report.rows as f64)),
                    ("injected", v_num(report.injected as f64)),
                ]),
            );
        }
        self.recompute_summaries();
        report
    }

    pub fn recompute_summaries(&mut self) -> Vec<SummaryOutcome> {
        SECTIONS.iter().map(|s| self.recompute_section(s.kind)).collect()
    }

    pub fn recompute_section(&mut self, kind: PageKind) -> SummaryOutcome {
        let excluded = self.prefs.get_excluded();
        let tags = self.prefs.get_tags();
        let mut doc = self.doc.borrow_mut();
        recompute(&mut *doc, section_for(kind), &excluded, &tags, self.cfg.mis_margin_factor)
    }

    fn watch_counter(&mut self) {
        let text = {
            let doc = self.doc.borrow();
            doc.query(doc.root(), ORDERS_COUNTER).map(|n| doc.text(n))
        };
        if let Some(notification) = text.and_then(|t| self.counter.observe(&t)) {
            self.notifier.notify(&notification);
        }
    }

    /// Apply a user interaction. Action clicks are returned for the caller to
    /// run, so the menu sequence never blocks the reconciliation loop.
    pub fn handle(&mut self, event: UiEvent) -> Option<PendingAction> {
        match event {
            UiEvent::ActionClicked { button } => {
                let doc = self.doc.borrow();
                let kind = button_action(&*doc, button)?;
                let Some(row) = owning_row(&*doc, button) else {
                    warn(Domain::Inject, "orphan_button", obj(&[("action", v_str(kind.display_name()))]));
                    return None;
                };
                Some(PendingAction { row, kind })
            }
            UiEvent::ExcludeToggled { toggle } => {
                let symbol = control_symbol(&*self.doc.borrow(), toggle)?;
                let now_excluded = self.prefs.toggle_excluded(&symbol);
                let checked = if now_excluded { "true" } else { "false" };
                self.doc.borrow_mut().set_attr(toggle, "checked", checked);
                log(
                    Level::Info,
                    Domain::Store,
                    "exclude_toggled",
                    obj(&[("symbol", v_str(&symbol)), ("excluded", v_str(checked))]),
                );
                self.recompute_section(PageKind::Holdings);
                None
            }
            UiEvent::TagSelected { selector, tag } => {
                let symbol = control_symbol(&*self.doc.borrow(), selector)?;
                self.prefs.set_tag(&symbol, tag);
                self.doc.borrow_mut().set_attr(selector, "value", tag.as_str());
                log(
                    Level::Info,
                    Domain::Store,
                    "tag_selected",
                    obj(&[("symbol", v_str(&symbol)), ("tag", v_str(tag.as_str()))]),
                );
                self.recompute_section(PageKind::Holdings);
                None
            }
            UiEvent::RowHovered { row } => {
                let mut doc = self.doc.borrow_mut();
                self.reconciler.refresh_row(&mut *doc, row, self.cfg.mis_margin_factor);
                None
            }
        }
    }

    /// Detached future running the menu automation for `pending`. It holds
    /// its own handle to the document, so the engine stays usable meanwhile.
    pub fn action_task(&self, pending: PendingAction) -> impl Future<Output = ActionOutcome> + 'static
    where
        D: 'static,
        S: 'static,
    {
        let doc = Rc::clone(&self.doc);
        let timing = self.cfg.timing;
        async move { trigger_action(&*doc, pending.row, pending.kind, &timing).await }
    }
}
