//! End-to-end reconciliation over in-memory host pages.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use kite_overlay::config::Config;
use kite_overlay::dom::fixture::{holdings_page, orders_counter, orders_page, positions_page, HoldingRow, OrderRow};
use kite_overlay::dom::{ElementSpec, HostDocument, MemoryDocument};
use kite_overlay::engine::{Engine, UiEvent};
use kite_overlay::prefs::{MemoryStore, Preferences, Tag};
use kite_overlay::summary::SummaryOutcome;
use kite_overlay::watch::{LogNotifier, Notification, RecordingNotifier};

fn holdings_doc() -> (MemoryDocument, kite_overlay::dom::fixture::Section) {
    let mut doc = MemoryDocument::new();
    let section = holdings_page(
        &mut doc,
        &[
            HoldingRow { symbol: "INFY", invested: "10,000.00", current: "10,400.00", day_chg: "+2.50%" },
            HoldingRow { symbol: "LIQUIDBEES", invested: "5,000.00", current: "5,001.00", day_chg: "0.02%" },
            HoldingRow { symbol: "TCS", invested: "2,000.00", current: "1,900.00", day_chg: "-1.00%" },
        ],
    );
    (doc, section)
}

fn engine_for(doc: MemoryDocument) -> (Engine<MemoryDocument, MemoryStore>, Rc<RefCell<MemoryDocument>>) {
    let doc = Rc::new(RefCell::new(doc));
    let engine = Engine::new(
        Rc::clone(&doc),
        Preferences::new(MemoryStore::new()),
        Box::new(LogNotifier),
        Config::default(),
    );
    (engine, doc)
}

fn summary_markup(doc: &MemoryDocument, header: kite_overlay::dom::NodeId) -> String {
    doc.query(header, ".kx-summary").map(|s| doc.markup(s)).unwrap_or_default()
}

#[test]
fn second_pass_adds_nothing() {
    let (doc, section) = holdings_doc();
    let (mut engine, doc) = engine_for(doc);

    let first = engine.reconcile_now();
    assert_eq!(first.rows, 3);
    assert_eq!(first.injected, 3);

    let snapshot = |d: &MemoryDocument| {
        (
            d.query_all(d.root(), ".kx-actions").len(),
            d.query_all(d.root(), ".kx-btn").len(),
            d.query_all(d.root(), ".kx-badge").len(),
            d.query_all(d.root(), ".kx-exclude").len(),
            d.query_all(d.root(), ".kx-tag").len(),
            d.query_all(d.root(), ".kx-summary").len(),
            section.rows.iter().map(|r| d.text(d.query(*r, ".kx-badge").unwrap())).collect::<Vec<_>>(),
        )
    };
    let before = snapshot(&*doc.borrow());
    assert_eq!((before.0, before.1, before.2, before.3, before.4, before.5), (3, 18, 3, 3, 3, 1));

    let second = engine.reconcile_now();
    assert_eq!(second.injected, 0);
    assert_eq!(snapshot(&*doc.borrow()), before);
    assert_eq!(before.6[0], "Day +250.00");
}

#[test]
fn summary_render_skips_identical_markup() {
    let (doc, _) = holdings_doc();
    let (mut engine, _doc) = engine_for(doc);
    engine.reconcile_now();
    let outcomes = engine.recompute_summaries();
    assert_eq!(outcomes[0], SummaryOutcome::Unchanged);
    assert_eq!(outcomes[1], SummaryOutcome::NoHeader);
    assert_eq!(outcomes[2], SummaryOutcome::NoHeader);
}

#[test]
fn exclude_and_tag_flow_through_store_and_totals() {
    let (doc, section) = holdings_doc();
    let (mut engine, doc) = engine_for(doc);
    engine.reconcile_now();
    assert!(summary_markup(&doc.borrow(), section.header).contains("Invested <b>17,000.00</b>"));

    let toggle = doc.borrow().query(section.rows[1], ".kx-exclude").unwrap();
    let selector = doc.borrow().query(section.rows[1], ".kx-tag").unwrap();

    assert_eq!(engine.handle(UiEvent::ExcludeToggled { toggle }), None);
    assert!(engine.prefs().is_excluded("LIQUIDBEES"));
    assert_eq!(doc.borrow().attr(toggle, "checked").as_deref(), Some("true"));

    engine.handle(UiEvent::TagSelected { selector, tag: Tag::Mf });
    assert_eq!(engine.prefs().tag_of("LIQUIDBEES"), Tag::Mf);

    let markup = summary_markup(&doc.borrow(), section.header);
    assert!(markup.contains("Invested <b>12,000.00</b>"), "{}", markup);
    assert!(markup.contains(r#"data-tag="MF">MF: Inv <b>5,000.00</b>"#), "{}", markup);

    engine.handle(UiEvent::ExcludeToggled { toggle });
    assert!(!engine.prefs().is_excluded("LIQUIDBEES"));
    assert!(summary_markup(&doc.borrow(), section.header).contains("Invested <b>17,000.00</b>"));
}

#[test]
fn non_qualifying_rows_stay_out_of_totals() {
    let (mut doc, section) = holdings_doc();
    // Holdings-shaped but no symbol anywhere.
    let nameless = doc.append(section.body, ElementSpec::new("tr"));
    let cell = doc.append(
        nameless,
        ElementSpec::new("td").class("instrument").attr("data-label", "Instrument"),
    );
    doc.append(cell, ElementSpec::new("a").class("initial"));
    for (label, text) in [("Invested", "99,999.00"), ("Cur. val", "99,999.00"), ("Day chg.", "5.00%")] {
        doc.append(nameless, ElementSpec::new("td").attr("data-label", label).text(text));
    }
    // A symbol but no recognisable column shape.
    let odd = doc.append(section.body, ElementSpec::new("tr"));
    let cell = doc.append(odd, ElementSpec::new("td").class("instrument").attr("data-label", "Instrument"));
    doc.append(cell, ElementSpec::new("a").class("initial").text("WIPRO"));
    doc.append(odd, ElementSpec::new("td").attr("data-label", "LTP").text("480.00"));

    let doc = Rc::new(RefCell::new(doc));
    let mut prefs = Preferences::new(MemoryStore::new());
    prefs.set_excluded_state("TCS", true);
    prefs.set_tag("TCS", Tag::Bond);
    prefs.set_tag("LIQUIDBEES", Tag::Mf);
    prefs.set_tag("INFY", Tag::Equity);
    prefs.set_tag("WIPRO", Tag::Equity);
    let mut engine = Engine::new(Rc::clone(&doc), prefs, Box::new(LogNotifier), Config::default());

    let report = engine.reconcile_now();
    assert_eq!((report.rows, report.injected, report.skipped), (5, 3, 2));

    let d = doc.borrow();
    assert!(d.query(nameless, ".kx-actions").is_none());
    assert!(d.query(odd, ".kx-actions").is_none());
    let markup = summary_markup(&d, section.header);
    // INFY + LIQUIDBEES; TCS excluded.
    assert!(
        markup.contains(r#"Invested <b>15,000.00</b> · Current <b>15,401.00</b> · Day <b class="kx-pos">+251.00</b>"#),
        "{}",
        markup
    );
    assert!(markup.contains(r#"data-tag="EQUITY">EQUITY: Inv <b>10,000.00</b>"#), "{}", markup);
    assert!(markup.contains(r#"data-tag="MF">MF: Inv <b>5,000.00</b>"#), "{}", markup);
    // Excluded rows still feed their tag bucket.
    assert!(markup.contains(r#"data-tag="BOND">BOND: Inv <b>2,000.00</b>"#), "{}", markup);
    assert!(!markup.contains("99,999"), "{}", markup);
}

#[test]
fn controls_initialise_from_stored_preferences() {
    let (doc, section) = holdings_doc();
    let doc = Rc::new(RefCell::new(doc));
    let mut prefs = Preferences::new(MemoryStore::new());
    prefs.set_excluded_state("TCS", true);
    prefs.set_tag("INFY", Tag::Equity);
    let mut engine = Engine::new(Rc::clone(&doc), prefs, Box::new(LogNotifier), Config::default());
    engine.reconcile_now();

    let d = doc.borrow();
    let tcs_toggle = d.query(section.rows[2], ".kx-exclude").unwrap();
    let infy_tag = d.query(section.rows[0], ".kx-tag").unwrap();
    assert_eq!(d.attr(tcs_toggle, "checked").as_deref(), Some("true"));
    assert_eq!(d.attr(infy_tag, "value").as_deref(), Some("EQUITY"));
    assert_eq!(d.query_all(infy_tag, "option").len(), 6);
}

#[test]
fn hover_refreshes_badge_after_host_update() {
    let (doc, section) = holdings_doc();
    let (mut engine, doc) = engine_for(doc);
    engine.reconcile_now();

    let row = section.rows[0];
    let day_cell = doc.borrow().query(row, r#"td[data-label="Day chg."]"#).unwrap();
    doc.borrow_mut().set_text(day_cell, "-1.00%");
    engine.handle(UiEvent::RowHovered { row });

    let d = doc.borrow();
    let badge = d.query(row, ".kx-badge").unwrap();
    assert_eq!(d.text(badge), "Day -100.00");
    assert!(d.has_class(badge, "kx-neg"));
    assert!(!d.has_class(badge, "kx-pos"));
}

#[test]
fn positions_total_invested() {
    let mut doc = MemoryDocument::new();
    let section = positions_page(&mut doc, &[("SBIN", "50", "120.40"), ("IDEA", "-100", "8.00")]);
    let (mut engine, doc) = engine_for(doc);
    engine.reconcile_now();
    let markup = summary_markup(&doc.borrow(), section.header);
    assert_eq!(markup, r#"<span class="kx-sum">Invested <b>5,220.00</b></span>"#);
    assert!(doc.borrow().query(section.rows[0], ".kx-exclude").is_none());
}

#[test]
fn order_margin_counts_open_orders_only() {
    let mut doc = MemoryDocument::new();
    let (pending, done) = orders_page(
        &mut doc,
        &[
            OrderRow { symbol: "IDEA", product: "MIS", qty: "30/50", price: "99.5", ltp: "100.00" },
            OrderRow { symbol: "ITC", product: "CNC", qty: "10", price: "400.00", ltp: "0" },
        ],
        &[OrderRow { symbol: "HDFC", product: "CNC", qty: "5/5", price: "1,600.00", ltp: "1,610.00" }],
    );
    let (mut engine, doc) = engine_for(doc);
    let report = engine.reconcile_now();
    assert_eq!(report.rows, 2);

    let d = doc.borrow();
    assert_eq!(
        summary_markup(&d, pending.header),
        r#"<span class="kx-sum">Margin <b>4,995.00</b></span>"#
    );
    assert!(d.query(done.header, ".kx-summary").is_none());
    assert!(d.query(done.rows[0], ".kx-actions").is_none());
    let idea_badge = d.query(pending.rows[0], ".kx-badge").unwrap();
    assert!(d.text(idea_badge).starts_with("Margin 995.00"));
}

#[test]
fn mutation_bursts_are_debounced_then_throttled() {
    let (doc, _) = holdings_doc();
    let (mut engine, _doc) = engine_for(doc);
    let t0 = Instant::now();
    let ms = Duration::from_millis;

    engine.on_mutation(t0);
    engine.on_mutation(t0 + ms(100));
    assert!(engine.tick(t0 + ms(200)).is_none());
    assert!(engine.tick(t0 + ms(350)).is_some());
    // Nothing pending: no pass.
    assert!(engine.tick(t0 + ms(2000)).is_none());

    // New burst settles inside the throttle window: held until it opens.
    engine.on_mutation(t0 + ms(400));
    assert!(engine.tick(t0 + ms(700)).is_none());
    assert!(engine.tick(t0 + ms(1350)).is_some());
}

#[test]
fn counter_change_emits_one_notification() {
    let mut doc = MemoryDocument::new();
    let counter = orders_counter(&mut doc, "2");
    let doc = Rc::new(RefCell::new(doc));
    let seen = Rc::new(RefCell::new(RecordingNotifier::default()));
    let mut engine = Engine::new(
        Rc::clone(&doc),
        Preferences::new(MemoryStore::new()),
        Box::new(Rc::clone(&seen)),
        Config::default(),
    );
    let t0 = Instant::now();

    engine.on_mutation(t0);
    engine.on_mutation(t0);
    assert!(seen.borrow().seen.is_empty());

    doc.borrow_mut().set_text(counter, "3");
    engine.on_mutation(t0);
    engine.on_mutation(t0);
    assert_eq!(seen.borrow().seen, vec![Notification::orders_count("3")]);
}
