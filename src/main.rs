use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use anyhow::Result;
use kite_overlay::action::ActionKind;
use kite_overlay::config::Config;
use kite_overlay::dom::fixture::{attach_menu, holdings_page, orders_counter, HoldingRow};
use kite_overlay::dom::{HostDocument, MemoryDocument};
use kite_overlay::engine::{Engine, PendingAction, UiEvent};
use kite_overlay::logging::{log, obj, v_num, v_str, Domain, Level};
use kite_overlay::prefs::{Preferences, SqliteStore, Tag};
use kite_overlay::summary::SUMMARY_CLASS;
use kite_overlay::watch::LogNotifier;
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let store = SqliteStore::open(&cfg.prefs_path, &cfg.origin)?;
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("prefs_path", v_str(&cfg.prefs_path)),
            ("origin", v_str(&cfg.origin)),
            ("debounce_ms", v_num(cfg.debounce.as_millis() as f64)),
        ]),
    );

    let mut doc = MemoryDocument::new();
    let counter = orders_counter(&mut doc, "2");
    let holdings = holdings_page(
        &mut doc,
        &[
            HoldingRow { symbol: "INFY", invested: "10,000.00", current: "10,450.00", day_chg: "+2.50%" },
            HoldingRow { symbol: "LIQUIDBEES", invested: "25,000.00", current: "25,010.00", day_chg: "0.01%" },
            HoldingRow { symbol: "SGBAUG28", invested: "6,150.00", current: "7,020.00", day_chg: "-0.40%" },
        ],
    );
    attach_menu(
        &mut doc,
        holdings.rows[0],
        &[("Add", "icon-plus"), ("Chart", "icon-trending-up"), ("Market depth", "icon-book-open")],
    );

    let doc = Rc::new(RefCell::new(doc));
    let mut engine = Engine::new(Rc::clone(&doc), Preferences::new(store), Box::new(LogNotifier), cfg);

    // Initial render burst; wait for the debounce to settle.
    engine.on_mutation(Instant::now());
    loop {
        if let Some(report) = engine.tick(Instant::now()) {
            log(
                Level::Info,
                Domain::System,
                "reconciled",
                obj(&[("rows", v_num(report.rows as f64)), ("injected", v_num(report.injected as f64))]),
            );
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    let (toggle, selector, chart) = {
        let d = doc.borrow();
        (
            d.query(holdings.rows[1], ".kx-exclude"),
            d.query(holdings.rows[2], ".kx-tag"),
            d.query(holdings.rows[0], ".kx-btn-chart"),
        )
    };
    if let Some(toggle) = toggle {
        if !engine.prefs().is_excluded("LIQUIDBEES") {
            engine.handle(UiEvent::ExcludeToggled { toggle });
        }
    }
    if let Some(selector) = selector {
        engine.handle(UiEvent::TagSelected { selector, tag: Tag::Sgb });
    }

    doc.borrow_mut().set_text(counter, "3");
    engine.on_mutation(Instant::now());

    let pending = chart
        .and_then(|button| engine.handle(UiEvent::ActionClicked { button }))
        .unwrap_or(PendingAction { row: holdings.rows[0], kind: ActionKind::Chart });
    let outcome = engine.action_task(pending).await;
    log(
        Level::Info,
        Domain::System,
        "action_done",
        obj(&[("outcome", v_str(&format!("{:?}", outcome)))]),
    );

    let markup = {
        let d = doc.borrow();
        d.query(holdings.header, &format!(".{}", SUMMARY_CLASS))
            .map(|slot| d.markup(slot))
            .unwrap_or_default()
    };
    log(Level::Info, Domain::System, "summary", obj(&[("markup", v_str(&markup))]));
    Ok(())
}
