//! Builders for host-shaped pages in a `MemoryDocument`, used by the demo
//! binary and the integration tests.

use super::memory::MemoryDocument;
use super::{ElementSpec, HostDocument, NodeId, SyntheticEvent};

#[derive(Debug, Clone)]
pub struct HoldingRow<'a> {
    pub symbol: &'a str,
    pub invested: &'a str,
    pub current: &'a str,
    pub day_chg: &'a str,
}

#[derive(Debug, Clone)]
pub struct OrderRow<'a> {
    pub symbol: &'a str,
    pub product: &'a str,
    pub qty: &'a str,
    pub price: &'a str,
    pub ltp: &'a str,
}

/// Handles to a rendered section.
#[derive(Debug, Clone)]
pub struct Section {
    pub root: NodeId,
    pub header: NodeId,
    pub body: NodeId,
    pub rows: Vec<NodeId>,
}

fn section(doc: &mut MemoryDocument, class: &str, title: &str) -> Section {
    let root = doc.root();
    let wrap = doc.append(root, ElementSpec::new("div").class(class));
    let header = doc.append(wrap, ElementSpec::new("h3").class("section-header").text(title));
    let table = doc.append(wrap, ElementSpec::new("table"));
    let body = doc.append(table, ElementSpec::new("tbody"));
    Section { root: wrap, header, body, rows: Vec::new() }
}

fn instrument_row(doc: &mut MemoryDocument, body: NodeId, symbol: &str) -> NodeId {
    let row = doc.append(body, ElementSpec::new("tr"));
    let cell = doc.append(
        row,
        ElementSpec::new("td").class("instrument").attr("data-label", "Instrument"),
    );
    doc.append(cell, ElementSpec::new("a").class("initial").text(symbol));
    doc.append(cell, ElementSpec::new("span").class("table-menu-button"));
    row
}

fn cell(doc: &mut MemoryDocument, row: NodeId, label: &str, text: &str) {
    doc.append(row, ElementSpec::new("td").attr("data-label", label).text(text));
}

pub fn holdings_page(doc: &mut MemoryDocument, rows: &[HoldingRow<'_>]) -> Section {
    let mut s = section(doc, "holdings", "Holdings");
    for h in rows {
        let row = instrument_row(doc, s.body, h.symbol);
        cell(doc, row, "Qty.", "10");
        cell(doc, row, "Avg. cost", "100.00");
        cell(doc, row, "Invested", h.invested);
        cell(doc, row, "Cur. val", h.current);
        cell(doc, row, "Day chg.", h.day_chg);
        s.rows.push(row);
    }
    s
}

pub fn positions_page(doc: &mut MemoryDocument, rows: &[(&str, &str, &str)]) -> Section {
    let mut s = section(doc, "positions", "Positions");
    for (symbol, qty, avg) in rows {
        let row = instrument_row(doc, s.body, symbol);
        cell(doc, row, "Product", "NRML");
        cell(doc, row, "Qty.", qty);
        cell(doc, row, "Avg.", avg);
        s.rows.push(row);
    }
    s
}

/// Open orders go into `.pending-orders`; `completed` rows into a separate
/// `.completed-orders` table that totals must ignore.
pub fn orders_page(doc: &mut MemoryDocument, open: &[OrderRow<'_>], completed: &[OrderRow<'_>]) -> (Section, Section) {
    let mut pending = section(doc, "pending-orders", "Open orders");
    for o in open {
        let row = order_row(doc, pending.body, o);
        pending.rows.push(row);
    }
    let mut done = section(doc, "completed-orders", "Executed orders");
    for o in completed {
        let row = order_row(doc, done.body, o);
        done.rows.push(row);
    }
    (pending, done)
}

fn order_row(doc: &mut MemoryDocument, body: NodeId, o: &OrderRow<'_>) -> NodeId {
    let row = instrument_row(doc, body, o.symbol);
    cell(doc, row, "Product", o.product);
    cell(doc, row, "Qty.", o.qty);
    cell(doc, row, "LTP", o.ltp);
    cell(doc, row, "Price", o.price);
    row
}

/// Make the row's menu opener render a popup with `entries` (label, icon
/// class) when clicked, the way the host does.
pub fn attach_menu(doc: &mut MemoryDocument, row: NodeId, entries: &[(&'static str, &'static str)]) {
    let Some(opener) = doc.query(row, ".table-menu-button") else {
        return;
    };
    let entries: Vec<(&'static str, &'static str)> = entries.to_vec();
    doc.on_event(
        opener,
        Box::new(move |d: &mut MemoryDocument, ev: &SyntheticEvent| {
            if *ev != SyntheticEvent::Click {
                return;
            }
            let root = d.root();
            let popup = d.append(root, ElementSpec::new("ul").class("table-menu-content"));
            for (label, icon) in &entries {
                let item = d.append(popup, ElementSpec::new("li"));
                let link = d.append(item, ElementSpec::new("a").attr("href", "#"));
                if !icon.is_empty() {
                    d.append(link, ElementSpec::new("span").class(icon));
                }
                d.append(link, ElementSpec::new("span").text(label));
            }
        }),
    );
}

/// Orders counter in the navigation bar.
pub fn orders_counter(doc: &mut MemoryDocument, value: &str) -> NodeId {
    let root = doc.root();
    let link = doc.append(root, ElementSpec::new("a").attr("href", "/orders"));
    doc.append(link, ElementSpec::new("span").class("count").text(value))
}
