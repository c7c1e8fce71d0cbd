//! Reads labeled cell text from host rows and derives display figures.
//!
//! Numbers come from locale-formatted text. `parse_number` is fallible and
//! returns `None` for anything unparseable; the scraper then applies a
//! zero default (`number_or_zero`), so a malformed cell yields a zero figure
//! rather than an error.

use std::collections::BTreeMap;

use crate::dom::{HostDocument, NodeId};
use crate::inject::ACTIONS_CLASS;
use crate::logging::{debug, obj, v_str, Domain};

/// Cell labels as rendered in the host's `data-label` attributes.
pub mod labels {
    pub const INSTRUMENT: &str = "Instrument";
    pub const INVESTED: &str = "Invested";
    pub const DAY_CHG: &str = "Day chg.";
    pub const CUR_VAL: &str = "Cur. val";
    pub const QTY: &str = "Qty.";
    pub const AVG: &str = "Avg.";
    pub const PRICE: &str = "Price";
    pub const LTP: &str = "LTP";
    pub const PRODUCT: &str = "Product";
}

/// Tried in order; the first with text wins.
const SYMBOL_PROBES: [&str; 3] = ["a.initial", ".tradingsymbol", "span.symbol"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Holdings,
    Positions,
    Orders,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Holdings => "holdings",
            PageKind::Positions => "positions",
            PageKind::Orders => "orders",
        }
    }
}

/// Label -> text snapshot of one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowCells {
    cells: BTreeMap<String, String>,
}

impl RowCells {
    pub fn from_row<D: HostDocument>(doc: &D, row: NodeId) -> Self {
        let mut cells = BTreeMap::new();
        for cell in doc.query_all(row, "td[data-label]") {
            if let Some(label) = doc.attr(cell, "data-label") {
                cells.entry(label.trim().to_string()).or_insert_with(|| doc.text(cell));
            }
        }
        Self { cells }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            cells: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.cells.get(label).map(String::as_str)
    }

    pub fn has(&self, label: &str) -> bool {
        self.cells.contains_key(label)
    }

    pub fn number(&self, label: &str) -> f64 {
        number_or_zero(self.get(label))
    }
}

/// Page kind from which labeled cells are present. Holdings wins over
/// Positions, which wins over Orders.
pub fn classify(cells: &RowCells) -> Option<PageKind> {
    use labels::*;
    if cells.has(INVESTED) && cells.has(DAY_CHG) {
        Some(PageKind::Holdings)
    } else if cells.has(QTY) && cells.has(AVG) && !cells.has(PRICE) {
        Some(PageKind::Positions)
    } else if cells.has(QTY) && cells.has(PRICE) {
        Some(PageKind::Orders)
    } else {
        None
    }
}

/// Parse locale-formatted numeric text ("1,23,456.78", "+2.50%", "₹ 99.5").
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '%' | '₹') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn number_or_zero(text: Option<&str>) -> f64 {
    text.and_then(parse_number).unwrap_or(0.0)
}

/// Order quantity cell: "filled/total" uses total, falling back to the
/// first component when no second one is present.
pub fn parse_order_qty(text: &str) -> f64 {
    match text.split_once('/') {
        Some((first, second)) => parse_number(second)
            .or_else(|| parse_number(first))
            .unwrap_or(0.0),
        None => parse_number(text).unwrap_or(0.0),
    }
}

pub fn holdings_day_profit(invested: f64, day_chg_pct: f64) -> f64 {
    invested * (day_chg_pct / 100.0)
}

pub fn positions_invested(qty: f64, avg: f64) -> f64 {
    qty * avg
}

pub fn is_mis(product: &str) -> bool {
    product.to_ascii_uppercase().contains("MIS")
}

pub fn orders_locked_margin(qty: f64, price: f64, product: &str, mis_factor: f64) -> f64 {
    let factor = if is_mis(product) { mis_factor } else { 1.0 };
    qty * price * factor
}

/// Percent distance of the last traded price from the order price.
pub fn ltp_delta_pct(ltp: f64, price: f64) -> Option<f64> {
    if ltp > 0.0 && price > 0.0 {
        Some((ltp - price) / price * 100.0)
    } else {
        None
    }
}

/// Instrument symbol for a row, or `None` when nothing symbol-like is found.
///
/// Once the action container is injected its `data-symbol` is authoritative:
/// the container sits inside the identifier, so probe text would also pick
/// up badge and option text.
pub fn extract_symbol<D: HostDocument>(doc: &D, row: NodeId) -> Option<String> {
    let cell = doc.query(row, "td.instrument");
    let scope = cell.unwrap_or(row);
    let stamped = doc
        .query(scope, &format!(".{}[data-symbol]", ACTIONS_CLASS))
        .and_then(|container| doc.attr(container, "data-symbol"));
    let from_probe = || {
        SYMBOL_PROBES
            .iter()
            .filter_map(|probe| doc.query(scope, probe))
            .map(|n| doc.text(n))
            .find(|s| !s.trim().is_empty())
    };
    let from_attr = || doc.attr(row, "data-symbol");
    let from_cell = || cell.map(|c| doc.text(c));
    let raw = stamped
        .filter(|s| !s.trim().is_empty())
        .or_else(from_probe)
        .or_else(from_attr)
        .or_else(from_cell)?;
    raw.split_whitespace().next().map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Positive,
    Negative,
}

impl Tone {
    pub fn of(value: f64) -> Option<Tone> {
        if value > 0.0 {
            Some(Tone::Positive)
        } else if value < 0.0 {
            Some(Tone::Negative)
        } else {
            None
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            Tone::Positive => "kx-pos",
            Tone::Negative => "kx-neg",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Badge {
    pub text: String,
    pub tooltip: String,
    pub tone: Option<Tone>,
}

/// Derived per-row numbers feeding both the badge and the page totals.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFigures {
    pub kind: PageKind,
    pub symbol: String,
    pub invested: f64,
    pub current: f64,
    pub day_profit: f64,
    pub margin: f64,
    /// Inputs kept for the tooltip.
    pub qty: f64,
    pub price: f64,
    pub day_chg_pct: f64,
    pub ltp_delta_pct: Option<f64>,
    pub mis: bool,
}

impl RowFigures {
    pub fn derive(symbol: &str, kind: PageKind, cells: &RowCells, mis_factor: f64) -> Self {
        use labels::*;
        let mut out = RowFigures {
            kind,
            symbol: symbol.to_string(),
            invested: 0.0,
            current: 0.0,
            day_profit: 0.0,
            margin: 0.0,
            qty: 0.0,
            price: 0.0,
            day_chg_pct: 0.0,
            ltp_delta_pct: None,
            mis: false,
        };
        match kind {
            PageKind::Holdings => {
                out.invested = cells.number(INVESTED);
                out.current = cells.number(CUR_VAL);
                out.day_chg_pct = cells.number(DAY_CHG);
                out.day_profit = holdings_day_profit(out.invested, out.day_chg_pct);
            }
            PageKind::Positions => {
                out.qty = cells.number(QTY);
                out.price = cells.number(AVG);
                out.invested = positions_invested(out.qty, out.price);
            }
            PageKind::Orders => {
                let product = cells.get(PRODUCT).unwrap_or("");
                out.qty = cells.get(QTY).map(parse_order_qty).unwrap_or(0.0);
                out.price = cells.number(PRICE);
                out.mis = is_mis(product);
                out.margin = orders_locked_margin(out.qty, out.price, product, mis_factor);
                out.ltp_delta_pct = ltp_delta_pct(cells.number(LTP), out.price);
            }
        }
        out
    }

    pub fn badge(&self, mis_factor: f64) -> Badge {
        match self.kind {
            PageKind::Holdings => Badge {
                text: format!("Day {}", format_signed(self.day_profit)),
                tooltip: format!(
                    "Day P&L = Invested × Day chg. / 100 = {} × {:.2}% / 100 = {}",
                    format_amount(self.invested),
                    self.day_chg_pct,
                    format_amount(self.day_profit)
                ),
                tone: Tone::of(self.day_profit),
            },
            PageKind::Positions => Badge {
                text: format!("Inv {}", format_amount(self.invested)),
                tooltip: format!(
                    "Invested = Qty. × Avg. = {} × {} = {}",
                    format_qty(self.qty),
                    format_amount(self.price),
                    format_amount(self.invested)
                ),
                tone: None,
            },
            PageKind::Orders => {
                let factor = if self.mis { mis_factor } else { 1.0 };
                let mut text = format!("Margin {}", format_amount(self.margin));
                let mut tooltip = format!(
                    "Margin = Qty. × Price × {}{} = {} × {} × {} = {}",
                    factor,
                    if self.mis { " (MIS)" } else { "" },
                    format_qty(self.qty),
                    format_amount(self.price),
                    factor,
                    format_amount(self.margin)
                );
                if let Some(delta) = self.ltp_delta_pct {
                    text.push_str(&format!(" · LTP {}%", format_signed(delta)));
                    tooltip.push_str(&format!(
                        "\nLTP vs price = (LTP − Price) / Price × 100 = {}%",
                        format_signed(delta)
                    ));
                }
                Badge { text, tooltip, tone: self.ltp_delta_pct.and_then(Tone::of) }
            }
        }
    }
}

/// Scrape one row: symbol, kind and figures. `None` for rows that are not
/// holdings/positions/orders shaped or carry no symbol.
pub fn scrape_row<D: HostDocument>(doc: &D, row: NodeId, mis_factor: f64) -> Option<RowFigures> {
    let cells = RowCells::from_row(doc, row);
    let kind = classify(&cells)?;
    let Some(symbol) = extract_symbol(doc, row) else {
        debug(Domain::Scrape, "no_symbol", obj(&[("page", v_str(kind.as_str()))]));
        return None;
    };
    Some(RowFigures::derive(&symbol, kind, &cells, mis_factor))
}

/// Two decimals with thousands grouping: `6,020.00`, `-1,250.50`.
pub fn format_amount(value: f64) -> String {
    let rounded = format!("{:.2}", value.abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let is_zero = rounded.chars().all(|c| c == '0' || c == '.');
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// `format_amount` with an explicit `+` for positive values.
pub fn format_signed(value: f64) -> String {
    let body = format_amount(value);
    if value > 0.0 && body != "0.00" {
        format!("+{}", body)
    } else {
        body
    }
}

fn format_qty(qty: f64) -> String {
    if qty.fract() == 0.0 {
        format!("{}", qty as i64)
    } else {
        format!("{:.2}", qty)
    }
}
