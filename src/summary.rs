//! Page-level totals rendered into the section header.
//!
//! Totals are recomputed from the rendered rows on every trigger and never
//! stored. Holdings rows honour the exclusion set (overall total only) and the
//! tag map (per-tag buckets; NONE never buckets, excluded rows still do).
//! Positions total invested capital; orders total locked margin over the
//! open-orders table only.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::dom::{ElementSpec, HostDocument, NodeId};
use crate::logging::{debug, log, markup_hash, obj, v_num, v_str, Domain, Level};
use crate::prefs::Tag;
use crate::scrape::{format_amount, format_signed, scrape_row, PageKind, RowFigures, Tone};

pub const SUMMARY_CLASS: &str = "kx-summary";

/// A tracked table: where its rows live and where its totals go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub kind: PageKind,
    pub rows: &'static str,
    pub header: &'static str,
}

pub const SECTIONS: [Section; 3] = [
    Section {
        kind: PageKind::Holdings,
        rows: ".holdings table tbody tr",
        header: ".holdings .section-header, .holdings h3",
    },
    Section {
        kind: PageKind::Positions,
        rows: ".positions table tbody tr",
        header: ".positions .section-header, .positions h3",
    },
    Section {
        kind: PageKind::Orders,
        rows: ".pending-orders table tbody tr",
        header: ".pending-orders .section-header, .pending-orders h3",
    },
];

pub fn section_for(kind: PageKind) -> &'static Section {
    match kind {
        PageKind::Holdings => &SECTIONS[0],
        PageKind::Positions => &SECTIONS[1],
        PageKind::Orders => &SECTIONS[2],
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub invested: f64,
    pub current: f64,
    pub day_profit: f64,
    pub margin: f64,
}

impl Totals {
    fn add(&mut self, fig: &RowFigures) {
        self.invested += fig.invested;
        self.current += fig.current;
        self.day_profit += fig.day_profit;
        self.margin += fig.margin;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub kind: PageKind,
    pub overall: Totals,
    pub by_tag: BTreeMap<Tag, Totals>,
    pub rows: usize,
    pub excluded: usize,
}

/// Pure aggregation over scraped rows of one page kind.
pub fn compute(
    kind: PageKind,
    rows: &[RowFigures],
    excluded: &BTreeSet<String>,
    tags: &BTreeMap<String, Tag>,
) -> Summary {
    let mut summary = Summary {
        kind,
        overall: Totals::default(),
        by_tag: BTreeMap::new(),
        rows: 0,
        excluded: 0,
    };
    for fig in rows.iter().filter(|f| f.kind == kind) {
        summary.rows += 1;
        if kind != PageKind::Holdings {
            summary.overall.add(fig);
            continue;
        }
        if excluded.contains(&fig.symbol) {
            summary.excluded += 1;
        } else {
            summary.overall.add(fig);
        }
        let tag = tags.get(&fig.symbol).copied().unwrap_or_default();
        if tag != Tag::None {
            summary.by_tag.entry(tag).or_default().add(fig);
        }
    }
    summary
}

fn tone_class(value: f64) -> &'static str {
    Tone::of(value).map(|t| t.class()).unwrap_or("")
}

/// Header markup for a summary. Tag buckets with zero invested are omitted.
pub fn render(summary: &Summary) -> String {
    let mut out = String::new();
    let t = &summary.overall;
    match summary.kind {
        PageKind::Holdings => {
            let _ = write!(
                out,
                r#"<span class="kx-sum">Invested <b>{}</b> · Current <b>{}</b> · Day <b class="{}">{}</b></span>"#,
                format_amount(t.invested),
                format_amount(t.current),
                tone_class(t.day_profit),
                format_signed(t.day_profit)
            );
            for (tag, b) in summary.by_tag.iter().filter(|(_, b)| b.invested != 0.0) {
                let _ = write!(
                    out,
                    r#"<span class="kx-sum-tag" data-tag="{}">{}: Inv <b>{}</b> · Cur <b>{}</b> · Day <b class="{}">{}</b></span>"#,
                    tag,
                    tag,
                    format_amount(b.invested),
                    format_amount(b.current),
                    tone_class(b.day_profit),
                    format_signed(b.day_profit)
                );
            }
        }
        PageKind::Positions => {
            let _ = write!(
                out,
                r#"<span class="kx-sum">Invested <b>{}</b></span>"#,
                format_amount(t.invested)
            );
        }
        PageKind::Orders => {
            let _ = write!(
                out,
                r#"<span class="kx-sum">Margin <b>{}</b></span>"#,
                format_amount(t.margin)
            );
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    Unchanged,
    Rendered(Summary),
    NoHeader,
    NoRows,
}

/// Scrape every row of the section that classifies as the section's kind.
pub fn scrape_section<D: HostDocument>(doc: &D, section: &Section, mis_factor: f64) -> Vec<RowFigures> {
    doc.query_all(doc.root(), section.rows)
        .into_iter()
        .filter_map(|row| scrape_row(doc, row, mis_factor))
        .filter(|fig| fig.kind == section.kind)
        .collect()
}

fn ensure_slot<D: HostDocument>(doc: &mut D, header: NodeId) -> NodeId {
    let selector = format!(".{}", SUMMARY_CLASS);
    match doc.query(header, &selector) {
        Some(slot) => slot,
        None => doc.append(header, ElementSpec::new("span").class(SUMMARY_CLASS)),
    }
}

/// Recompute one section's totals and write them into its header, touching
/// the header only when the markup differs from what is shown.
pub fn recompute<D: HostDocument>(
    doc: &mut D,
    section: &Section,
    excluded: &BTreeSet<String>,
    tags: &BTreeMap<String, Tag>,
    mis_factor: f64,
) -> SummaryOutcome {
    let page = section.kind.as_str();
    let rows = scrape_section(doc, section, mis_factor);
    let Some(header) = doc.query(doc.root(), section.header) else {
        if !rows.is_empty() {
            debug(Domain::Summary, "header_missing", obj(&[("page", v_str(page))]));
        }
        return SummaryOutcome::NoHeader;
    };

    if rows.is_empty() {
        let selector = format!(".{}", SUMMARY_CLASS);
        if let Some(slot) = doc.query(header, &selector) {
            if !doc.markup(slot).is_empty() {
                doc.set_markup(slot, "");
            }
        }
        return SummaryOutcome::NoRows;
    }

    let summary = compute(section.kind, &rows, excluded, tags);
    let markup = render(&summary);
    let slot = ensure_slot(doc, header);
    if doc.markup(slot) == markup {
        return SummaryOutcome::Unchanged;
    }
    doc.set_markup(slot, &markup);
    log(
        Level::Info,
        Domain::Summary,
        "rendered",
        obj(&[
            ("page", v_str(page)),
            ("rows", v_num(summary.rows as f64)),
            ("excluded", v_num(summary.excluded as f64)),
            ("invested", v_num(summary.overall.invested)),
            ("markup_hash", v_str(&markup_hash(&markup))),
        ]),
    );
    SummaryOutcome::Rendered(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, invested: f64, current: f64, day: f64) -> RowFigures {
        RowFigures {
            kind: PageKind::Holdings,
            symbol: symbol.to_string(),
            invested,
            current,
            day_profit: day,
            margin: 0.0,
            qty: 0.0,
            price: 0.0,
            day_chg_pct: 0.0,
            ltp_delta_pct: None,
            mis: false,
        }
    }

    #[test]
    fn excluded_rows_skip_overall_but_still_bucket() {
        let rows = vec![
            holding("INFY", 1000.0, 1100.0, 10.0),
            holding("LIQUIDBEES", 500.0, 500.0, 0.0),
            holding("TCS", 200.0, 180.0, -5.0),
        ];
        let excluded: BTreeSet<String> = ["LIQUIDBEES".to_string()].into();
        let tags: BTreeMap<String, Tag> = [
            ("LIQUIDBEES".to_string(), Tag::Mf),
            ("TCS".to_string(), Tag::None),
        ]
        .into();
        let s = compute(PageKind::Holdings, &rows, &excluded, &tags);
        assert_eq!(s.overall.invested, 1200.0);
        assert_eq!(s.overall.current, 1280.0);
        assert_eq!(s.overall.day_profit, 5.0);
        assert_eq!(s.excluded, 1);
        assert_eq!(s.by_tag.len(), 1);
        assert_eq!(s.by_tag[&Tag::Mf].invested, 500.0);
    }

    #[test]
    fn totals_hold_for_every_exclusion_and_tag_assignment() {
        let symbols = ["A", "B", "C", "D"];
        let mut rows: Vec<RowFigures> = symbols
            .iter()
            .enumerate()
            .map(|(i, sym)| holding(sym, (1u32 << i) as f64 * 100.0, (1u32 << i) as f64 * 90.0, i as f64))
            .collect();
        // Rows of another kind in the same slice never count.
        let mut stray = holding("A", 1e6, 1e6, 1e6);
        stray.kind = PageKind::Positions;
        rows.push(stray);

        for mask in 0u32..16 {
            for shift in 0..Tag::ALL.len() {
                let excluded: BTreeSet<String> = symbols
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, s)| s.to_string())
                    .collect();
                let tags: BTreeMap<String, Tag> = symbols
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (s.to_string(), Tag::ALL[(i + shift) % Tag::ALL.len()]))
                    .collect();
                let s = compute(PageKind::Holdings, &rows, &excluded, &tags);

                let holdings = || rows.iter().filter(|r| r.kind == PageKind::Holdings);
                let kept: f64 = holdings().filter(|r| !excluded.contains(&r.symbol)).map(|r| r.invested).sum();
                let kept_cur: f64 = holdings().filter(|r| !excluded.contains(&r.symbol)).map(|r| r.current).sum();
                assert_eq!(s.overall.invested, kept);
                assert_eq!(s.overall.current, kept_cur);
                assert_eq!(s.rows, 4);
                assert_eq!(s.excluded, mask.count_ones() as usize);
                assert!(!s.by_tag.contains_key(&Tag::None));
                for (tag, bucket) in &s.by_tag {
                    let want: f64 = holdings().filter(|r| tags[&r.symbol] == *tag).map(|r| r.invested).sum();
                    assert_eq!(bucket.invested, want);
                }
                let tagged: f64 = holdings().filter(|r| tags[&r.symbol] != Tag::None).map(|r| r.invested).sum();
                assert_eq!(s.by_tag.values().map(|b| b.invested).sum::<f64>(), tagged);
            }
        }
    }

    #[test]
    fn overall_ignores_tags() {
        let rows = vec![holding("A", 100.0, 0.0, 0.0), holding("B", 50.0, 0.0, 0.0)];
        let tags: BTreeMap<String, Tag> =
            [("A".to_string(), Tag::Bond), ("B".to_string(), Tag::Equity)].into();
        let s = compute(PageKind::Holdings, &rows, &BTreeSet::new(), &tags);
        assert_eq!(s.overall.invested, 150.0);
        let bucket_sum: f64 = s.by_tag.values().map(|b| b.invested).sum();
        assert_eq!(bucket_sum, 150.0);
    }

    #[test]
    fn zero_invested_buckets_not_rendered() {
        let rows = vec![holding("A", 100.0, 90.0, -1.0), holding("B", 0.0, 0.0, 0.0)];
        let tags: BTreeMap<String, Tag> =
            [("A".to_string(), Tag::Bond), ("B".to_string(), Tag::Sgb)].into();
        let html = render(&compute(PageKind::Holdings, &rows, &BTreeSet::new(), &tags));
        assert!(html.contains(r#"data-tag="BOND""#));
        assert!(!html.contains(r#"data-tag="SGB""#));
        assert!(html.contains(r#"<b class="kx-neg">-1.00</b>"#));
    }

    #[test]
    fn positions_and_orders_use_their_own_figure() {
        let mut pos = holding("SBIN", 6020.0, 0.0, 0.0);
        pos.kind = PageKind::Positions;
        let mut ord = holding("IDEA", 0.0, 0.0, 0.0);
        ord.kind = PageKind::Orders;
        ord.margin = 995.0;
        let rows = vec![pos, ord];
        let excluded: BTreeSet<String> = ["SBIN".to_string()].into();

        let p = compute(PageKind::Positions, &rows, &excluded, &BTreeMap::new());
        assert_eq!(p.rows, 1);
        assert_eq!(p.overall.invested, 6020.0);
        assert_eq!(render(&p), r#"<span class="kx-sum">Invested <b>6,020.00</b></span>"#);

        let o = compute(PageKind::Orders, &rows, &BTreeSet::new(), &BTreeMap::new());
        assert_eq!(render(&o), r#"<span class="kx-sum">Margin <b>995.00</b></span>"#);
    }
}
