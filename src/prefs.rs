//! Persisted user preferences: the excluded-instrument set and the
//! instrument -> tag map.
//!
//! Both live as JSON under two independent keys of an origin-scoped
//! key-value store. Reads fail soft (missing or malformed data reads as
//! empty); writes are fire-and-forget and only logged on failure. There is no
//! transaction across the two keys.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;

use crate::logging::{debug, obj, v_num, v_str, warn, Domain};

pub const EXCLUDED_KEY: &str = "kx.excluded";
pub const TAGS_KEY: &str = "kx.tags";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tag {
    #[default]
    None,
    Mf,
    Bond,
    Sgb,
    Equity,
    Invit,
}

impl Tag {
    pub const ALL: [Tag; 6] = [Tag::None, Tag::Mf, Tag::Bond, Tag::Sgb, Tag::Equity, Tag::Invit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::None => "NONE",
            Tag::Mf => "MF",
            Tag::Bond => "BOND",
            Tag::Sgb => "SGB",
            Tag::Equity => "EQUITY",
            Tag::Invit => "INVIT",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Tag::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("unknown tag {:?}", s))
    }
}

/// Origin-scoped string key-value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Durable store: one sqlite table keyed by (origin, key).
pub struct SqliteStore {
    conn: Connection,
    origin: String,
}

impl SqliteStore {
    pub fn open(path: &str, origin: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("open prefs db {}", path))?;
        let mut store = Self { conn, origin: origin.to_string() };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory(origin: &str) -> Result<Self> {
        let mut store = Self { conn: Connection::open_in_memory()?, origin: origin.to_string() };
        store.init()?;
        Ok(store)
    }

    fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS prefs (
                origin TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (origin, key)
            );
            COMMIT;",
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM prefs WHERE origin = ?1 AND key = ?2",
                params![self.origin, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO prefs (origin, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(origin, key) DO UPDATE SET value = excluded.value",
            params![self.origin, key, value],
        )?;
        Ok(())
    }
}

/// Typed, fail-soft view over a `KeyValueStore`.
pub struct Preferences<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_json(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn(
                    Domain::Store,
                    "read_failed",
                    obj(&[("key", v_str(key)), ("msg", v_str(&err.to_string()))]),
                );
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn(
                    Domain::Store,
                    "malformed",
                    obj(&[("key", v_str(key)), ("msg", v_str(&err.to_string()))]),
                );
                None
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        let written = serde_json::to_string(value)
            .context("encode preference")
            .and_then(|raw| self.store.set(key, &raw));
        if let Err(err) = written {
            warn(
                Domain::Store,
                "write_failed",
                obj(&[("key", v_str(key)), ("msg", v_str(&err.to_string()))]),
            );
        }
    }

    pub fn get_excluded(&self) -> BTreeSet<String> {
        match self.read_json(EXCLUDED_KEY) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(_) => {
                warn(Domain::Store, "malformed", obj(&[("key", v_str(EXCLUDED_KEY))]));
                BTreeSet::new()
            }
            None => BTreeSet::new(),
        }
    }

    pub fn set_excluded(&mut self, excluded: &BTreeSet<String>) {
        self.write_json(EXCLUDED_KEY, excluded);
        debug(Domain::Store, "excluded_saved", obj(&[("count", v_num(excluded.len() as f64))]));
    }

    /// Tag map; entries with unrecognised tag names are dropped.
    pub fn get_tags(&self) -> BTreeMap<String, Tag> {
        match self.read_json(TAGS_KEY) {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(symbol, v)| {
                    let tag = v.as_str()?.parse::<Tag>().ok()?;
                    Some((symbol, tag))
                })
                .collect(),
            Some(_) => {
                warn(Domain::Store, "malformed", obj(&[("key", v_str(TAGS_KEY))]));
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        }
    }

    pub fn set_tags(&mut self, tags: &BTreeMap<String, Tag>) {
        self.write_json(TAGS_KEY, tags);
        debug(Domain::Store, "tags_saved", obj(&[("count", v_num(tags.len() as f64))]));
    }

    pub fn is_excluded(&self, symbol: &str) -> bool {
        self.get_excluded().contains(symbol)
    }

    pub fn tag_of(&self, symbol: &str) -> Tag {
        self.get_tags().get(symbol).copied().unwrap_or_default()
    }

    /// Flip the symbol's exclusion; returns whether it is now excluded.
    pub fn toggle_excluded(&mut self, symbol: &str) -> bool {
        let mut excluded = self.get_excluded();
        let now_excluded = if excluded.remove(symbol) {
            false
        } else {
            excluded.insert(symbol.to_string());
            true
        };
        self.set_excluded(&excluded);
        now_excluded
    }

    pub fn set_excluded_state(&mut self, symbol: &str, on: bool) {
        let mut excluded = self.get_excluded();
        let changed = if on {
            excluded.insert(symbol.to_string())
        } else {
            excluded.remove(symbol)
        };
        if changed {
            self.set_excluded(&excluded);
        }
    }

    /// Assign a tag; `Tag::None` removes the entry.
    pub fn set_tag(&mut self, symbol: &str, tag: Tag) {
        let mut tags = self.get_tags();
        if tag == Tag::None {
            tags.remove(symbol);
        } else {
            tags.insert(symbol.to_string(), tag);
        }
        self.set_tags(&tags);
    }
}
