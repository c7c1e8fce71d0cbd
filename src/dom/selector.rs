//! The CSS subset the engine's selectors use: type selectors, `*`, `.class`,
//! `[attr]`, `[attr="value"]`, compounds of those, the descendant combinator
//! and comma-separated lists.

use anyhow::{bail, Result};

/// Read access to one element, enough to test a compound selector.
pub trait ElementView {
    fn tag(&self) -> &str;
    fn has_class(&self, class: &str) -> bool;
    fn attr(&self, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMatch {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrMatch>,
}

impl Compound {
    pub fn matches<E: ElementView>(&self, el: &E) -> bool {
        if let Some(tag) = &self.tag {
            if !el.tag().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        self.classes.iter().all(|c| el.has_class(c))
            && self.attrs.iter().all(|a| match (&a.value, el.attr(&a.name)) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(want), Some(got)) => want == got,
            })
    }
}

/// A parsed selector list. Each alternative is a descendant chain, outermost
/// compound first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Vec<Compound>>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let mut alternatives = Vec::new();
        for part in split_outside_quotes(source, ',') {
            let chain = parse_chain(part.trim())?;
            if chain.is_empty() {
                bail!("empty selector in {:?}", source);
            }
            alternatives.push(chain);
        }
        if alternatives.is_empty() {
            bail!("empty selector");
        }
        Ok(Self { alternatives })
    }

    pub fn alternatives(&self) -> &[Vec<Compound>] {
        &self.alternatives
    }
}

fn split_outside_quotes(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_chain(s: &str) -> Result<Vec<Compound>> {
    let mut chain = Vec::new();
    for token in split_outside_quotes(s, ' ') {
        if token.is_empty() {
            continue;
        }
        chain.push(parse_compound(token)?);
    }
    Ok(chain)
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], mut i: usize) -> (String, usize) {
    let mut out = String::new();
    while i < chars.len() && is_ident(chars[i]) {
        out.push(chars[i]);
        i += 1;
    }
    (out, i)
}

fn parse_compound(token: &str) -> Result<Compound> {
    let chars: Vec<char> = token.chars().collect();
    let mut compound = Compound::default();
    let mut i = 0;

    if i < chars.len() && chars[i] == '*' {
        i += 1;
    } else if i < chars.len() && is_ident(chars[i]) {
        let (tag, next) = take_ident(&chars, i);
        compound.tag = Some(tag.to_ascii_lowercase());
        i = next;
    }

    while i < chars.len() {
        match chars[i] {
            '.' => {
                let (class, next) = take_ident(&chars, i + 1);
                if class.is_empty() {
                    bail!("missing class name in {:?}", token);
                }
                compound.classes.push(class);
                i = next;
            }
            '[' => {
                let (name, mut next) = take_ident(&chars, i + 1);
                if name.is_empty() {
                    bail!("missing attribute name in {:?}", token);
                }
                let mut value = None;
                if next < chars.len() && chars[next] == '=' {
                    next += 1;
                    let (v, after) = parse_attr_value(&chars, next, token)?;
                    value = Some(v);
                    next = after;
                }
                if next >= chars.len() || chars[next] != ']' {
                    bail!("unterminated attribute selector in {:?}", token);
                }
                compound.attrs.push(AttrMatch { name, value });
                i = next + 1;
            }
            other => bail!("unexpected {:?} in selector {:?}", other, token),
        }
    }
    Ok(compound)
}

fn parse_attr_value(chars: &[char], i: usize, token: &str) -> Result<(String, usize)> {
    match chars.get(i) {
        Some(&q) if q == '"' || q == '\'' => {
            let mut out = String::new();
            let mut j = i + 1;
            while j < chars.len() && chars[j] != q {
                out.push(chars[j]);
                j += 1;
            }
            if j >= chars.len() {
                bail!("unterminated quote in {:?}", token);
            }
            Ok((out, j + 1))
        }
        _ => Ok(take_ident(chars, i)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct El {
        tag: &'static str,
        classes: Vec<&'static str>,
        attrs: Vec<(&'static str, &'static str)>,
    }

    impl ElementView for El {
        fn tag(&self) -> &str {
            self.tag
        }
        fn has_class(&self, class: &str) -> bool {
            self.classes.iter().any(|c| *c == class)
        }
        fn attr(&self, name: &str) -> Option<&str> {
            self.attrs.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
        }
    }

    #[test]
    fn parses_list_with_descendants() {
        let sel = Selector::parse(".holdings table tbody tr, .positions table tbody tr").unwrap();
        assert_eq!(sel.alternatives().len(), 2);
        assert_eq!(sel.alternatives()[0].len(), 4);
        assert_eq!(sel.alternatives()[0][0].classes, vec!["holdings"]);
        assert_eq!(sel.alternatives()[0][3].tag.as_deref(), Some("tr"));
    }

    #[test]
    fn quoted_attribute_keeps_spaces_and_commas() {
        let sel = Selector::parse(r#"img[alt="Market depth, live"]"#).unwrap();
        assert_eq!(sel.alternatives().len(), 1);
        let attr = &sel.alternatives()[0][0].attrs[0];
        assert_eq!(attr.name, "alt");
        assert_eq!(attr.value.as_deref(), Some("Market depth, live"));
    }

    #[test]
    fn compound_matching() {
        let sel = Selector::parse(r#"td.instrument[data-label="Instrument"]"#).unwrap();
        let compound = &sel.alternatives()[0][0];
        let hit = El {
            tag: "td",
            classes: vec!["instrument", "left"],
            attrs: vec![("data-label", "Instrument")],
        };
        let miss = El { tag: "td", classes: vec!["instrument"], attrs: vec![] };
        assert!(compound.matches(&hit));
        assert!(!compound.matches(&miss));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("a[href").is_err());
        assert!(Selector::parse("a > b").is_err());
    }
}
