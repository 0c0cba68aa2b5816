//! Sound query parameters and canonical sound ids.
//!
//! `kick(dur: 0.5)` and `kick(dur:0.5)` must share one symbol entry, so ids
//! are built from sorted parameters rather than source text.

use std::collections::BTreeMap;
use std::fmt;

use crate::assets::SearchQuery;
use crate::ast::InstanceId;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Hz(f64),
    Text(String),
    Flag,
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Hz(n) => write!(f, "{n}Hz"),
            ParamValue::Text(s) => write!(f, "{s}"),
            ParamValue::Flag => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParams {
    entries: BTreeMap<String, ParamValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_unique(&self) -> bool {
        self.entries.contains_key("unique")
    }

    fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            ParamValue::Number(n) | ParamValue::Hz(n) => Some(*n),
            _ => None,
        }
    }

    /// Build the asset search for `keyword`.
    pub fn search_query(&self, keyword: &str, page_size: usize) -> SearchQuery {
        let tags: Vec<String> = match self.get("tag") {
            Some(tag @ (ParamValue::Text(_) | ParamValue::Number(_))) => vec![tag.to_string()],
            _ => Vec::new(),
        };
        let mut text = keyword.to_string();
        for tag in &tags {
            text.push(' ');
            text.push_str(tag);
        }
        SearchQuery {
            text,
            tags,
            max_duration: self.number("dur").filter(|d| *d > 0.0),
            pitch: self.number("pitch").filter(|p| *p > 0.0),
            filters: BTreeMap::new(),
            page: 1,
            page_size,
        }
    }
}

/// Canonical symbol id for a sound literal.
///
/// Parameters are listed in key order. A `unique` flag binds the id to one
/// occurrence so it resolves to its own asset.
pub fn canonical_id(keyword: &str, params: &QueryParams, instance: InstanceId) -> String {
    let mut id = keyword.to_string();
    if !params.is_empty() {
        let list: Vec<String> = params
            .entries
            .iter()
            .map(|(k, v)| match v {
                ParamValue::Flag => k.clone(),
                v => format!("{k}={v}"),
            })
            .collect();
        id.push('(');
        id.push_str(&list.join(","));
        id.push(')');
    }
    if params.is_unique() {
        id.push_str(&format!("@{instance}"));
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BlockId;

    #[test]
    fn plain_keyword_is_its_own_id() {
        let id = canonical_id("kick", &QueryParams::new(), InstanceId::default());
        assert_eq!(id, "kick");
    }

    #[test]
    fn params_are_sorted() {
        let mut a = QueryParams::new();
        a.insert("tag", ParamValue::Text("808".into()));
        a.insert("dur", ParamValue::Number(0.5));
        let mut b = QueryParams::new();
        b.insert("dur", ParamValue::Number(0.5));
        b.insert("tag", ParamValue::Text("808".into()));
        let at = InstanceId::default();
        assert_eq!(canonical_id("kick", &a, at), "kick(dur=0.5,tag=808)");
        assert_eq!(canonical_id("kick", &a, at), canonical_id("kick", &b, at));
    }

    #[test]
    fn unique_binds_to_occurrence() {
        let mut params = QueryParams::new();
        params.insert("unique", ParamValue::Flag);
        let a = canonical_id("hat", &params, InstanceId::new(BlockId(2), 0));
        let b = canonical_id("hat", &params, InstanceId::new(BlockId(2), 4));
        assert_eq!(a, "hat(unique)@2:0");
        assert_ne!(a, b);
    }

    #[test]
    fn search_query_carries_filters() {
        let mut params = QueryParams::new();
        params.insert("dur", ParamValue::Number(0.5));
        params.insert("tag", ParamValue::Text("acoustic".into()));
        params.insert("pitch", ParamValue::Hz(440.0));
        let q = params.search_query("kick", 15);
        assert_eq!(q.text, "kick acoustic");
        assert_eq!(q.max_duration, Some(0.5));
        assert_eq!(q.pitch, Some(440.0));
        assert_eq!(q.page, 1);
        assert_eq!(q.page_size, 15);
    }
}
