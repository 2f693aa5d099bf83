//! Session-scoped key/value storage.
//!
//! A store holds positional and named slots; values are text, integers, or
//! nested stores, so SELECT results (one store per file, one slot per
//! selected value) and bound variables live in the same structure. Lookup
//! walks a path of positional/named keys through the nesting.

use crate::ast::{VarKey, VarPath};
use crate::error::{Error, Result};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionValue {
    Text(String),
    Int(i64),
    Store(VariableStore),
}

impl Serialize for SessionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SessionValue::Text(s) => serializer.serialize_str(s),
            SessionValue::Int(i) => serializer.serialize_i64(*i),
            SessionValue::Store(store) => store.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    positional: Vec<Option<SessionValue>>,
    named: BTreeMap<String, SessionValue>,
}

impl VariableStore {
    pub fn new() -> VariableStore {
        VariableStore::default()
    }

    pub fn from_texts(texts: impl IntoIterator<Item = String>) -> VariableStore {
        VariableStore {
            positional: texts.into_iter().map(|t| Some(SessionValue::Text(t))).collect(),
            named: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    pub fn positional_len(&self) -> usize {
        self.positional.len()
    }

    fn get_key(&self, key: &VarKey) -> Option<&SessionValue> {
        match key {
            VarKey::Position(i) => self.positional.get(*i).and_then(|slot| slot.as_ref()),
            VarKey::Named(name) => self.named.get(name),
        }
    }

    /// Nested lookup: each key steps into the store found at the previous
    /// one.
    pub fn lookup(&self, path: &[VarKey]) -> Option<&SessionValue> {
        let (head, rest) = path.split_first()?;
        let value = self.get_key(head)?;
        if rest.is_empty() {
            return Some(value);
        }
        match value {
            SessionValue::Store(inner) => inner.lookup(rest),
            _ => None,
        }
    }

    pub fn set_key(&mut self, key: &VarKey, value: SessionValue) {
        match key {
            VarKey::Position(i) => {
                if *i >= self.positional.len() {
                    self.positional.resize(*i + 1, None);
                }
                self.positional[*i] = Some(value);
            }
            VarKey::Named(name) => {
                self.named.insert(name.clone(), value);
            }
        }
    }

    /// Nested set; every intermediate key must already hold a store.
    pub fn set(&mut self, path: &[VarKey], value: SessionValue) -> Result<()> {
        let Some((head, rest)) = path.split_first() else {
            return Err(Error::NotFound("empty variable path".into()));
        };
        if rest.is_empty() {
            self.set_key(head, value);
            return Ok(());
        }
        match head {
            VarKey::Position(i) => match self.positional.get_mut(*i).and_then(|s| s.as_mut()) {
                Some(SessionValue::Store(inner)) => inner.set(rest, value),
                _ => Err(Error::NotFound(format!("variable ${i} is not a collection"))),
            },
            VarKey::Named(name) => match self.named.get_mut(name) {
                Some(SessionValue::Store(inner)) => inner.set(rest, value),
                _ => Err(Error::NotFound(format!("variable ${name} is not a collection"))),
            },
        }
    }

    pub fn push(&mut self, value: SessionValue) {
        self.positional.push(Some(value));
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A purely positional store renders as an array; one with named slots
/// renders as an object keyed by position and name.
impl Serialize for VariableStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.named.is_empty() {
            let mut seq = serializer.serialize_seq(Some(self.positional.len()))?;
            for slot in &self.positional {
                seq.serialize_element(slot)?;
            }
            seq.end()
        } else {
            let mut map = serializer.serialize_map(None)?;
            for (index, slot) in self.positional.iter().enumerate() {
                if let Some(value) = slot {
                    map.serialize_entry(&index.to_string(), value)?;
                }
            }
            for (name, value) in &self.named {
                map.serialize_entry(name, value)?;
            }
            map.end()
        }
    }
}

/// Render a variable path the way it is written in a query.
pub fn format_path(path: &VarPath) -> String {
    let keys: Vec<String> = path
        .iter()
        .map(|key| match key {
            VarKey::Named(name) => name.clone(),
            VarKey::Position(i) => i.to_string(),
        })
        .collect();
    format!("${}", keys.join("."))
}

/// Resolve a variable to text for matching/replacement positions.
pub fn variable_text(store: &VariableStore, path: &VarPath) -> Result<String> {
    match store.lookup(path) {
        Some(SessionValue::Text(s)) => Ok(s.clone()),
        Some(SessionValue::Int(i)) => Ok(i.to_string()),
        Some(SessionValue::Store(_)) => Err(Error::NotFound(format!(
            "variable {} holds a collection, not text",
            format_path(path)
        ))),
        None => Err(Error::NotFound(format!("variable {}", format_path(path)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> VarKey {
        VarKey::Named(name.into())
    }

    #[test]
    fn positional_slots_extend_on_demand() {
        let mut store = VariableStore::new();
        store.set_key(&VarKey::Position(3), SessionValue::Int(7));
        assert_eq!(store.positional_len(), 4);
        assert_eq!(
            store.lookup(&[VarKey::Position(3)]),
            Some(&SessionValue::Int(7))
        );
        assert_eq!(store.lookup(&[VarKey::Position(1)]), None);
    }

    #[test]
    fn nested_lookup_walks_stores() {
        let mut inner = VariableStore::new();
        inner.set_key(&named("greeting"), SessionValue::Text("hello".into()));
        let mut outer = VariableStore::new();
        outer.set_key(&named("result"), SessionValue::Store(inner));

        let path = vec![named("result"), named("greeting")];
        assert_eq!(
            outer.lookup(&path),
            Some(&SessionValue::Text("hello".into()))
        );
    }

    #[test]
    fn nested_set_requires_existing_collections() {
        let mut store = VariableStore::new();
        let path = vec![named("missing"), VarKey::Position(0)];
        assert!(store.set(&path, SessionValue::Int(1)).is_err());
    }

    #[test]
    fn variable_text_reports_unbound_names() {
        let store = VariableStore::new();
        let err = variable_text(&store, &vec![named("nope")]).unwrap_err();
        assert!(err.to_string().contains("$nope"));
    }

    #[test]
    fn json_rendering_mixes_positional_and_named() {
        let mut store = VariableStore::new();
        store.push(SessionValue::Text("file.txt".into()));
        store.set_key(&named("count"), SessionValue::Int(2));
        assert_eq!(
            store.to_json(),
            serde_json::json!({"0": "file.txt", "count": 2})
        );
    }

    #[test]
    fn pure_positional_renders_as_array() {
        let store = VariableStore::from_texts(["a".into(), "b".into()]);
        assert_eq!(store.to_json(), serde_json::json!(["a", "b"]));
    }
}
