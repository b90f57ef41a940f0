// src/dag/results.rs

//! Final output of a graph run.

use std::collections::BTreeMap;
use std::ops::Index;

use crate::dag::node::TaskNode;
use crate::errors::TaskFailure;
use crate::value::Value;

/// What a single node produced: its value, or the failure captured from its
/// body (best-effort runs only).
pub type Outcome = Result<Value, TaskFailure>;

/// Anything that can address an entry in a [`ResultsMap`]: a node handle or
/// the node's name. Both resolve to the same entry.
pub trait ResultKey {
    fn result_key(&self) -> &str;
}

impl ResultKey for str {
    fn result_key(&self) -> &str {
        self
    }
}

impl ResultKey for String {
    fn result_key(&self) -> &str {
        self
    }
}

impl ResultKey for TaskNode {
    fn result_key(&self) -> &str {
        self.name()
    }
}

impl<K: ResultKey + ?Sized> ResultKey for &K {
    fn result_key(&self) -> &str {
        (**self).result_key()
    }
}

/// Node name -> outcome, for every node that was marked done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsMap {
    entries: BTreeMap<String, Outcome>,
}

impl ResultsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, node: impl Into<String>, outcome: Outcome) {
        self.entries.insert(node.into(), outcome);
    }

    pub fn get<K: ResultKey + ?Sized>(&self, key: &K) -> Option<&Outcome> {
        self.entries.get(key.result_key())
    }

    /// The value a node produced, if it succeeded.
    pub fn value<K: ResultKey + ?Sized>(&self, key: &K) -> Option<&Value> {
        self.get(key).and_then(|outcome| outcome.as_ref().ok())
    }

    /// The failure captured for a node, if its body failed.
    pub fn failure<K: ResultKey + ?Sized>(&self, key: &K) -> Option<&TaskFailure> {
        self.get(key).and_then(|outcome| outcome.as_ref().err())
    }

    pub fn contains<K: ResultKey + ?Sized>(&self, key: &K) -> bool {
        self.entries.contains_key(key.result_key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Outcome)> {
        self.entries.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether any recorded node failed.
    pub fn has_failures(&self) -> bool {
        self.entries.values().any(Result::is_err)
    }

    /// JSON object keyed by node name; each entry is `{"ok": value}` or
    /// `{"error": message}`.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|(name, outcome)| {
                let entry = match outcome {
                    Ok(value) => serde_json::json!({ "ok": value.to_json() }),
                    Err(failure) => serde_json::json!({ "error": failure.message() }),
                };
                (name.clone(), entry)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl<K: ResultKey + ?Sized> Index<&K> for ResultsMap {
    type Output = Outcome;

    fn index(&self, key: &K) -> &Self::Output {
        match self.get(key) {
            Some(outcome) => outcome,
            None => panic!("no result recorded for node '{}'", key.result_key()),
        }
    }
}

impl<'a> IntoIterator for &'a ResultsMap {
    type Item = (&'a String, &'a Outcome);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Outcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
