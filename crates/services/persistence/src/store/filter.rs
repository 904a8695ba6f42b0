//! Document predicates.
//!
//! A [`Filter`] is a conjunction of per-field conditions. Fields are kept in a
//! `BTreeMap` and each field's conditions are sorted on output, so two filters
//! built in different orders share one canonical form and one cache hash.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use domain::{DocumentId, FIELD_DELETED_AT, FIELD_ID};

use super::Document;

/// A single operator applied to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "lowercase")]
pub enum Condition {
    /// Field equals the value
    Eq(Value),
    /// Field is present (`true`) or absent (`false`)
    Exists(bool),
    /// Field sorts strictly after the value
    Gt(Value),
    /// Field sorts strictly before the value
    Lt(Value),
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        match (self, field) {
            (Condition::Exists(expected), found) => found.is_some() == *expected,
            (Condition::Eq(expected), Some(found)) => found == expected,
            (Condition::Gt(bound), Some(found)) => {
                compare_values(found, bound) == Some(Ordering::Greater)
            }
            (Condition::Lt(bound), Some(found)) => {
                compare_values(found, bound) == Some(Ordering::Less)
            }
            (_, None) => false,
        }
    }
}

/// Ordering between two JSON scalars of the same kind.
///
/// Values of different kinds (or non-scalars) are incomparable, so range
/// conditions never match across types.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Conjunction of field conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    clauses: BTreeMap<String, Vec<Condition>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a single document by primary key.
    pub fn by_id(id: &DocumentId) -> Self {
        Self::new().eq(FIELD_ID, id.to_string())
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Eq(value.into()))
    }

    pub fn exists(self, field: impl Into<String>, present: bool) -> Self {
        self.with(field, Condition::Exists(present))
    }

    pub fn absent(self, field: impl Into<String>) -> Self {
        self.exists(field, false)
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Gt(value.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Lt(value.into()))
    }

    /// Restrict to rows without a tombstone.
    pub fn live(self) -> Self {
        self.absent(FIELD_DELETED_AT)
    }

    /// Add a condition, ignoring exact duplicates.
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        let conditions = self.clauses.entry(field.into()).or_default();
        if !conditions.contains(&condition) {
            conditions.push(condition);
        }
        self
    }

    /// Conjunction of both filters.
    pub fn and(mut self, other: Filter) -> Self {
        for (field, conditions) in other.clauses {
            for condition in conditions {
                self = self.with(field.clone(), condition);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Iterate `(field, condition)` pairs in canonical order.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.clauses
            .iter()
            .flat_map(|(field, conditions)| conditions.iter().map(move |c| (field.as_str(), c)))
    }

    /// Whether every condition holds for the document.
    pub fn matches(&self, document: &Document) -> bool {
        self.clauses.iter().all(|(field, conditions)| {
            let value = document.get(field);
            conditions.iter().all(|c| c.matches(value))
        })
    }

    /// Order-independent JSON rendering of the predicate.
    pub fn canonical_json(&self) -> String {
        let canonical: BTreeMap<&str, Vec<String>> = self
            .clauses
            .iter()
            .map(|(field, conditions)| {
                let mut rendered: Vec<String> = conditions
                    .iter()
                    .map(|c| serde_json::to_string(c).unwrap_or_default())
                    .collect();
                rendered.sort();
                (field.as_str(), rendered)
            })
            .collect();

        serde_json::to_string(&canonical).unwrap_or_default()
    }

    /// Hex SHA-256 of [`Filter::canonical_json`], used as a cache key suffix.
    pub fn canonical_hash(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_json().as_bytes()))
    }
}
