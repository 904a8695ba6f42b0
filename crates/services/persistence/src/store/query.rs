//! Sorting, paging and partial updates for document queries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Document, Filter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn reverse(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Single-field sort order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Arguments of a find-many call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub sort: Option<Sort>,
    pub skip: u64,
    /// `None` reads every matching row
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Partial-field mutation: every listed field is overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    set: Document,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn fields(&self) -> &Document {
        &self.set
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Apply onto a document, reporting whether any field changed.
    pub fn apply(&self, document: &mut Document) -> bool {
        let mut modified = false;
        for (field, value) in &self.set {
            if document.get(field) != Some(value) {
                document.insert(field.clone(), value.clone());
                modified = true;
            }
        }
        modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_reports_modification() {
        let mut document = Document::new();
        document.insert("name".to_string(), json!("Alpha"));

        let patch = Patch::new().set("name", "Alpha");
        assert!(!patch.apply(&mut document));

        let patch = Patch::new().set("name", "Beta").set("deletedAt", "2024-01-01T00:00:00Z");
        assert!(patch.apply(&mut document));
        assert_eq!(document["name"], "Beta");
        assert!(document.contains_key("deletedAt"));
    }

    #[test]
    fn test_find_query_builder() {
        let query = FindQuery::new(Filter::new().live())
            .sort(Sort::descending("_id"))
            .skip(4)
            .limit(2);
        assert_eq!(query.skip, 4);
        assert_eq!(query.limit, Some(2));
        assert_eq!(query.sort.map(|s| s.direction), Some(SortDirection::Descending));
    }
}
