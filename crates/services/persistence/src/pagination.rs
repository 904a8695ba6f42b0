//! Bidirectional cursor pagination.
//!
//! Every list is ordered by `_id` ascending. A cursor is the URL-safe base64
//! form of a boundary id; `after`/`before` narrow the filter to ids strictly
//! past the boundary, and `first`/`last` pick a window from either end of
//! what remains.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use common::{AppError, AppResult};
use domain::{DocumentId, Entity, FIELD_ID};

use crate::store::{Filter, SortDirection};

/// Opaque page boundary token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn from_id(id: &DocumentId) -> Self {
        Self(URL_SAFE_NO_PAD.encode(id.to_string()))
    }

    pub fn for_entity<E: Entity>(entity: &E) -> Self {
        Self::from_id(&entity.id())
    }

    /// Recover the boundary id.
    pub fn decode(&self) -> AppResult<DocumentId> {
        let bytes = URL_SAFE_NO_PAD
            .decode(self.0.as_bytes())
            .map_err(|_| AppError::invalid_cursor(self.0.clone()))?;
        let raw = String::from_utf8(bytes).map_err(|_| AppError::invalid_cursor(self.0.clone()))?;
        DocumentId::parse(&raw).map_err(|_| AppError::invalid_cursor(self.0.clone()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Cursor {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for Cursor {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Caller-supplied paging arguments.
///
/// Sizes are signed so that negative input can be rejected rather than
/// failing to deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageArgs {
    #[serde(default)]
    pub after: Option<Cursor>,
    #[serde(default)]
    pub before: Option<Cursor>,
    #[serde(default)]
    pub first: Option<i64>,
    #[serde(default)]
    pub last: Option<i64>,
}

impl PageArgs {
    /// The first `n` rows after the optional cursor.
    pub fn forward(first: i64, after: Option<Cursor>) -> Self {
        Self {
            first: Some(first),
            after,
            ..Self::default()
        }
    }

    /// The last `n` rows before the optional cursor.
    pub fn backward(last: i64, before: Option<Cursor>) -> Self {
        Self {
            last: Some(last),
            before,
            ..Self::default()
        }
    }
}

/// Validated paging arguments with decoded boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageWindow {
    pub after: Option<DocumentId>,
    pub before: Option<DocumentId>,
    pub first: Option<u64>,
    pub last: Option<u64>,
}

/// Concrete read plan for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    pub skip: u64,
    /// `None` reads the whole remaining slice
    pub limit: Option<u64>,
    pub direction: SortDirection,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PagePlan {
    /// Rows are fetched newest-first and must be flipped back to `_id` order.
    pub fn reversed(&self) -> bool {
        self.direction == SortDirection::Descending
    }
}

impl PageWindow {
    pub fn from_args(args: &PageArgs) -> AppResult<Self> {
        let first = page_size("first", args.first)?;
        let last = page_size("last", args.last)?;
        let after = args.after.as_ref().map(Cursor::decode).transpose()?;
        let before = args.before.as_ref().map(Cursor::decode).transpose()?;

        Ok(Self {
            after,
            before,
            first,
            last,
        })
    }

    /// Narrow a filter to the rows strictly between the cursors.
    pub fn apply(&self, mut filter: Filter) -> Filter {
        if let Some(after) = &self.after {
            filter = filter.gt(FIELD_ID, after.to_string());
        }
        if let Some(before) = &self.before {
            filter = filter.lt(FIELD_ID, before.to_string());
        }
        filter
    }

    /// Translate the window into a read plan, given the row count under the
    /// narrowed filter. `first` wins when both sizes are present.
    pub fn plan(&self, total_count: u64) -> PagePlan {
        if let Some(first) = self.first {
            return PagePlan {
                skip: 0,
                limit: Some(first),
                direction: SortDirection::Ascending,
                has_previous: self.after.is_some(),
                has_next: total_count > first,
            };
        }

        if let Some(last) = self.last {
            return PagePlan {
                skip: 0,
                limit: Some(last),
                direction: SortDirection::Descending,
                has_previous: total_count > last,
                has_next: self.before.is_some(),
            };
        }

        PagePlan {
            skip: 0,
            limit: None,
            direction: SortDirection::Ascending,
            has_previous: false,
            has_next: false,
        }
    }
}

fn page_size(name: &str, value: Option<i64>) -> AppResult<Option<u64>> {
    match value {
        Some(n) if n < 0 => Err(AppError::invalid_argument(format!(
            "{} must not be negative, got {}",
            name, n
        ))),
        Some(n) => Ok(Some(n as u64)),
        None => Ok(None),
    }
}

/// One page of a list read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Rows under the cursor-narrowed filter
    pub total_count: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub start_cursor: Option<Cursor>,
    pub end_cursor: Option<Cursor>,
}

impl<T: Entity> Page<T> {
    pub fn new(items: Vec<T>, total_count: u64, plan: &PagePlan) -> Self {
        Self {
            start_cursor: items.first().map(Cursor::for_entity),
            end_cursor: items.last().map(Cursor::for_entity),
            items,
            total_count,
            has_previous: plan.has_previous,
            has_next: plan.has_next,
        }
    }
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            has_previous: self.has_previous,
            has_next: self.has_next,
            start_cursor: self.start_cursor,
            end_cursor: self.end_cursor,
        }
    }
}
