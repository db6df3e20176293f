//! Success envelopes returned by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::criteria::Page;

/// Bulk operations that report success without returning records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Record creation.
    Create,
    /// Record update.
    Update,
    /// Record save (create-or-update).
    Save,
    /// Record deletion.
    Delete,
}

impl Operation {
    const fn past_tense(self) -> &'static str {
        match self {
            Operation::Create => "created",
            Operation::Update => "updated",
            Operation::Save => "saved",
            Operation::Delete => "deleted",
        }
    }
}

/// Plain success acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Always `true`; failures are reported through the error taxonomy.
    pub status: bool,
    /// Human-readable confirmation.
    pub message: String,
}

impl StatusResponse {
    /// Success acknowledgement for an operation on an entity.
    #[must_use]
    pub fn success(operation: Operation, entity: &str) -> Self {
        Self {
            status: true,
            message: format!(
                "{} {} successfully",
                sentence_case(entity),
                operation.past_tense()
            ),
        }
    }
}

/// A page of records plus the total match count.
///
/// `row_count` reflects the filter with pagination ignored; `page` and
/// `limit` echo the window the rows were cut from (1-based page number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// Records in the window.
    pub data: Vec<T>,
    /// Total records matching the filter.
    pub row_count: u64,
    /// 1-based page number, `0` when no window was supplied.
    pub page: u64,
    /// Window size, `0` when no window was supplied.
    pub limit: u64,
}

impl<T> PaginatedResponse<T> {
    /// Wrap a window of records.
    #[must_use]
    pub fn new(data: Vec<T>, row_count: u64, window: Option<Page>) -> Self {
        let (page, limit) = match window {
            Some(page) => (page.page_number(), page.take),
            None => (0, 0),
        };
        Self {
            data,
            row_count,
            page,
            limit,
        }
    }
}

/// Capitalize the first character, mapping separators to spaces.
pub(crate) fn sentence_case(name: &str) -> String {
    let spaced = name.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}
