use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format_date;

/// Page size the web client used for every list query
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Absent in the update/remove mutation payloads
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub amount: f64,
    pub date: String,
    pub category_id: Option<String>,
    pub category: Option<Category>,
    pub notes: Option<String>,
    pub user_id: Option<String>,
}

impl Expense {
    pub fn category_name(&self) -> &str {
        self.category
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or("-")
    }

    pub fn notes_display(&self) -> &str {
        match self.notes.as_deref() {
            Some(n) if !n.trim().is_empty() => n,
            _ => "-",
        }
    }

    pub fn date_display(&self) -> String {
        format_date(&self.date)
    }
}

/// One row of the per-user expense report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ExpenseReport {
    pub amount: f64,
    pub category: String,
    pub user_name: String,
    pub date: String,
}

/// Sum report rows per category, largest total first
pub fn totals_by_category(rows: &[ExpenseReport]) -> Vec<(String, f64)> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for row in rows {
        *totals.entry(row.category.as_str()).or_insert(0.0) += row.amount;
    }

    let mut sorted: Vec<(String, f64)> = totals
        .into_iter()
        .map(|(name, total)| (name.to_string(), total))
        .collect();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpensesInput {
    pub user_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub take: u32,
    pub skip: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoriesInput {
    pub take: u32,
    pub skip: u32,
}

impl Default for CategoriesInput {
    fn default() -> Self {
        Self {
            take: DEFAULT_PAGE_SIZE,
            skip: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseInput {
    pub user_id: String,
    pub title: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub category_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExpenseInput {
    pub id: String,
    pub title: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub category_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
