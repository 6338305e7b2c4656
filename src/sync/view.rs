use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::SyncEntity;

/// Creation-date bucket relative to the evaluation instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    #[default]
    All,
    Today,
    Last7Days,
    Last30Days,
}

impl DateRange {
    /// Parse the CLI / query spelling (`all`, `today`, `7d`, `30d`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Some(Self::All),
            "today" => Some(Self::Today),
            "7d" | "week" | "last_7_days" => Some(Self::Last7Days),
            "30d" | "month" | "last_30_days" => Some(Self::Last30Days),
            _ => None,
        }
    }

    fn contains(&self, created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let created_at = match (self, created_at) {
            (DateRange::All, _) => return true,
            (_, None) => return false,
            (_, Some(created_at)) => created_at,
        };

        match self {
            DateRange::All => true,
            DateRange::Today => created_at.date_naive() == now.date_naive(),
            DateRange::Last7Days => created_at >= now - Duration::days(7),
            DateRange::Last30Days => created_at >= now - Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Name,
}

/// Client-side filter over the cached list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub search: String,
    pub status: Option<String>,
    pub department: Option<String>,
    pub date_range: DateRange,
    pub sort: SortOrder,
}

impl ViewFilter {
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

/// One page of a derived view.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub pages: usize,
}

/// Derive the visible list from the cache.
///
/// Pure in `(cache, filter, now)`: invalid records never pass, and ties in the
/// sort key fall back to the id so the order is total.
pub fn derive_view<'a, E: SyncEntity>(cache: &'a [E], filter: &ViewFilter, now: DateTime<Utc>) -> Vec<&'a E> {
    let needle = filter.search.trim().to_lowercase();
    let status = filter.status.as_deref().map(str::trim).filter(|s| !s.is_empty() && *s != "all");
    let department = filter
        .department
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty() && *d != "all");

    let mut view: Vec<&E> = cache
        .iter()
        .filter(|record| record.is_valid())
        .filter(|record| needle.is_empty() || record.matches_search(&needle))
        .filter(|record| status.map_or(true, |s| record.status().to_string().eq_ignore_ascii_case(s)))
        .filter(|record| {
            department.map_or(true, |d| {
                record.department().is_some_and(|own| own.eq_ignore_ascii_case(d))
            })
        })
        .filter(|record| filter.date_range.contains(record.created_at(), now))
        .collect();

    view.sort_by(|a, b| compare(*a, *b, filter.sort).then_with(|| a.id().cmp(b.id())));
    view
}

fn compare<E: SyncEntity>(a: &E, b: &E, sort: SortOrder) -> Ordering {
    match sort {
        SortOrder::Newest => newest_first(a.created_at(), b.created_at()),
        SortOrder::Oldest => oldest_first(a.created_at(), b.created_at()),
        SortOrder::Name => a.sort_name().cmp(&b.sort_name()),
    }
}

// Undated records sort last in both directions.
fn newest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn oldest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Slice a view into 1-based pages; out-of-range pages are empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let page = page.max(1);
    let total = items.len();
    let pages = total.div_ceil(per_page);
    let start = (page - 1).saturating_mul(per_page).min(total);
    let end = start.saturating_add(per_page).min(total);

    Page {
        items: items[start..end].to_vec(),
        page,
        per_page,
        total,
        pages,
    }
}
