use crate::domain::entry::Entry;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::str::FromStr;

/// Fields available for sorting entries in a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Position,
    Title,
    Priority,
    Due,
    Created,
    Updated,
}

/// Sort order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "position" => Ok(SortField::Position),
            "title" => Ok(SortField::Title),
            "priority" => Ok(SortField::Priority),
            "due" => Ok(SortField::Due),
            "created" => Ok(SortField::Created),
            "updated" => Ok(SortField::Updated),
            _ => Err(format!(
                "Invalid sort field '{}'. Valid fields: position, title, priority, due, created, updated",
                s
            )),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            _ => Err(format!(
                "Invalid sort order '{}'. Valid orders: asc, desc",
                s
            )),
        }
    }
}

/// Sorts entries in-place for presentation.
///
/// This never touches stored positions; ties keep their relative order since
/// the sort is stable.
///
/// # Examples
/// ```
/// use tavla_core::domain::entry::{Entry, NewEntry, Priority};
/// use tavla_core::domain::ids::LaneId;
/// use tavla_core::domain::sorting::{sort_entries, SortField, SortOrder};
///
/// let lane = LaneId::new();
/// let mut entries = vec![
///     Entry::new(lane, 0, NewEntry::titled("b"), Priority::Low),
///     Entry::new(lane, 1, NewEntry::titled("a"), Priority::Urgent),
/// ];
///
/// sort_entries(&mut entries, SortField::Priority, SortOrder::Descending);
/// assert_eq!(entries[0].title, "a");
/// ```
pub fn sort_entries(entries: &mut [Entry], field: SortField, order: SortOrder) {
    entries.sort_by(|a, b| {
        let cmp = match field {
            SortField::Position => a.position.cmp(&b.position),
            SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortField::Priority => a.priority.cmp(&b.priority),
            SortField::Due => return compare_option_dates(a.due_date, b.due_date, order),
            SortField::Created => a.created_at.cmp(&b.created_at),
            SortField::Updated => a.updated_at.cmp(&b.updated_at),
        };

        match order {
            SortOrder::Ascending => cmp,
            SortOrder::Descending => cmp.reverse(),
        }
    });
}

/// Compare Option<DateTime> with None always sorting to end
///
/// Entries without a due date come last regardless of sort order.
fn compare_option_dates(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    order: SortOrder,
) -> Ordering {
    match (a, b) {
        (Some(a_date), Some(b_date)) => match order {
            SortOrder::Ascending => a_date.cmp(&b_date),
            SortOrder::Descending => b_date.cmp(&a_date),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
