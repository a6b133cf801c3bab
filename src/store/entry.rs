//! The catalog entity and its fixed category set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed set of catalog categories.
///
/// Stored in SQLite as the literal label text. User input never extends the
/// set; adding a category means adding a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Film,
    Series,
    Documentary,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 3] = [Category::Film, Category::Series, Category::Documentary];

    /// The label used for display and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Film => "Film",
            Category::Series => "Series",
            Category::Documentary => "Documentary",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a label does not name a known category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category: {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "Film" => Ok(Category::Film),
            "Series" => Ok(Category::Series),
            "Documentary" => Ok(Category::Documentary),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err: UnknownCategory| FromSqlError::Other(Box::new(err)))
    }
}

/// One cataloged film, series or documentary.
///
/// Mirrors a row in the `entries` table. An `id` of 0 marks an entry that
/// has not been persisted yet; insertion assigns the real id, which is
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub title: String,
    /// Persisted as epoch milliseconds.
    pub release_date: DateTime<Utc>,
    pub category: Category,
    pub watched: bool,
    /// 1..=10, present only for watched entries. The save flow enforces the
    /// correlation; the schema does not.
    pub rating: Option<u8>,
    pub comment: Option<String>,
    /// Absolute path of a locally stored poster image, if any. Nothing here
    /// guarantees the file still exists.
    pub poster_path: Option<String>,
}

impl CatalogEntry {
    /// True once the entry has been assigned a database id.
    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = "Cartoon".parse::<Category>().unwrap_err();
        assert_eq!(err, UnknownCategory("Cartoon".to_string()));
    }

    #[test]
    fn display_matches_storage_label() {
        assert_eq!(Category::Documentary.to_string(), "Documentary");
    }

    #[test]
    fn fresh_entry_is_not_persisted() {
        let entry = CatalogEntry {
            id: 0,
            title: "Arrival".to_string(),
            release_date: Utc::now(),
            category: Category::Film,
            watched: false,
            rating: None,
            comment: None,
            poster_path: None,
        };
        assert!(!entry.is_persisted());
    }
}
