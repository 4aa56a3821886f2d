//! Bookmark records as stored in the `bookmarks` table

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Primary key of a bookmark row
///
/// Tables are created with either a `bigint` identity or a `uuid` key, so
/// both JSON numbers and strings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BookmarkId {
    Number(i64),
    Text(String),
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookmarkId::Number(n) => write!(f, "{}", n),
            BookmarkId::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for BookmarkId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(n) => BookmarkId::Number(n),
            Err(_) => BookmarkId::Text(s.trim().to_string()),
        })
    }
}

impl From<i64> for BookmarkId {
    fn from(n: i64) -> Self {
        BookmarkId::Number(n)
    }
}

impl From<&str> for BookmarkId {
    fn from(s: &str) -> Self {
        BookmarkId::Text(s.to_string())
    }
}

/// A bookmark row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub title: String,
    pub url: String,
    pub user_id: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Insert payload; `id` and `created_at` are assigned by the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

/// A row change delivered by the change subscription
#[derive(Debug, Clone, PartialEq)]
pub enum BookmarkChange {
    Insert(Bookmark),
    Delete(BookmarkId),
}

// PostgREST sends timestamptz with an offset, Realtime records may not carry one.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
