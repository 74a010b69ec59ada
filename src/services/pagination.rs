//! Cursor pagination over object records.
//!
//! Order: capture time newest first, records without a capture time last,
//! key ascending as the tie-breaker in both groups. A page token is the
//! base64 of `"<RFC3339>|<key>"` or `"null|<key>"` for the last item served.

use super::{
    error::{LibraryError, LibraryResult, index_err},
    index_store::{IndexStore, normalize_capture_time},
};
use crate::models::{object::ObjectRecord, user::OwnerId};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, sqlite::Sqlite};

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 1000;

const NULL_SENTINEL: &str = "null";

/// Position after the last record of a page.
#[derive(Clone, Debug, PartialEq)]
pub struct Cursor {
    pub captured_at: Option<DateTime<Utc>>,
    pub key: String,
}

impl Cursor {
    pub fn after(record: &ObjectRecord) -> Self {
        Self {
            captured_at: record.captured_at,
            key: record.key.clone(),
        }
    }

    pub fn encode(&self) -> String {
        let time = match self.captured_at {
            Some(t) => t.to_rfc3339_opts(SecondsFormat::Secs, true),
            None => NULL_SENTINEL.to_string(),
        };
        general_purpose::STANDARD.encode(format!("{}|{}", time, self.key))
    }

    pub fn decode(token: &str) -> LibraryResult<Self> {
        let raw = general_purpose::STANDARD
            .decode(token)
            .map_err(|_| LibraryError::invalid("invalid page token"))?;
        let raw = String::from_utf8(raw).map_err(|_| LibraryError::invalid("invalid page token"))?;
        let (time, key) = raw
            .split_once('|')
            .ok_or_else(|| LibraryError::invalid("invalid page token format"))?;
        let captured_at = if time == NULL_SENTINEL {
            None
        } else {
            let parsed = DateTime::parse_from_rfc3339(time)
                .map_err(|_| LibraryError::invalid("invalid page token time"))?;
            Some(normalize_capture_time(parsed.with_timezone(&Utc)))
        };
        Ok(Self {
            captured_at,
            key: key.to_string(),
        })
    }
}

/// Apply the server-side default and cap. Zero or negative means default.
pub fn clamp_page_size(requested: i64) -> i64 {
    if requested <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        requested.min(MAX_PAGE_SIZE)
    }
}

#[derive(Debug)]
pub struct Page {
    pub items: Vec<ObjectRecord>,
    pub next_page_token: Option<String>,
}

impl IndexStore {
    /// One page of listable records directly under `prefix`.
    ///
    /// Keys with a `/` after the prefix belong to a subdirectory and markdown
    /// index files are structural; both are filtered in SQL before the limit.
    pub async fn list_page(
        &self,
        owner: OwnerId,
        prefix: &str,
        page_size: i64,
        page_token: Option<&str>,
    ) -> LibraryResult<Page> {
        let page_size = clamp_page_size(page_size);
        let cursor = match page_token.filter(|t| !t.is_empty()) {
            Some(token) => Some(Cursor::decode(token)?),
            None => None,
        };

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, owner_id, key, content_type, checksum, captured_at, created_at, updated_at, deleted_at \
             FROM photo_objects WHERE deleted_at IS NULL AND owner_id = ",
        );
        qb.push_bind(owner);
        qb.push(" AND lower(key) NOT LIKE '%.md'");
        if !prefix.is_empty() {
            qb.push(" AND substr(key, 1, length(");
            qb.push_bind(prefix.to_string());
            qb.push(")) = ");
            qb.push_bind(prefix.to_string());
        }
        qb.push(" AND instr(substr(key, ");
        qb.push_bind(prefix.chars().count() as i64 + 1);
        qb.push("), '/') = 0");

        if let Some(cursor) = &cursor {
            match cursor.captured_at {
                None => {
                    qb.push(" AND (captured_at IS NULL AND key > ");
                    qb.push_bind(cursor.key.clone());
                    qb.push(")");
                }
                Some(t) => {
                    qb.push(" AND (captured_at < ");
                    qb.push_bind(t);
                    qb.push(" OR captured_at IS NULL OR (captured_at = ");
                    qb.push_bind(t);
                    qb.push(" AND key > ");
                    qb.push_bind(cursor.key.clone());
                    qb.push("))");
                }
            }
        }

        qb.push(" ORDER BY captured_at IS NULL, captured_at DESC, key ASC LIMIT ");
        qb.push_bind(page_size + 1);

        let mut items = qb
            .build_query_as::<ObjectRecord>()
            .fetch_all(&*self.db)
            .await
            .map_err(index_err(format!(
                "list photos under {:?} for owner {}",
                prefix, owner
            )))?;

        let next_page_token = if items.len() as i64 > page_size {
            items.truncate(page_size as usize);
            items.last().map(|last| Cursor::after(last).encode())
        } else {
            None
        };

        Ok(Page {
            items,
            next_page_token,
        })
    }
}
