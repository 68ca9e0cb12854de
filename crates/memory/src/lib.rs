//! bridge_memory
//!
//! Component I — the memory entry store. Provenance is authoritative:
//! insertion derives `trust` from `source`, never the other way round,
//! and promotion is gated on the row's existing (source, category,
//! trust) triple (spec §4.I).

use bridge_store::{Store, StoreError};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("content exceeds 500 characters")]
    ContentTooLong,
    #[error("id exceeds 128 characters")]
    IdTooLong,
    #[error("entry {0} not found")]
    NotFound(String),
    #[error("entry {0} is not eligible for promotion (requires source=direct, category=posts, trust=quarantined)")]
    NotPromotable(String),
    #[error("entry {0} is already trusted")]
    AlreadyTrusted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Profile,
    Interests,
    Threads,
    Posts,
    Meta,
}

impl Category {
    fn as_str(&self) -> &'static str {
        match self {
            Category::Profile => "profile",
            Category::Interests => "interests",
            Category::Threads => "threads",
            Category::Posts => "posts",
            Category::Meta => "meta",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "profile" => Some(Category::Profile),
            "interests" => Some(Category::Interests),
            "threads" => Some(Category::Threads),
            "posts" => Some(Category::Posts),
            "meta" => Some(Category::Meta),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Direct,
    Public,
}

impl Source {
    fn as_str(&self) -> &'static str {
        match self {
            Source::Direct => "direct",
            Source::Public => "public",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Source::Direct),
            "public" => Some(Source::Public),
            _ => None,
        }
    }

    /// Provenance is authoritative: trust is *derived* from source at
    /// insertion time, never accepted as caller input.
    fn initial_trust(&self) -> Trust {
        match self {
            Source::Direct => Trust::Trusted,
            Source::Public => Trust::Untrusted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trust {
    Trusted,
    Quarantined,
    Untrusted,
}

impl Trust {
    fn as_str(&self) -> &'static str {
        match self {
            Trust::Trusted => "trusted",
            Trust::Quarantined => "quarantined",
            Trust::Untrusted => "untrusted",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "trusted" => Some(Trust::Trusted),
            "quarantined" => Some(Trust::Quarantined),
            "untrusted" => Some(Trust::Untrusted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub category: Category,
    pub content: String,
    pub source: Source,
    pub trust: Trust,
    pub chat_id: Option<String>,
    pub created_at: i64,
    pub promoted_at: Option<i64>,
    pub promoted_by: Option<String>,
    pub posted_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub id: String,
    pub category: Category,
    pub content: String,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadFilters {
    pub categories: Option<Vec<Category>>,
    pub trust: Option<Vec<Trust>>,
    pub sources: Option<Vec<Source>>,
    pub limit: Option<i64>,
    pub chat_id: Option<String>,
}

impl ReadFilters {
    fn normalized_limit(&self) -> i64 {
        self.limit.unwrap_or(200).clamp(1, 500)
    }
}

fn validate(entry: &NewEntry) -> Result<(), MemoryError> {
    if entry.content.chars().count() > 500 {
        return Err(MemoryError::ContentTooLong);
    }
    if entry.id.chars().count() > 128 {
        return Err(MemoryError::IdTooLong);
    }
    Ok(())
}

pub struct MemoryStore<'a> {
    store: &'a Store,
}

impl<'a> MemoryStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Inserts entries stamped with `source`; `trust` is derived, never
    /// accepted from the caller.
    pub fn create_entries(
        &self,
        entries: &[NewEntry],
        source: Source,
        now_ms: i64,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        for e in entries {
            validate(e)?;
        }
        let trust = source.initial_trust();
        let conn = self.store.checkout()?;
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            conn.execute(
                "INSERT INTO memory_entries (id, category, content, source, trust, chat_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![e.id, e.category.as_str(), e.content, source.as_str(), trust.as_str(), e.chat_id, now_ms],
            )
            .map_err(StoreError::from)?;
            out.push(MemoryEntry {
                id: e.id.clone(),
                category: e.category,
                content: e.content.clone(),
                source,
                trust,
                chat_id: e.chat_id.clone(),
                created_at: now_ms,
                promoted_at: None,
                promoted_by: None,
                posted_at: None,
            });
        }
        Ok(out)
    }

    /// Forces `source=direct`, `category=posts`, `trust=quarantined`,
    /// regardless of what the caller's `NewEntry.category` said.
    pub fn create_quarantined_entry(&self, mut entry: NewEntry, now_ms: i64) -> Result<MemoryEntry, MemoryError> {
        entry.category = Category::Posts;
        validate(&entry)?;
        let conn = self.store.checkout()?;
        conn.execute(
            "INSERT INTO memory_entries (id, category, content, source, trust, chat_id, created_at)
             VALUES (?1, 'posts', ?2, 'direct', 'quarantined', ?3, ?4)",
            params![entry.id, entry.content, entry.chat_id, now_ms],
        )
        .map_err(StoreError::from)?;
        Ok(MemoryEntry {
            id: entry.id,
            category: Category::Posts,
            content: entry.content,
            source: Source::Direct,
            trust: Trust::Quarantined,
            chat_id: entry.chat_id,
            created_at: now_ms,
            promoted_at: None,
            promoted_by: None,
            posted_at: None,
        })
    }

    /// Succeeds only when the row's existing (source, category, trust) is
    /// (direct, posts, quarantined); otherwise an error. A second call on
    /// an already-promoted row returns `AlreadyTrusted` rather than
    /// re-promoting it.
    pub fn promote_entry_trust(&self, id: &str, actor: &str, now_ms: i64) -> Result<MemoryEntry, MemoryError> {
        let conn = self.store.checkout()?;
        let row = fetch_row(&conn, id)?.ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

        if row.source == Source::Direct && row.category == Category::Posts && row.trust == Trust::Trusted {
            return Err(MemoryError::AlreadyTrusted(id.to_string()));
        }
        if !(row.source == Source::Direct && row.category == Category::Posts && row.trust == Trust::Quarantined) {
            return Err(MemoryError::NotPromotable(id.to_string()));
        }

        conn.execute(
            "UPDATE memory_entries SET trust = 'trusted', promoted_at = ?2, promoted_by = ?3 WHERE id = ?1",
            params![id, now_ms, actor],
        )
        .map_err(StoreError::from)?;

        Ok(MemoryEntry { trust: Trust::Trusted, promoted_at: Some(now_ms), promoted_by: Some(actor.to_string()), ..row })
    }

    pub fn mark_entry_posted(&self, id: &str, now_ms: i64) -> Result<(), MemoryError> {
        let conn = self.store.checkout()?;
        let updated = conn
            .execute("UPDATE memory_entries SET posted_at = ?2 WHERE id = ?1 AND posted_at IS NULL", params![id, now_ms])
            .map_err(StoreError::from)?;
        if updated == 0 {
            // either missing or already posted; already-posted is a no-op,
            // missing is surfaced so callers can tell the two apart.
            let exists = fetch_row(&conn, id)?.is_some();
            if !exists {
                return Err(MemoryError::NotFound(id.to_string()));
            }
        }
        Ok(())
    }

    /// `limit` is normalized to `[1, 500]`, default 200. `public`-scope
    /// callers must pass `sources = Some(vec![Source::Public])` from the
    /// RPC layer; this method re-applies that restriction defensively
    /// when `restrict_to_public` is set, per spec.md §9.
    pub fn read_entries(&self, filters: &ReadFilters, restrict_to_public: bool) -> Result<Vec<MemoryEntry>, MemoryError> {
        let mut filters = filters.clone();
        if restrict_to_public {
            filters.sources = Some(vec![Source::Public]);
        }
        let conn = self.store.checkout()?;

        let mut sql = String::from("SELECT id, category, content, source, trust, chat_id, created_at, promoted_at, promoted_by, posted_at FROM memory_entries WHERE 1=1");
        let mut binds: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(cats) = &filters.categories {
            let placeholders: Vec<String> = cats.iter().map(|_| "?".to_string()).collect();
            sql.push_str(&format!(" AND category IN ({})", placeholders.join(",")));
            for c in cats {
                binds.push(Box::new(c.as_str().to_string()));
            }
        }
        if let Some(trusts) = &filters.trust {
            let placeholders: Vec<String> = trusts.iter().map(|_| "?".to_string()).collect();
            sql.push_str(&format!(" AND trust IN ({})", placeholders.join(",")));
            for t in trusts {
                binds.push(Box::new(t.as_str().to_string()));
            }
        }
        if let Some(sources) = &filters.sources {
            let placeholders: Vec<String> = sources.iter().map(|_| "?".to_string()).collect();
            sql.push_str(&format!(" AND source IN ({})", placeholders.join(",")));
            for s in sources {
                binds.push(Box::new(s.as_str().to_string()));
            }
        }
        if let Some(chat_id) = &filters.chat_id {
            sql.push_str(" AND chat_id = ?");
            binds.push(Box::new(chat_id.clone()));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        binds.push(Box::new(filters.normalized_limit()));

        let param_refs: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();
        let mut stmt = conn.prepare(&sql).map_err(StoreError::from)?;
        let rows = stmt
            .query_map(param_refs.as_slice(), row_to_entry)
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(rows)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let category: String = row.get(1)?;
    let source: String = row.get(3)?;
    let trust: String = row.get(4)?;
    Ok(MemoryEntry {
        id: row.get(0)?,
        category: Category::parse(&category).unwrap_or(Category::Meta),
        content: row.get(2)?,
        source: Source::parse(&source).unwrap_or(Source::Public),
        trust: Trust::parse(&trust).unwrap_or(Trust::Untrusted),
        chat_id: row.get(5)?,
        created_at: row.get(6)?,
        promoted_at: row.get(7)?,
        promoted_by: row.get(8)?,
        posted_at: row.get(9)?,
    })
}

fn fetch_row(conn: &rusqlite::Connection, id: &str) -> Result<Option<MemoryEntry>, MemoryError> {
    conn.query_row(
        "SELECT id, category, content, source, trust, chat_id, created_at, promoted_at, promoted_by, posted_at
         FROM memory_entries WHERE id = ?1",
        params![id],
        row_to_entry,
    )
    .optional()
    .map_err(StoreError::from)
    .map_err(MemoryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Store {
        let dir = tempfile::tempdir().unwrap();
        Store::open(dir.path().join("bridge.db")).unwrap()
    }

    #[test]
    fn direct_source_yields_trusted_and_public_yields_untrusted() {
        let store = setup();
        let mem = MemoryStore::new(&store);
        let direct = mem
            .create_entries(&[NewEntry { id: "a".into(), category: Category::Profile, content: "x".into(), chat_id: None }], Source::Direct, 0)
            .unwrap();
        assert_eq!(direct[0].trust, Trust::Trusted);

        let public = mem
            .create_entries(&[NewEntry { id: "b".into(), category: Category::Profile, content: "x".into(), chat_id: None }], Source::Public, 0)
            .unwrap();
        assert_eq!(public[0].trust, Trust::Untrusted);
    }

    #[test]
    fn promotion_requires_direct_posts_quarantined() {
        let store = setup();
        let mem = MemoryStore::new(&store);
        mem.create_entries(&[NewEntry { id: "p1".into(), category: Category::Profile, content: "x".into(), chat_id: None }], Source::Direct, 0).unwrap();
        let err = mem.promote_entry_trust("p1", "actor1", 10).unwrap_err();
        assert!(matches!(err, MemoryError::NotPromotable(_)));

        mem.create_quarantined_entry(NewEntry { id: "q1".into(), category: Category::Meta, content: "x".into(), chat_id: None }, 0).unwrap();
        let promoted = mem.promote_entry_trust("q1", "actor1", 10).unwrap();
        assert_eq!(promoted.trust, Trust::Trusted);
        assert_eq!(promoted.promoted_by.as_deref(), Some("actor1"));
    }

    #[test]
    fn second_promote_of_an_already_trusted_entry_is_rejected() {
        let store = setup();
        let mem = MemoryStore::new(&store);
        mem.create_quarantined_entry(NewEntry { id: "q1".into(), category: Category::Meta, content: "x".into(), chat_id: None }, 0).unwrap();
        mem.promote_entry_trust("q1", "actor1", 10).unwrap();
        let err = mem.promote_entry_trust("q1", "actor2", 20).unwrap_err();
        assert!(matches!(err, MemoryError::AlreadyTrusted(id) if id == "q1"));
    }

    #[test]
    fn public_snapshot_is_restricted_to_public_source_even_if_requested_otherwise() {
        let store = setup();
        let mem = MemoryStore::new(&store);
        mem.create_entries(&[NewEntry { id: "d1".into(), category: Category::Profile, content: "x".into(), chat_id: None }], Source::Direct, 0).unwrap();
        mem.create_entries(&[NewEntry { id: "pub1".into(), category: Category::Profile, content: "y".into(), chat_id: None }], Source::Public, 0).unwrap();

        let filters = ReadFilters { sources: Some(vec![Source::Direct, Source::Public]), ..Default::default() };
        let rows = mem.read_entries(&filters, true).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "pub1");
    }

    #[test]
    fn content_over_500_chars_is_rejected() {
        let store = setup();
        let mem = MemoryStore::new(&store);
        let too_long = "a".repeat(501);
        let err = mem
            .create_entries(&[NewEntry { id: "x".into(), category: Category::Meta, content: too_long, chat_id: None }], Source::Direct, 0)
            .unwrap_err();
        assert!(matches!(err, MemoryError::ContentTooLong));
    }

    #[test]
    fn limit_is_clamped_into_range() {
        let filters = ReadFilters { limit: Some(10_000), ..Default::default() };
        assert_eq!(filters.normalized_limit(), 500);
        let filters = ReadFilters { limit: Some(0), ..Default::default() };
        assert_eq!(filters.normalized_limit(), 1);
        let filters = ReadFilters::default();
        assert_eq!(filters.normalized_limit(), 200);
    }
}
