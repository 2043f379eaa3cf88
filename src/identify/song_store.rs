//! Storage for cached song identification results.
//!
//! This is the dedup cache: a read-through store keyed by canonical media
//! ID. Records persist indefinitely; the cache exists for correctness
//! (never bill the recognition API twice for the same media), not capacity.

use super::models::{SongRecord, TrendingStats};
use super::schema::SONG_STORE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Trait for song record storage operations.
pub trait SongStore: Send + Sync {
    /// Get a record by canonical media ID.
    fn get_by_media_id(&self, media_id: &str) -> Result<Option<SongRecord>>;

    /// Get a record by its own ID.
    fn get_by_id(&self, id: &str) -> Result<Option<SongRecord>>;

    /// Record a cache hit: bump `search_count` and return the fresh record.
    /// Returns None when no record exists for the media ID.
    fn record_cache_hit(&self, media_id: &str) -> Result<Option<SongRecord>>;

    /// Insert or update a record by media ID.
    ///
    /// On conflict the existing row keeps its id and `search_count`; the
    /// song fields are overwritten (last writer wins per key). Returns the
    /// stored record.
    fn upsert(&self, record: &SongRecord) -> Result<SongRecord>;

    /// Top records by `search_count` plus aggregate totals.
    fn trending(&self, limit: usize) -> Result<TrendingStats>;
}

/// SQLite-backed song store.
pub struct SqliteSongStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSongStore {
    /// Open an existing database or create a new one with the current
    /// schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn =
            sqlite_persistence::open_versioned(db_path.as_ref(), &SONG_STORE_VERSIONED_SCHEMAS)
                .context("Failed to open song store")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = sqlite_persistence::open_in_memory(&SONG_STORE_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<SongRecord> {
        Ok(SongRecord {
            id: row.get("id")?,
            media_id: row.get("media_id")?,
            source_url: row.get("source_url")?,
            song_title: row.get("song_title")?,
            artist_name: row.get("artist_name")?,
            album_artwork: row.get("album_artwork")?,
            spotify_link: row.get("spotify_link")?,
            apple_music_link: row.get("apple_music_link")?,
            provider_track_id: row.get("provider_track_id")?,
            provider_url: row.get("provider_url")?,
            search_count: row.get("search_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl SongStore for SqliteSongStore {
    fn get_by_media_id(&self, media_id: &str) -> Result<Option<SongRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM song_records WHERE media_id = ?1")?;
        let record = stmt.query_row([media_id], Self::row_to_record).optional()?;
        Ok(record)
    }

    fn get_by_id(&self, id: &str) -> Result<Option<SongRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM song_records WHERE id = ?1")?;
        let record = stmt.query_row([id], Self::row_to_record).optional()?;
        Ok(record)
    }

    fn record_cache_hit(&self, media_id: &str) -> Result<Option<SongRecord>> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE song_records
             SET search_count = search_count + 1, updated_at = ?2
             WHERE media_id = ?1",
            rusqlite::params![media_id, Self::now()],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let mut stmt = conn.prepare("SELECT * FROM song_records WHERE media_id = ?1")?;
        let record = stmt.query_row([media_id], Self::row_to_record).optional()?;
        Ok(record)
    }

    fn upsert(&self, record: &SongRecord) -> Result<SongRecord> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO song_records (
                id, media_id, source_url, song_title, artist_name, album_artwork,
                spotify_link, apple_music_link, provider_track_id, provider_url,
                search_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(media_id) DO UPDATE SET
                source_url = excluded.source_url,
                song_title = excluded.song_title,
                artist_name = excluded.artist_name,
                album_artwork = excluded.album_artwork,
                spotify_link = excluded.spotify_link,
                apple_music_link = excluded.apple_music_link,
                provider_track_id = excluded.provider_track_id,
                provider_url = excluded.provider_url,
                updated_at = excluded.updated_at"#,
            rusqlite::params![
                record.id,
                record.media_id,
                record.source_url,
                record.song_title,
                record.artist_name,
                record.album_artwork,
                record.spotify_link,
                record.apple_music_link,
                record.provider_track_id,
                record.provider_url,
                record.search_count,
                record.created_at,
                Self::now(),
            ],
        )?;

        let mut stmt = conn.prepare("SELECT * FROM song_records WHERE media_id = ?1")?;
        let stored = stmt.query_row([record.media_id.as_str()], Self::row_to_record)?;
        Ok(stored)
    }

    fn trending(&self, limit: usize) -> Result<TrendingStats> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT * FROM song_records
             WHERE song_title != ''
             ORDER BY search_count DESC
             LIMIT ?1",
        )?;
        let trending: Vec<SongRecord> = stmt
            .query_map([limit as i64], Self::row_to_record)?
            .collect::<rusqlite::Result<_>>()?;

        let total_searches: i64 = conn.query_row(
            "SELECT COALESCE(SUM(search_count), 0) FROM song_records",
            [],
            |row| row.get(0),
        )?;
        let unique_songs: i64 = conn.query_row(
            "SELECT COUNT(*) FROM song_records WHERE song_title != ''",
            [],
            |row| row.get(0),
        )?;

        Ok(TrendingStats {
            trending,
            total_searches,
            unique_songs,
        })
    }
}
