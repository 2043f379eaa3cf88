//! Database schemas for the song cache and the task registry.

use crate::sqlite_persistence::{Table, VersionedSchema};

/// Cached identification results, one row per canonical media ID.
const SONG_RECORDS_TABLE_V1: Table = Table {
    name: "song_records",
    columns: &[
        "id",
        "media_id",
        "source_url",
        "song_title",
        "artist_name",
        "album_artwork",
        "spotify_link",
        "apple_music_link",
        "provider_track_id",
        "provider_url",
        "search_count",
        "created_at",
        "updated_at",
    ],
    create_sql: "CREATE TABLE song_records (
        id TEXT PRIMARY KEY,
        media_id TEXT NOT NULL UNIQUE,
        source_url TEXT NOT NULL,
        song_title TEXT NOT NULL DEFAULT '',
        artist_name TEXT NOT NULL DEFAULT '',
        album_artwork TEXT NOT NULL DEFAULT '',
        spotify_link TEXT NOT NULL DEFAULT '',
        apple_music_link TEXT NOT NULL DEFAULT '',
        provider_track_id TEXT NOT NULL DEFAULT '',
        provider_url TEXT NOT NULL DEFAULT '',
        search_count INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    indices: &[("idx_songs_search_count", "search_count")],
};

/// Identification task registry.
const TASK_RECORDS_TABLE_V1: Table = Table {
    name: "task_records",
    columns: &[
        "id",
        "media_id",
        "source_url",
        "status",
        "song_id",
        "error_kind",
        "error_message",
        "attempt_count",
        "max_attempts",
        "next_retry_at",
        "created_at",
        "started_at",
        "completed_at",
    ],
    create_sql: "CREATE TABLE task_records (
        id TEXT PRIMARY KEY,
        media_id TEXT NOT NULL,
        source_url TEXT NOT NULL,
        status TEXT NOT NULL,
        song_id TEXT,
        error_kind TEXT,
        error_message TEXT,
        attempt_count INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        next_retry_at INTEGER,
        created_at INTEGER NOT NULL,
        started_at INTEGER,
        completed_at INTEGER
    )",
    indices: &[
        ("idx_tasks_status", "status, created_at"),
        ("idx_tasks_next_retry", "next_retry_at"),
        ("idx_tasks_media", "media_id"),
    ],
};

pub static SONG_STORE_VERSIONED_SCHEMAS: [VersionedSchema; 1] = [VersionedSchema {
    version: 0,
    tables: &[SONG_RECORDS_TABLE_V1],
    migration: None,
}];

pub static TASK_STORE_VERSIONED_SCHEMAS: [VersionedSchema; 1] = [VersionedSchema {
    version: 0,
    tables: &[TASK_RECORDS_TABLE_V1],
    migration: None,
}];
