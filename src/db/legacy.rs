//! One-time import of the old flat preference cache into the record table.
//!
//! The legacy file is a single JSON object holding two stringified entries:
//! `srs_cache` (filename -> SRS JSON) and `recent_bids` (a list of
//! `{name, ts}`). A non-empty record table means migration already ran or
//! was never needed. Partial migration is acceptable; malformed entries
//! are skipped.

use super::models::RecordPatch;
use super::{now_ms, upsert_locked};
use log::debug;
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;

pub(crate) fn migrate_if_needed(conn: &Connection, legacy_path: &Path) {
    let count: i64 = match conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0)) {
        Ok(n) => n,
        Err(_) => return,
    };
    if count > 0 {
        return;
    }

    let raw = match std::fs::read_to_string(legacy_path) {
        Ok(s) => s,
        Err(_) => return,
    };
    let prefs: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            debug!("legacy preference file unreadable, skipping migration: {e}");
            return;
        }
    };

    if let Some(cache) = prefs
        .get("srs_cache")
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
    {
        if let Some(entries) = cache.as_object() {
            for (name, srs) in entries {
                let srs = match srs.as_str() {
                    Some(s) if !s.is_empty() => s,
                    _ => continue,
                };
                let patch = RecordPatch {
                    srs_json: Some(srs.to_string()),
                    ts: Some(now_ms()),
                    ..Default::default()
                };
                if upsert_locked(conn, name, patch).is_ok() {
                    debug!("migrated legacy SRS cache entry for {name}");
                }
            }
        }
    }

    if let Some(recents) = prefs
        .get("recent_bids")
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
    {
        if let Some(entries) = recents.as_array() {
            for entry in entries {
                let name = match entry.get("name").and_then(Value::as_str) {
                    Some(n) if !n.is_empty() => n,
                    _ => continue,
                };
                let ts = entry.get("ts").and_then(Value::as_i64).unwrap_or_else(now_ms);
                let patch = RecordPatch {
                    ts: Some(ts),
                    ..Default::default()
                };
                let _ = upsert_locked(conn, name, patch);
            }
        }
    }
}
