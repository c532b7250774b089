pub mod legacy;
pub mod models;

use crate::events::ProposalBus;
use log::debug;
use models::{Record, RecordPatch};
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Records kept before the oldest are trimmed away.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

// Recency window scanned when trimming after a write.
const TRIM_SCAN_WINDOW: usize = 100;

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct RecordStore {
    conn: Mutex<Connection>,
    events: ProposalBus,
    recent_limit: usize,
    legacy_path: PathBuf,
    migrated: AtomicBool,
}

impl RecordStore {
    pub fn open(data_dir: &Path, recent_limit: usize) -> Result<Self> {
        std::fs::create_dir_all(data_dir).ok();
        let db_path = data_dir.join("bidforge.db");
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
            events: ProposalBus::new(),
            recent_limit,
            legacy_path: data_dir.join("legacy_prefs.json"),
            migrated: AtomicBool::new(false),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS records (
                filename TEXT PRIMARY KEY,
                srs_json TEXT,
                raw_text TEXT,
                ts INTEGER NOT NULL,
                status TEXT,
                proposal_json TEXT,
                pdf_path TEXT
            );
            ",
        )?;
        Ok(())
    }

    /// Bus announcing "proposal saved for file F"; subscribe before
    /// kicking off a generation to observe its completion.
    pub fn proposal_events(&self) -> &ProposalBus {
        &self.events
    }

    // Import the old flat preference cache once per process, before the
    // first regular read or write. Best-effort: a failure here never
    // blocks normal operation.
    fn ensure_migrated(&self) {
        if self.migrated.swap(true, Ordering::SeqCst) {
            return;
        }
        let conn = self.conn.lock().unwrap();
        legacy::migrate_if_needed(&conn, &self.legacy_path);
    }

    // ── Core contract ──

    /// Create the Record if absent, else merge `patch` into it (patch wins
    /// on set fields). `ts` is refreshed to now unless the patch carries an
    /// explicit timestamp. The write is committed before returning, then
    /// the recency limit is enforced.
    pub fn upsert(&self, filename: &str, patch: RecordPatch) -> Result<()> {
        self.ensure_migrated();
        let conn = self.conn.lock().unwrap();
        upsert_locked(&conn, filename, patch)?;
        trim_locked(&conn, self.recent_limit)?;
        Ok(())
    }

    pub fn get(&self, filename: &str) -> Result<Option<Record>> {
        self.ensure_migrated();
        let conn = self.conn.lock().unwrap();
        get_locked(&conn, filename)
    }

    /// Records ordered by last touch, newest first, truncated to `limit`.
    pub fn recent(&self, limit: usize) -> Result<Vec<Record>> {
        self.ensure_migrated();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT filename, srs_json, raw_text, ts, status, proposal_json, pdf_path
             FROM records ORDER BY ts DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_record)?;
        rows.collect()
    }

    pub fn all(&self) -> Result<Vec<Record>> {
        self.ensure_migrated();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT filename, srs_json, raw_text, ts, status, proposal_json, pdf_path
             FROM records ORDER BY ts DESC",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect()
    }

    pub fn delete_by_filename(&self, filename: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM records WHERE filename = ?1", params![filename])?;
        Ok(())
    }

    // ── Domain operations ──

    /// Touch a filename so it surfaces in the recent list, creating a bare
    /// Record on first sight.
    pub fn add_recent_file(&self, filename: &str) -> Result<()> {
        self.upsert(filename, RecordPatch::default())
    }

    pub fn save_srs_for_file(&self, filename: &str, srs_json: &str) -> Result<()> {
        self.upsert(
            filename,
            RecordPatch {
                srs_json: Some(srs_json.to_string()),
                ..Default::default()
            },
        )
    }

    /// Persist a freshly generated proposal and announce it on the bus.
    /// Any previously rendered PDF belonged to the superseded proposal, so
    /// its path is dropped; rendering happens lazily on save/share.
    pub fn save_proposal_for_file(
        &self,
        filename: &str,
        proposal_json: &str,
        report_html: Option<&str>,
    ) -> Result<()> {
        self.ensure_migrated();
        {
            let conn = self.conn.lock().unwrap();
            let patch = RecordPatch {
                proposal_json: Some(proposal_json.to_string()),
                raw_text: report_html
                    .filter(|h| !h.trim().is_empty())
                    .map(str::to_string),
                ..Default::default()
            };
            upsert_locked(&conn, filename, patch)?;
            conn.execute(
                "UPDATE records SET pdf_path = NULL WHERE filename = ?1",
                params![filename],
            )?;
            trim_locked(&conn, self.recent_limit)?;
        }
        debug!("saved proposal for file={filename} (PDF deferred until save/share)");
        self.events.publish(filename);
        Ok(())
    }

    pub fn save_pdf_path_for_file(&self, filename: &str, pdf_path: &str) -> Result<()> {
        self.ensure_migrated();
        let updated = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE records SET pdf_path = ?1 WHERE filename = ?2",
                params![pdf_path, filename],
            )?
        };
        if updated > 0 {
            debug!("saved PDF path for file={filename}: {pdf_path}");
        }
        Ok(())
    }

    /// Forget a rendered PDF so the next save/share renders a fresh one.
    pub fn clear_pdf_path_for_file(&self, filename: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE records SET pdf_path = NULL WHERE filename = ?1",
            params![filename],
        )?;
        Ok(())
    }

    pub fn get_srs_for_file(&self, filename: &str) -> Result<Option<String>> {
        Ok(self.get(filename)?.and_then(|r| r.srs_json))
    }

    pub fn get_proposal_for_file(&self, filename: &str) -> Result<Option<String>> {
        Ok(self.get(filename)?.and_then(|r| r.proposal_json))
    }

    pub fn get_pdf_path_for_file(&self, filename: &str) -> Result<Option<String>> {
        Ok(self.get(filename)?.and_then(|r| r.pdf_path))
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    Ok(Record {
        filename: row.get(0)?,
        srs_json: row.get(1)?,
        raw_text: row.get(2)?,
        ts: row.get(3)?,
        status: row.get(4)?,
        proposal_json: row.get(5)?,
        pdf_path: row.get(6)?,
    })
}

fn get_locked(conn: &Connection, filename: &str) -> Result<Option<Record>> {
    conn.query_row(
        "SELECT filename, srs_json, raw_text, ts, status, proposal_json, pdf_path
         FROM records WHERE filename = ?1 LIMIT 1",
        params![filename],
        row_to_record,
    )
    .optional()
}

// Read-modify-write under the caller's connection lock, so concurrent
// upserts for the same filename cannot lose fields.
pub(crate) fn upsert_locked(conn: &Connection, filename: &str, patch: RecordPatch) -> Result<()> {
    let existing = get_locked(conn, filename)?;
    let merged = match existing {
        Some(rec) => Record {
            filename: rec.filename,
            srs_json: patch.srs_json.or(rec.srs_json),
            raw_text: patch.raw_text.or(rec.raw_text),
            ts: patch.ts.unwrap_or_else(now_ms),
            status: patch.status.or(rec.status),
            proposal_json: patch.proposal_json.or(rec.proposal_json),
            pdf_path: patch.pdf_path.or(rec.pdf_path),
        },
        None => Record {
            filename: filename.to_string(),
            srs_json: patch.srs_json,
            raw_text: patch.raw_text,
            ts: patch.ts.unwrap_or_else(now_ms),
            status: patch.status,
            proposal_json: patch.proposal_json,
            pdf_path: patch.pdf_path,
        },
    };
    conn.execute(
        "INSERT OR REPLACE INTO records
         (filename, srs_json, raw_text, ts, status, proposal_json, pdf_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            merged.filename,
            merged.srs_json,
            merged.raw_text,
            merged.ts,
            merged.status,
            merged.proposal_json,
            merged.pdf_path
        ],
    )?;
    Ok(())
}

// Drop everything beyond the recency limit, oldest first.
fn trim_locked(conn: &Connection, limit: usize) -> Result<()> {
    let mut stmt = conn.prepare("SELECT filename FROM records ORDER BY ts DESC LIMIT ?1")?;
    let names: Vec<String> = stmt
        .query_map(params![TRIM_SCAN_WINDOW as i64], |row| row.get(0))?
        .collect::<Result<_>>()?;
    for name in names.iter().skip(limit) {
        conn.execute("DELETE FROM records WHERE filename = ?1", params![name])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(limit: usize) -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path(), limit).unwrap();
        (dir, store)
    }

    #[test]
    fn test_upsert_merges_patches() {
        let (_dir, store) = open_store(DEFAULT_RECENT_LIMIT);
        store
            .upsert(
                "a.pdf",
                RecordPatch {
                    srs_json: Some("{\"v\":1}".into()),
                    ts: Some(1000),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .upsert(
                "a.pdf",
                RecordPatch {
                    proposal_json: Some("{\"p\":1}".into()),
                    ts: Some(2000),
                    ..Default::default()
                },
            )
            .unwrap();

        let rec = store.get("a.pdf").unwrap().unwrap();
        assert_eq!(rec.srs_json.as_deref(), Some("{\"v\":1}"));
        assert_eq!(rec.proposal_json.as_deref(), Some("{\"p\":1}"));
        assert_eq!(rec.ts, 2000);
    }

    #[test]
    fn test_upsert_overlapping_field_takes_latest() {
        let (_dir, store) = open_store(DEFAULT_RECENT_LIMIT);
        store
            .upsert(
                "a.pdf",
                RecordPatch {
                    srs_json: Some("old".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .upsert(
                "a.pdf",
                RecordPatch {
                    srs_json: Some("new".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let rec = store.get("a.pdf").unwrap().unwrap();
        assert_eq!(rec.srs_json.as_deref(), Some("new"));
    }

    #[test]
    fn test_recent_orders_newest_first() {
        let (_dir, store) = open_store(DEFAULT_RECENT_LIMIT);
        for (name, ts) in [("a.pdf", 100), ("b.pdf", 300), ("c.pdf", 200)] {
            store
                .upsert(
                    name,
                    RecordPatch {
                        ts: Some(ts),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        let names: Vec<String> = store
            .recent(2)
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["b.pdf", "c.pdf"]);
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let (_dir, store) = open_store(3);
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            store
                .upsert(
                    name,
                    RecordPatch {
                        ts: Some((i as i64 + 1) * 100),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        let names: Vec<String> = store
            .recent(10)
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["d", "c", "b"]);
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_touch_rescues_record_from_eviction() {
        let (_dir, store) = open_store(2);
        for (name, ts) in [("a", 100), ("b", 200)] {
            store
                .upsert(
                    name,
                    RecordPatch {
                        ts: Some(ts),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        // Touching "a" makes "b" the eviction candidate.
        store
            .upsert(
                "a",
                RecordPatch {
                    ts: Some(300),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .upsert(
                "c",
                RecordPatch {
                    ts: Some(400),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.get("b").unwrap().is_none());
        assert!(store.get("a").unwrap().is_some());
    }

    #[test]
    fn test_save_proposal_publishes_and_drops_stale_pdf_path() {
        let (_dir, store) = open_store(DEFAULT_RECENT_LIMIT);
        store.save_srs_for_file("a.pdf", "{}").unwrap();
        store
            .save_pdf_path_for_file("a.pdf", "/tmp/old.pdf")
            .unwrap();

        let mut rx = store.proposal_events().subscribe();
        store
            .save_proposal_for_file("a.pdf", "{\"p\":2}", Some("<html></html>"))
            .unwrap();

        assert_eq!(rx.try_recv().unwrap(), "a.pdf");
        let rec = store.get("a.pdf").unwrap().unwrap();
        assert_eq!(rec.proposal_json.as_deref(), Some("{\"p\":2}"));
        assert_eq!(rec.raw_text.as_deref(), Some("<html></html>"));
        assert!(rec.pdf_path.is_none());
    }

    #[test]
    fn test_delete_by_filename_removes_record() {
        let (_dir, store) = open_store(DEFAULT_RECENT_LIMIT);
        store.save_srs_for_file("a.pdf", "{}").unwrap();
        store.delete_by_filename("a.pdf").unwrap();
        assert!(store.get("a.pdf").unwrap().is_none());
    }

    #[test]
    fn test_get_missing_returns_none() {
        let (_dir, store) = open_store(DEFAULT_RECENT_LIMIT);
        assert!(store.get("nope.pdf").unwrap().is_none());
        assert!(store.get_proposal_for_file("nope.pdf").unwrap().is_none());
    }

    #[test]
    fn test_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RecordStore::open(dir.path(), DEFAULT_RECENT_LIMIT).unwrap();
            store.save_srs_for_file("a.pdf", "{\"v\":1}").unwrap();
        }
        let store = RecordStore::open(dir.path(), DEFAULT_RECENT_LIMIT).unwrap();
        assert_eq!(
            store.get_srs_for_file("a.pdf").unwrap().as_deref(),
            Some("{\"v\":1}")
        );
    }
}
