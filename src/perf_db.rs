//! SQLite capture reader and report sink
//!
//! `SqliteRowSource` reads the database produced by the capture converter
//! (`perf_thread`, `perf_files`, `data_dict`, `perf_callchain`,
//! `perf_sample`/`perf_report` and the timeline tables). `ReportDb` writes
//! the `perf_symbol_details` and `perf_test_step` tables consumed by
//! regression tooling.

use crate::attribution::{EventType, SampleRow};
use crate::error::{AnalysisError, Result};
use crate::report::SymbolDetail;
use crate::row_source::{CallchainFrameRow, FileRow, RowSource, SymbolRow, ThreadRow, TimelineMarker};
use crate::step_window::StepWindow;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

/// Pid of the test driver process that owns the step markers
pub const MARKER_PROCESS_PID: i64 = 66666;

// threads of the app's processes: `<bundle>`, `<bundle>:ui`, `<bundle>:render`,
// `<bundle>:background`, `<bundle>service:ui`
const APP_THREADS_SQL: &str = "
    SELECT child.thread_id
    FROM perf_thread parent
    INNER JOIN perf_thread child ON child.process_id = parent.thread_id
    WHERE parent.thread_id = parent.process_id
      AND parent.thread_name IN (?1, ?1 || ':ui', ?1 || ':render', ?1 || ':background', ?1 || 'service:ui')";

const EVENT_FILTER_SQL: &str = "perf_report.report_value IN ('hw-instructions', 'instructions', \
    'raw-instruction-retired', 'hw-cpu-cycles', 'cpu-cycles', 'raw-cpu-cycles')";

const MARKERS_SQL: &str = "
    SELECT callstack.name, callstack.ts, callstack.dur
    FROM process
    INNER JOIN thread ON process.ipid = thread.ipid
    INNER JOIN callstack ON thread.itid = callstack.callid
    WHERE process.pid = ?1
    ORDER BY callstack.ts";

/// Row source over one capture database
pub struct SqliteRowSource {
    conn: Connection,
    app_bundle: Option<String>,
}

impl SqliteRowSource {
    /// Open a capture database read-only
    ///
    /// # Errors
    /// `MissingArtifact` if the file does not exist.
    pub fn open<P: AsRef<Path>>(path: P, app_bundle: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AnalysisError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self::from_connection(conn, app_bundle))
    }

    pub fn from_connection(conn: Connection, app_bundle: Option<&str>) -> Self {
        Self {
            conn,
            app_bundle: app_bundle.map(str::to_string),
        }
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn event_count(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

impl RowSource for SqliteRowSource {
    fn threads(&self) -> Result<Vec<ThreadRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT thread_id, process_id, thread_name FROM perf_thread")?;
        let rows = stmt.query_map([], |row| {
            Ok(ThreadRow {
                thread_id: row.get(0)?,
                process_id: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn files(&self) -> Result<Vec<FileRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT file_id, path FROM perf_files ORDER BY file_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(FileRow {
                file_id: row.get(0)?,
                path: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn symbols(&self) -> Result<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare("SELECT id, data FROM data_dict")?;
        let rows = stmt.query_map([], |row| {
            Ok(SymbolRow {
                symbol_id: row.get(0)?,
                text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn callchain_frames(&self) -> Result<Vec<CallchainFrameRow>> {
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(CallchainFrameRow {
                callchain_id: row.get(0)?,
                depth: row.get(1)?,
                file_id: row.get(2)?,
                symbol_id: row.get(3)?,
            })
        };

        match &self.app_bundle {
            Some(bundle) => {
                let sql = format!(
                    "SELECT callchain_id, depth, file_id, name FROM perf_callchain
                     WHERE callchain_id IN (
                         SELECT perf_sample.callchain_id
                         FROM perf_report INNER JOIN perf_sample ON perf_report.id = perf_sample.event_type_id
                         WHERE {} AND perf_sample.thread_id IN ({}))
                     ORDER BY callchain_id, depth DESC",
                    EVENT_FILTER_SQL, APP_THREADS_SQL
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![bundle], map_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT callchain_id, depth, file_id, name FROM perf_callchain
                     ORDER BY callchain_id, depth DESC",
                )?;
                let rows = stmt.query_map([], map_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
        }
    }

    fn samples(&self) -> Result<Vec<SampleRow>> {
        let base = format!(
            "SELECT perf_sample.id, perf_sample.callchain_id, perf_sample.thread_id,
                    perf_sample.event_count, perf_report.report_value, perf_sample.timestamp_trace
             FROM perf_report INNER JOIN perf_sample ON perf_report.id = perf_sample.event_type_id
             WHERE {}",
            EVENT_FILTER_SQL
        );
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(SampleRow {
                id: row.get(0)?,
                callchain_id: row.get(1)?,
                thread_id: row.get(2)?,
                event_count: event_count(row.get(3)?),
                event_name: row.get(4)?,
                timestamp: row.get(5)?,
            })
        };

        match &self.app_bundle {
            Some(bundle) => {
                let sql = format!("{} AND perf_sample.thread_id IN ({})", base, APP_THREADS_SQL);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map(params![bundle], map_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
            None => {
                let mut stmt = self.conn.prepare(&base)?;
                let rows = stmt.query_map([], map_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
        }
    }

    fn timeline_markers(&self) -> Result<Vec<TimelineMarker>> {
        // captures without a trace section carry no timeline tables
        for table in ["process", "thread", "callstack"] {
            if !self.table_exists(table)? {
                tracing::debug!("No {} table, capture has no step markers", table);
                return Ok(Vec::new());
            }
        }

        let mut stmt = self.conn.prepare(MARKERS_SQL)?;
        let rows = stmt.query_map(params![MARKER_PROCESS_PID], |row| {
            Ok(TimelineMarker {
                name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                ts: row.get(1)?,
                dur: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn sample_time_range(&self) -> Result<Option<(i64, i64)>> {
        let (min, max): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(timestamp_trace), MAX(timestamp_trace) FROM perf_sample",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(min.zip(max))
    }

    fn event_total(&self, event_type: EventType) -> Result<u64> {
        let aliases = event_type.aliases();
        let total: Option<i64> = self.conn.query_row(
            "SELECT SUM(perf_sample.event_count)
             FROM perf_sample INNER JOIN perf_report ON perf_report.id = perf_sample.event_type_id
             WHERE perf_report.report_value IN (?1, ?2, ?3)",
            params![aliases[0], aliases[1], aliases[2]],
            |row| row.get(0),
        )?;
        Ok(total.map_or(0, event_count))
    }
}

const REPORT_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS perf_symbol_details (
    test_version TEXT,
    test_scene_name TEXT,
    step_id INTEGER,
    event_type TEXT,
    process_id INTEGER,
    process_name TEXT,
    process_events INTEGER,
    thread_id INTEGER,
    thread_name TEXT,
    thread_events INTEGER,
    file TEXT,
    file_events INTEGER,
    symbol TEXT,
    symbol_events INTEGER,
    symbol_total_events INTEGER,
    component_name TEXT,
    component_category INTEGER,
    origin_kind INTEGER
);

CREATE TABLE IF NOT EXISTS perf_test_step (
    id INTEGER,
    name TEXT,
    start INTEGER,
    end INTEGER
);
";

/// Self load per category id as stored in a report database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLoad {
    pub category_id: i32,
    pub self_count: u64,
}

/// Relational report sink
pub struct ReportDb {
    conn: Connection,
}

impl ReportDb {
    /// Open (or create) a report database and ensure its schema
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(REPORT_SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(REPORT_SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert step windows in one transaction
    pub fn insert_steps(&mut self, windows: &[StepWindow]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO perf_test_step VALUES (?1, ?2, ?3, ?4)")?;
            for w in windows {
                stmt.execute(params![w.step_id, w.name, w.start, w.end])?;
            }
        }
        tx.commit()?;
        Ok(windows.len())
    }

    /// Insert symbol detail rows in one transaction
    pub fn insert_symbol_details(&mut self, version: &str, scene: &str, details: &[SymbolDetail]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO perf_symbol_details VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            )?;
            for d in details {
                stmt.execute(params![
                    version,
                    scene,
                    d.step_id,
                    d.event_type.label(),
                    d.pid,
                    d.process_name,
                    d.process_events as i64,
                    d.tid,
                    d.thread_name,
                    d.thread_events as i64,
                    d.file,
                    d.file_events as i64,
                    d.symbol,
                    d.symbol_events as i64,
                    d.symbol_total_events as i64,
                    d.component_name,
                    d.component_category.id(),
                    d.origin_kind.id(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(details.len())
    }

    /// Self load per component category
    pub fn category_overview(&self) -> Result<Vec<CategoryLoad>> {
        let mut stmt = self.conn.prepare(
            "SELECT component_category, SUM(symbol_events) FROM perf_symbol_details
             GROUP BY component_category ORDER BY component_category",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CategoryLoad {
                category_id: row.get(0)?,
                self_count: event_count(row.get(1)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn step_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM perf_test_step", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
