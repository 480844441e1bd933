//! Tabular rows consumed by the analyzer
//!
//! A capture database is read through the `RowSource` trait so that the
//! analyzer never depends on the storage layer. `MemoryRowSource` backs
//! tests and benchmarks; `perf_db::SqliteRowSource` reads real captures.

use crate::attribution::{EventType, SampleRow};
use crate::error::Result;

/// `(thread_id, process_id, name)`; process roots have `thread_id == process_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRow {
    pub thread_id: i64,
    pub process_id: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    pub file_id: i64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRow {
    pub symbol_id: i64,
    pub text: String,
}

/// One frame of a sampled stack; depth grows toward the root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallchainFrameRow {
    pub callchain_id: i64,
    pub depth: i64,
    pub file_id: i64,
    pub symbol_id: i64,
}

/// Test driver marker on the capture timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineMarker {
    pub name: String,
    pub ts: i64,
    pub dur: i64,
}

/// Read access to one capture database
pub trait RowSource {
    fn threads(&self) -> Result<Vec<ThreadRow>>;

    fn files(&self) -> Result<Vec<FileRow>>;

    fn symbols(&self) -> Result<Vec<SymbolRow>>;

    /// Frames ordered by callchain id, then by descending depth
    fn callchain_frames(&self) -> Result<Vec<CallchainFrameRow>>;

    fn samples(&self) -> Result<Vec<SampleRow>>;

    /// Markers ordered by timestamp
    fn timeline_markers(&self) -> Result<Vec<TimelineMarker>>;

    /// Inclusive min/max sample timestamp, `None` without samples
    fn sample_time_range(&self) -> Result<Option<(i64, i64)>>;

    /// Sum of event counts over every alias of `event_type`
    fn event_total(&self, event_type: EventType) -> Result<u64>;
}

/// Row source over in-memory vectors
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    pub threads: Vec<ThreadRow>,
    pub files: Vec<FileRow>,
    pub symbols: Vec<SymbolRow>,
    pub frames: Vec<CallchainFrameRow>,
    pub samples: Vec<SampleRow>,
    pub markers: Vec<TimelineMarker>,
}

impl MemoryRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread(mut self, thread_id: i64, process_id: i64, name: &str) -> Self {
        self.threads.push(ThreadRow {
            thread_id,
            process_id,
            name: Some(name.to_string()),
        });
        self
    }

    pub fn with_file(mut self, file_id: i64, path: &str) -> Self {
        self.files.push(FileRow {
            file_id,
            path: path.to_string(),
        });
        self
    }

    pub fn with_symbol(mut self, symbol_id: i64, text: &str) -> Self {
        self.symbols.push(SymbolRow {
            symbol_id,
            text: text.to_string(),
        });
        self
    }

    /// Add a chain given leaf first as `(file_id, symbol_id)` pairs
    pub fn with_callchain(mut self, callchain_id: i64, frames: &[(i64, i64)]) -> Self {
        let depth_max = frames.len() as i64 - 1;
        for (i, &(file_id, symbol_id)) in frames.iter().enumerate() {
            self.frames.push(CallchainFrameRow {
                callchain_id,
                depth: depth_max - i as i64,
                file_id,
                symbol_id,
            });
        }
        self
    }

    pub fn with_sample(
        mut self,
        callchain_id: i64,
        thread_id: i64,
        event_count: u64,
        event_name: &str,
        timestamp: i64,
    ) -> Self {
        let id = self.samples.len() as i64;
        self.samples.push(SampleRow {
            id,
            callchain_id,
            timestamp,
            thread_id,
            event_count,
            event_name: event_name.to_string(),
        });
        self
    }

    pub fn with_marker(mut self, name: &str, ts: i64, dur: i64) -> Self {
        self.markers.push(TimelineMarker {
            name: name.to_string(),
            ts,
            dur,
        });
        self
    }
}

impl RowSource for MemoryRowSource {
    fn threads(&self) -> Result<Vec<ThreadRow>> {
        Ok(self.threads.clone())
    }

    fn files(&self) -> Result<Vec<FileRow>> {
        Ok(self.files.clone())
    }

    fn symbols(&self) -> Result<Vec<SymbolRow>> {
        Ok(self.symbols.clone())
    }

    fn callchain_frames(&self) -> Result<Vec<CallchainFrameRow>> {
        let mut frames = self.frames.clone();
        frames.sort_by(|a, b| {
            a.callchain_id
                .cmp(&b.callchain_id)
                .then(b.depth.cmp(&a.depth))
        });
        Ok(frames)
    }

    fn samples(&self) -> Result<Vec<SampleRow>> {
        Ok(self.samples.clone())
    }

    fn timeline_markers(&self) -> Result<Vec<TimelineMarker>> {
        let mut markers = self.markers.clone();
        markers.sort_by_key(|m| m.ts);
        Ok(markers)
    }

    fn sample_time_range(&self) -> Result<Option<(i64, i64)>> {
        let min = self.samples.iter().map(|s| s.timestamp).min();
        let max = self.samples.iter().map(|s| s.timestamp).max();
        Ok(min.zip(max))
    }

    fn event_total(&self, event_type: EventType) -> Result<u64> {
        Ok(self
            .samples
            .iter()
            .filter(|s| EventType::from_event_name(&s.event_name) == Some(event_type))
            .map(|s| s.event_count)
            .sum())
    }
}
