use crate::category::{Classification, UNKNOWN_STR};
use crate::classify::ClassificationRules;
use fnv::FnvHashMap;

/// A thread of the capture; process roots have `thread_id == process_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfThread {
    pub thread_id: i64,
    pub process_id: i64,
    pub name: String,
    /// Thread-level override for every record charged to this thread
    pub classification: Option<Classification>,
}

impl PerfThread {
    pub fn unknown(thread_id: i64, process_id: i64) -> Self {
        Self {
            thread_id,
            process_id,
            name: UNKNOWN_STR.to_string(),
            classification: None,
        }
    }
}

/// Threads of one database load, keyed by thread id
#[derive(Debug, Default)]
pub struct ThreadTable {
    threads: FnvHashMap<i64, PerfThread>,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a thread, resolving its thread-level classification
    pub fn insert(&mut self, thread_id: i64, process_id: i64, name: Option<&str>, rules: &ClassificationRules) {
        let thread = PerfThread {
            thread_id,
            process_id,
            name: name.filter(|n| !n.is_empty()).unwrap_or(UNKNOWN_STR).to_string(),
            classification: rules.classify_thread(name),
        };
        self.threads.insert(thread_id, thread);
    }

    pub fn get(&self, thread_id: i64) -> Option<&PerfThread> {
        self.threads.get(&thread_id)
    }

    /// Thread and owning process of `thread_id`
    ///
    /// Threads or processes missing from the capture are synthesized as
    /// UNKNOWN entries so their samples are still attributed.
    pub fn resolve(&mut self, thread_id: i64) -> (&PerfThread, &PerfThread) {
        let process_id = self
            .threads
            .entry(thread_id)
            .or_insert_with(|| {
                tracing::debug!("Thread {} not in capture, synthesizing UNKNOWN", thread_id);
                PerfThread::unknown(thread_id, thread_id)
            })
            .process_id;
        self.threads
            .entry(process_id)
            .or_insert_with(|| PerfThread::unknown(process_id, process_id));

        (&self.threads[&thread_id], &self.threads[&process_id])
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn clear(&mut self) {
        self.threads.clear();
    }
}
