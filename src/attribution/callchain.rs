// Callchain load disassembly
//
// Decides, once per distinct callchain, which frame absorbs a sample as
// "self" load and which frames absorb it as "total" load.

use crate::category::{ComponentCategory, FileClassification};
use std::collections::HashSet;

/// Interpreter, runtime and kernel artifacts that never absorb self load
pub const PURE_COMPUTE_FILES: [&str; 9] = [
    "/system/lib64/module/arkcompiler/stub.an",
    "/system/lib64/platformsdk/libark_jsruntime.so",
    "/system/lib64/platformsdk/libace_napi.z.so",
    "/system/lib64/libark_jsoptimizer.so",
    "/system/lib64/libc++.so",
    "/system/lib/ld-musl-aarch64.so.1",
    "/system/etc/abc/framework/stateMgmt.abc",
    "sysmgr.elf",
    "[kernel.kallsyms]",
];

/// One stack entry with its resolved classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub depth: i64,
    pub file_id: i64,
    pub symbol_id: i64,
    pub classification: FileClassification,
}

impl CallFrame {
    /// Frame charged when a sample has no usable stack
    pub fn unknown() -> Self {
        Self {
            depth: 0,
            file_id: -1,
            symbol_id: -1,
            classification: FileClassification::unknown(),
        }
    }

    /// Pure infrastructure or unclassifiable: skipped when looking for the self frame
    pub fn is_pure_compute(&self) -> bool {
        self.classification.category == ComponentCategory::Unknown
            || PURE_COMPUTE_FILES.contains(&self.classification.file.as_str())
    }

    pub fn category(&self) -> ComponentCategory {
        self.classification.category
    }
}

/// First frame from the leaf that is not pure compute; the leaf if there is none
pub fn self_event_index(frames: &[CallFrame]) -> usize {
    frames
        .iter()
        .position(|f| !f.is_pure_compute())
        .unwrap_or(0)
}

/// First frame of every not-yet-seen category above the self frame
///
/// The self frame's category counts as seen. Empty for an empty stack.
pub fn total_event_indices(frames: &[CallFrame], self_index: usize) -> Vec<usize> {
    let Some(self_frame) = frames.get(self_index) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    seen.insert(self_frame.category());

    frames
        .iter()
        .enumerate()
        .skip(self_index + 1)
        .filter(|(_, frame)| seen.insert(frame.category()))
        .map(|(i, _)| i)
        .collect()
}

/// A sampled stack, leaf first, with its self/total attribution points
#[derive(Debug, Clone)]
pub struct Callchain {
    pub id: i64,
    frames: Vec<CallFrame>,
    self_index: usize,
    total_indices: Vec<usize>,
}

impl Callchain {
    /// Build and attribute a chain; frames are ordered by descending depth first
    pub fn new(id: i64, mut frames: Vec<CallFrame>) -> Self {
        frames.sort_by(|a, b| b.depth.cmp(&a.depth));
        let mut chain = Self {
            id,
            frames,
            self_index: 0,
            total_indices: Vec::new(),
        };
        chain.attribute();
        chain
    }

    /// Single UNKNOWN frame, used for samples referencing a chain that was never loaded
    pub fn placeholder(id: i64) -> Self {
        Self::new(id, vec![CallFrame::unknown()])
    }

    fn attribute(&mut self) {
        self.self_index = self_event_index(&self.frames);
        self.total_indices = total_event_indices(&self.frames, self.self_index);
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn self_index(&self) -> usize {
        self.self_index
    }

    pub fn total_indices(&self) -> &[usize] {
        &self.total_indices
    }

    /// `None` only for an empty chain
    pub fn self_frame(&self) -> Option<&CallFrame> {
        self.frames.get(self.self_index)
    }

    pub fn total_frames(&self) -> impl Iterator<Item = &CallFrame> {
        self.total_indices.iter().filter_map(|&i| self.frames.get(i))
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
