//! Step time windows from timeline markers
//!
//! The test driver emits a begin and an end marker around every scripted
//! step. Samples are charged to a step only when their timestamp falls in
//! one of its windows.

use crate::row_source::TimelineMarker;
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` interval of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepWindow {
    /// Sequential window id within one database
    pub step_id: u32,
    /// Scenario step the database belongs to
    pub group_id: u32,
    pub name: String,
    pub start: i64,
    pub end: i64,
}

impl StepWindow {
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// Step name carried by a begin marker: text after the last `&`, else after the last `#`
pub fn marker_step_name(marker: &str) -> &str {
    marker
        .rfind('&')
        .or_else(|| marker.rfind('#'))
        .map_or(marker, |i| &marker[i + 1..])
}

/// Windows of one database
///
/// Markers are taken in `(begin, end)` pairs in timestamp order; a trailing
/// unpaired marker is ignored. Without at least one pair a single window
/// covers every sample (`sample_range` is the inclusive min/max timestamp),
/// or everything when there are no samples.
pub fn resolve_step_windows(
    markers: &[TimelineMarker],
    group_id: u32,
    sample_range: Option<(i64, i64)>,
) -> Vec<StepWindow> {
    if markers.len() < 2 {
        let (start, end) = match sample_range {
            Some((min, max)) => (min, max.saturating_add(1)),
            None => (0, i64::MAX),
        };
        return vec![StepWindow {
            step_id: 0,
            group_id,
            name: String::new(),
            start,
            end,
        }];
    }

    markers
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let (begin, end) = (&pair[0], &pair[1]);
            StepWindow {
                step_id: i as u32,
                group_id,
                name: marker_step_name(&begin.name).to_string(),
                start: begin.ts.saturating_add(begin.dur),
                end: end.ts,
            }
        })
        .collect()
}

/// Group id of the first window containing `timestamp`
pub fn step_for_timestamp(windows: &[StepWindow], timestamp: i64) -> Option<u32> {
    windows
        .iter()
        .find(|w| w.contains(timestamp))
        .map(|w| w.group_id)
}
