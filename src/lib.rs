//! Loadscope - component load attribution for sampled CPU captures
//!
//! This library attributes hardware-counter samples (cycles, retired
//! instructions) of scripted scenario captures to software components,
//! picks a representative round per step and assembles a normalized report.

pub mod analyzer;
pub mod attribution;
pub mod category;
pub mod classify;
pub mod cli;
pub mod config;
pub mod converter;
pub mod csv_output;
pub mod error;
pub mod json_output;
pub mod perf_db;
pub mod pipeline;
pub mod report;
pub mod round_selection;
pub mod row_source;
pub mod scenario;
pub mod step_window;
