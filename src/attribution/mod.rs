// Self/total load attribution
//
// A sample's event count is charged exactly once as "self" load, to the
// first frame above the leaf that is not pure runtime infrastructure, and
// once as "total" load to the first frame of each further component
// category on the way to the root. Self load is conserved: per event type
// the self counts of all records sum to the event counts of the
// in-window samples.
//
// Callchains are disassembled once per distinct chain at load time;
// per-sample work is a table lookup plus one charge per attribution point.

mod aggregator;
mod callchain;
mod thread;

pub use aggregator::{
    AttributedRecord, Counts, EventType, IngestOutcome, RecordKey, SampleAggregator, SampleRow,
    CYCLES_EVENTS, INSTRUCTION_EVENTS,
};
pub use callchain::{
    self_event_index, total_event_indices, CallFrame, Callchain, PURE_COMPUTE_FILES,
};
pub use thread::{PerfThread, ThreadTable};

#[cfg(test)]
mod tests;
