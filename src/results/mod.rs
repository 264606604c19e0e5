//! Result collection: sinks accumulate detections during a scan and finalize
//! into an immutable [`ScanResults`] aggregate.

mod aggregate;
mod sink;

pub use aggregate::{ArchetypeHits, ScanResults};
pub use sink::{DefaultSink, ResultSink, SplittingSink};
