mod engine;
mod fetch;
mod merge;
mod normalize;
mod sink;
mod years;

pub use engine::{SessionState, SyncEngine, WeightRecordStream};
pub use fetch::{year_bounds, BoundedFetchScheduler, YearPage};
pub use merge::MergeAccumulator;
pub use normalize::normalize;
pub use sink::{persistence_channel, MergeAndPersistSink, PersistenceHandle, SinkReport, SinkSender};
pub use years::{year_range, YearRangeResolver};
