mod aggregator;

pub use aggregator::{ConnectionKey, ConnectionStats, StatsAggregator, StatsSnapshot};
