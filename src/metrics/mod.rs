//! Per-closer performance counters folded from booking and attendee history.
//!
//! Read-only: the fold runs over owned snapshots and never blocks bookings.

pub mod aggregator;
pub mod ranking;

pub use aggregator::{
    CloserCounters, CloserMetricRow, CloserMetricsAggregator, CloserMetricsReport, MetricsInput,
    TeamAverages,
};
pub use ranking::{CloserRanks, RankingMetric};
