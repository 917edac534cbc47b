mod aggregate;
mod api;
mod collector;
mod node_stats;
mod source;
mod summarize;

pub use aggregate::{
    aggregate, as_duration, as_percentage_of, by_absolute_time, by_relative_time, descending,
    non_zero, processor_key, rank_processors, total_pipeline_time, Aggregation, AggregationError,
    ProcessorPerformance, ProcessorRankings,
};
pub use api::{IngestStats, MetricsSink};
pub use collector::{
    CollectorConfig, CollectorState, MetricsCollector, MetricsSample, MetricsSummary,
};
pub use node_stats::parse_pipeline_stats;
pub use source::{load_pipeline_sources, PipelineFormat, PipelineSource, Processor};
pub use summarize::{pipeline_stats_delta, SummaryError};
