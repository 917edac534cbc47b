use async_trait::async_trait;
use ingest_bench_summary_model::{DataStreamStats, DiskUsage, NodePipelineStats, NodesStats};
use std::collections::BTreeMap;

/// The stats and maintenance operations consumed from the cluster under test.
#[async_trait]
pub trait IngestStats: Send + Sync {
    /// Per-node stats for every pipeline whose name starts with `prefix`.
    async fn pipeline_stats_by_prefix(&self, prefix: &str) -> anyhow::Result<NodePipelineStats>;

    async fn nodes_stats(&self) -> anyhow::Result<NodesStats>;

    /// `Ok(None)` while the data stream does not exist yet.
    async fn data_stream_stats(&self, data_stream: &str)
        -> anyhow::Result<Option<DataStreamStats>>;

    /// Disk usage of every backing index of the data stream, keyed by index name.
    async fn disk_usage(&self, data_stream: &str) -> anyhow::Result<BTreeMap<String, DiskUsage>>;

    /// Delete every document in the data stream.
    async fn delete_by_query(&self, data_stream: &str) -> anyhow::Result<()>;

    /// Total number of documents currently searchable in the data stream.
    async fn count_docs(&self, data_stream: &str) -> anyhow::Result<u64>;
}

/// An optional external store for the samples taken during a run.
///
/// Failures are never fatal for a benchmark, callers log them and carry on.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn create_index(&self, name: &str, body: &serde_json::Value) -> anyhow::Result<()>;

    async fn index_document(&self, name: &str, body: &serde_json::Value) -> anyhow::Result<()>;
}
