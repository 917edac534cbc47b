use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters for a measurable ingest entity, a pipeline or a single processor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsRecord {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub current: i64,
    #[serde(default)]
    pub failed: i64,
    #[serde(default)]
    pub time_in_millis: i64,
}

impl StatsRecord {
    /// Element-wise `self - baseline` for `count`, `failed` and `time_in_millis`.
    ///
    /// `current` is a gauge rather than a counter, so the latest value is kept.
    pub fn delta_since(&self, baseline: &StatsRecord) -> StatsRecord {
        StatsRecord {
            count: self.count - baseline.count,
            current: self.current,
            failed: self.failed - baseline.failed,
            time_in_millis: self.time_in_millis - baseline.time_in_millis,
        }
    }
}

/// Stats for one processor of a pipeline, in the order the processors are declared.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessorStats {
    #[serde(rename = "type")]
    pub processor_type: String,
    /// Extra part of a compound processor identifier, `compound:[extra]`.
    #[serde(default)]
    pub extra: String,
    #[serde(default)]
    pub conditional: bool,
    pub stats: StatsRecord,
}

/// Stats for one pipeline, the totals plus one entry per declared processor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineStats {
    #[serde(flatten)]
    pub stats: StatsRecord,
    #[serde(default)]
    pub processors: Vec<ProcessorStats>,
}

/// Pipeline name to pipeline stats, for a single node.
pub type PipelineStatsMap = BTreeMap<String, PipelineStats>;

/// Node id to the pipeline stats observed on that node.
pub type NodePipelineStats = BTreeMap<String, PipelineStatsMap>;

/// Cluster-wide node-level resource stats.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodesStats {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeStats>,
}

/// The subset of node stats that is sampled during a benchmark.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeStats {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub jvm: JvmStats,
    #[serde(default)]
    pub os: OsStats,
    #[serde(default)]
    pub process: ProcessStats,
    #[serde(default)]
    pub ingest: IngestTotals,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JvmStats {
    #[serde(default)]
    pub mem: JvmMemStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JvmMemStats {
    #[serde(default)]
    pub heap_used_in_bytes: u64,
    #[serde(default)]
    pub heap_used_percent: u64,
    #[serde(default)]
    pub heap_max_in_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OsStats {
    #[serde(default)]
    pub cpu: CpuStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessStats {
    #[serde(default)]
    pub cpu: CpuStats,
    #[serde(default)]
    pub open_file_descriptors: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CpuStats {
    #[serde(default)]
    pub percent: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestTotals {
    #[serde(default)]
    pub total: StatsRecord,
}

/// Stats for a single data stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataStreamStats {
    pub data_stream: String,
    #[serde(default)]
    pub backing_indices: u64,
    #[serde(default)]
    pub store_size_bytes: u64,
    #[serde(default)]
    pub maximum_timestamp: i64,
}

/// Disk usage of one index, as reported for all of its fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskUsage {
    #[serde(default)]
    pub all_fields: FieldsDiskUsage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldsDiskUsage {
    #[serde(default)]
    pub total_in_bytes: u64,
    #[serde(default)]
    pub inverted_index: InvertedIndexUsage,
    #[serde(default)]
    pub stored_fields_in_bytes: u64,
    #[serde(default)]
    pub doc_values_in_bytes: u64,
    #[serde(default)]
    pub points_in_bytes: u64,
    #[serde(default)]
    pub norms_in_bytes: u64,
    #[serde(default)]
    pub term_vectors_in_bytes: u64,
    #[serde(default)]
    pub knn_vectors_in_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvertedIndexUsage {
    #[serde(default)]
    pub total_in_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_subtracts_counters_and_keeps_current() {
        let start = StatsRecord {
            count: 10,
            current: 3,
            failed: 1,
            time_in_millis: 100,
        };
        let end = StatsRecord {
            count: 110,
            current: 0,
            failed: 4,
            time_in_millis: 350,
        };

        assert_eq!(
            end.delta_since(&start),
            StatsRecord {
                count: 100,
                current: 0,
                failed: 3,
                time_in_millis: 250,
            }
        );
    }

    #[test]
    fn pipeline_stats_flatten_totals() {
        let stats: PipelineStats = serde_json::from_value(serde_json::json!({
            "count": 5,
            "time_in_millis": 12,
            "processors": [
                { "type": "set", "stats": { "count": 5, "time_in_millis": 2 } }
            ]
        }))
        .unwrap();

        assert_eq!(stats.stats.count, 5);
        assert_eq!(stats.stats.failed, 0);
        assert_eq!(stats.processors[0].processor_type, "set");
        assert_eq!(stats.processors[0].stats.time_in_millis, 2);
    }
}
