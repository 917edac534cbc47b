//! Decoding of the raw `_nodes/stats` ingest section into [NodePipelineStats].
//!
//! Implementations of [crate::IngestStats] that talk to a real cluster receive processors in the
//! wrapped form `{ "processor_type": { "type": ..., "stats": {...} } }`, where a compound
//! processor is reported as `compound:extra`.

use anyhow::Context;
use ingest_bench_summary_model::{
    NodePipelineStats, PipelineStats, PipelineStatsMap, ProcessorStats, StatsRecord,
};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize)]
struct NodesStatsResponse {
    #[serde(default)]
    nodes: BTreeMap<String, NodeIngest>,
}

#[derive(Deserialize)]
struct NodeIngest {
    #[serde(default)]
    ingest: IngestSection,
}

#[derive(Deserialize, Default)]
struct IngestSection {
    #[serde(default)]
    pipelines: BTreeMap<String, RawPipelineStats>,
}

#[derive(Deserialize)]
struct RawPipelineStats {
    #[serde(flatten)]
    stats: StatsRecord,
    #[serde(default)]
    processors: Vec<BTreeMap<String, ProcessorStats>>,
}

/// Decode a node stats response body, keeping only pipelines whose name starts with `prefix`.
pub fn parse_pipeline_stats(body: &[u8], prefix: &str) -> anyhow::Result<NodePipelineStats> {
    let response: NodesStatsResponse =
        serde_json::from_slice(body).context("Error decoding node stats response")?;

    let mut result = NodePipelineStats::new();
    for (node, node_stats) in response.nodes {
        let mut pipelines = PipelineStatsMap::new();
        for (name, raw) in node_stats.ingest.pipelines {
            if !name.starts_with(prefix) {
                continue;
            }

            let processors = raw
                .processors
                .into_iter()
                .enumerate()
                .map(|(idx, wrapped)| {
                    extract_processor(wrapped)
                        .with_context(|| format!("Extracting processor {idx} of pipeline {name}"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            pipelines.insert(
                name,
                PipelineStats {
                    stats: raw.stats,
                    processors,
                },
            );
        }
        result.insert(node, pipelines);
    }

    Ok(result)
}

fn extract_processor(wrapped: BTreeMap<String, ProcessorStats>) -> anyhow::Result<ProcessorStats> {
    if wrapped.len() != 1 {
        anyhow::bail!(
            "Need a single key in the processor identifier, got {}: {:?}",
            wrapped.len(),
            wrapped.keys().collect::<Vec<_>>()
        );
    }

    let Some((identifier, mut stats)) = wrapped.into_iter().next() else {
        anyhow::bail!("Empty processor identifier");
    };

    let (processor_type, extra) = match identifier.split_once(':') {
        Some((processor_type, extra)) => (processor_type.to_string(), extra.to_string()),
        None => (identifier.clone(), String::new()),
    };

    if stats.processor_type == "conditional" {
        stats.conditional = true;
    } else if stats.processor_type != processor_type {
        anyhow::bail!(
            "Can't understand processor identifier '{identifier}' reported as type '{}'",
            stats.processor_type
        );
    }

    stats.processor_type = processor_type;
    stats.extra = extra;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_wrapped_processors_and_filters_by_prefix() {
        let body = serde_json::json!({
            "nodes": {
                "n1": {
                    "ingest": {
                        "pipelines": {
                            "logs-nginx.access-1.2.0": {
                                "count": 10,
                                "failed": 1,
                                "time_in_millis": 30,
                                "processors": [
                                    { "set": { "type": "set", "stats": { "count": 10, "time_in_millis": 5 } } },
                                    { "compound:grok": { "type": "conditional", "stats": { "count": 10, "time_in_millis": 20 } } }
                                ]
                            },
                            "other-pipeline": { "count": 99, "processors": [] }
                        }
                    }
                }
            }
        });

        let stats = parse_pipeline_stats(
            serde_json::to_vec(&body).unwrap().as_slice(),
            "logs-nginx.access-1.2.0",
        )
        .unwrap();

        let node = &stats["n1"];
        assert_eq!(node.len(), 1);
        let pipeline = &node["logs-nginx.access-1.2.0"];
        assert_eq!(pipeline.stats.count, 10);
        assert_eq!(pipeline.stats.failed, 1);
        assert_eq!(pipeline.processors[0].processor_type, "set");
        assert!(!pipeline.processors[0].conditional);
        assert_eq!(pipeline.processors[1].processor_type, "compound");
        assert_eq!(pipeline.processors[1].extra, "grok");
        assert!(pipeline.processors[1].conditional);
    }

    #[test]
    fn rejects_mismatched_identifier() {
        let body = br#"{"nodes":{"n1":{"ingest":{"pipelines":{"p":{"processors":[{"set":{"type":"grok","stats":{}}}]}}}}}}"#;

        let err = parse_pipeline_stats(body, "p").unwrap_err();
        assert!(format!("{err:#}").contains("Can't understand processor identifier"));
    }

    #[test]
    fn rejects_multi_key_processor() {
        let body = br#"{"nodes":{"n1":{"ingest":{"pipelines":{"p":{"processors":[{"set":{"type":"set","stats":{}},"grok":{"type":"grok","stats":{}}}]}}}}}}"#;

        let err = parse_pipeline_stats(body, "p").unwrap_err();
        assert!(format!("{err:#}").contains("Need a single key"));
    }
}
