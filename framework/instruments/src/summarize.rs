use ingest_bench_summary_model::{NodePipelineStats, PipelineStats, PipelineStatsMap, ProcessorStats};

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("metrics collector has not been stopped")]
    NotStopped,
    #[error("metrics collector stopped before a baseline sample was captured")]
    NoBaseline,
    #[error(
        "pipeline '{pipeline}' on node '{node}' changed its processor count during the benchmark (start={start} end={end})"
    )]
    ProcessorCountChanged {
        node: String,
        pipeline: String,
        start: usize,
        end: usize,
    },
}

/// Per node and per pipeline difference `end - start`.
///
/// Nodes and pipelines that are absent from `start` are skipped.
pub fn pipeline_stats_delta(
    start: &NodePipelineStats,
    end: &NodePipelineStats,
) -> Result<NodePipelineStats, SummaryError> {
    let mut delta = NodePipelineStats::new();

    for (node, end_pipelines) in end {
        let Some(start_pipelines) = start.get(node) else {
            log::debug!("Node {node} not found in initial metrics");
            continue;
        };

        let mut node_delta = PipelineStatsMap::new();
        for (name, end_stats) in end_pipelines {
            let Some(start_stats) = start_pipelines.get(name) else {
                log::debug!("Pipeline {name} not found in initial metrics of node {node}");
                continue;
            };

            if start_stats.processors.len() != end_stats.processors.len() {
                return Err(SummaryError::ProcessorCountChanged {
                    node: node.clone(),
                    pipeline: name.clone(),
                    start: start_stats.processors.len(),
                    end: end_stats.processors.len(),
                });
            }

            let processors = end_stats
                .processors
                .iter()
                .zip(&start_stats.processors)
                .map(|(end_proc, start_proc)| ProcessorStats {
                    processor_type: end_proc.processor_type.clone(),
                    extra: end_proc.extra.clone(),
                    conditional: end_proc.conditional,
                    stats: end_proc.stats.delta_since(&start_proc.stats),
                })
                .collect();

            node_delta.insert(
                name.clone(),
                PipelineStats {
                    stats: end_stats.stats.delta_since(&start_stats.stats),
                    processors,
                },
            );
        }
        delta.insert(node.clone(), node_delta);
    }

    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_bench_summary_model::StatsRecord;
    use pretty_assertions::assert_eq;

    fn record(count: i64, failed: i64, time_in_millis: i64) -> StatsRecord {
        StatsRecord {
            count,
            failed,
            time_in_millis,
            ..Default::default()
        }
    }

    fn pipeline(total: StatsRecord, processors: &[StatsRecord]) -> PipelineStats {
        PipelineStats {
            stats: total,
            processors: processors
                .iter()
                .map(|stats| ProcessorStats {
                    processor_type: "set".to_string(),
                    stats: *stats,
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn node_stats(entries: &[(&str, &str, PipelineStats)]) -> NodePipelineStats {
        let mut result = NodePipelineStats::new();
        for (node, name, stats) in entries {
            result
                .entry(node.to_string())
                .or_default()
                .insert(name.to_string(), stats.clone());
        }
        result
    }

    #[test]
    fn delta_is_end_minus_start() {
        let start = node_stats(&[(
            "n1",
            "p",
            pipeline(record(10, 1, 100), &[record(10, 0, 40), record(10, 1, 60)]),
        )]);
        let end = node_stats(&[(
            "n1",
            "p",
            pipeline(record(110, 3, 300), &[record(110, 0, 90), record(110, 3, 210)]),
        )]);

        let delta = pipeline_stats_delta(&start, &end).unwrap();

        assert_eq!(
            delta,
            node_stats(&[(
                "n1",
                "p",
                pipeline(record(100, 2, 200), &[record(100, 0, 50), record(100, 2, 150)]),
            )])
        );
    }

    #[test]
    fn missing_nodes_and_pipelines_are_skipped() {
        let start = node_stats(&[("n1", "p", pipeline(record(1, 0, 1), &[]))]);
        let end = node_stats(&[
            ("n1", "p", pipeline(record(5, 0, 9), &[])),
            ("n1", "new-pipeline", pipeline(record(5, 0, 9), &[])),
            ("n2", "p", pipeline(record(5, 0, 9), &[])),
        ]);

        let delta = pipeline_stats_delta(&start, &end).unwrap();

        assert_eq!(delta.len(), 1);
        assert_eq!(delta["n1"].len(), 1);
        assert_eq!(delta["n1"]["p"].stats, record(4, 0, 8));
    }

    #[test]
    fn changed_processor_count_is_an_error() {
        let start = node_stats(&[("n1", "p", pipeline(record(1, 0, 1), &[record(1, 0, 1)]))]);
        let end = node_stats(&[("n1", "p", pipeline(record(2, 0, 2), &[]))]);

        assert!(matches!(
            pipeline_stats_delta(&start, &end),
            Err(SummaryError::ProcessorCountChanged { start: 1, end: 0, .. })
        ));
    }
}
