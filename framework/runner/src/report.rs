mod tables;

use std::path::{Path, PathBuf};

use anyhow::Context;
use ingest_bench_instruments::{MetricsSummary, ProcessorRankings};
use indicatif::DecimalBytes;
use ingest_bench_summary_model::{report_to_json, BenchReport, RunInfo, ScenarioParameters};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::report::tables::{FieldRow, PipelineRow, ProcessorRow, RankRow};

/// File name of the structured report, under `<output>/system/<run id>/`.
pub const REPORT_FILE: &str = "report.json";

/// Combine the run identity, the scenario parameters and the measured results into a report.
///
/// The collection window of `summary` becomes the start, end and duration of the run.
pub fn build_report(
    info: RunInfo,
    parameters: ScenarioParameters,
    summary: &MetricsSummary,
    rankings: ProcessorRankings,
) -> BenchReport {
    BenchReport {
        info: RunInfo {
            start_ts: summary.collection_start_ts,
            end_ts: summary.collection_end_ts,
            duration_secs: summary.collection_end_ts - summary.collection_start_ts,
            ..info
        },
        parameters,
        cluster_name: summary.cluster_name.clone(),
        nodes: summary.nodes,
        data_stream_stats: summary.data_stream_stats.clone(),
        total_hits: summary.total_hits,
        disk_usage: summary.disk_usage.clone(),
        ingest_pipeline_stats: summary.ingest_pipeline_stats.clone(),
        top_processors_by_total_time: rankings.by_total_time,
        top_processors_by_avg_time: rankings.by_avg_time,
        ingest_bench_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Write the structured report of a run and return its path.
pub fn write_report(report: &BenchReport, output_dir: &Path) -> anyhow::Result<PathBuf> {
    let dir = output_dir.join("system").join(&report.info.run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

    let path = dir.join(REPORT_FILE);
    let content = report_to_json(report)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(path)
}

/// Render the report as a sequence of titled tables.
pub fn render_human(report: &BenchReport) -> String {
    let mut out = String::new();

    section(&mut out, "Info", info_rows(&report.info));
    section(&mut out, "Parameters", parameter_rows(&report.parameters));
    section(
        &mut out,
        "Cluster info",
        vec![
            FieldRow::new("cluster name", &report.cluster_name),
            FieldRow::new("nodes", report.nodes),
        ],
    );

    let mut data_stream_rows = Vec::new();
    if let Some(stats) = &report.data_stream_stats {
        data_stream_rows.push(FieldRow::new("data stream", &stats.data_stream));
        data_stream_rows.push(FieldRow::new("backing indices", stats.backing_indices));
        data_stream_rows.push(FieldRow::new("store size bytes", stats.store_size_bytes));
        data_stream_rows.push(FieldRow::new("maximum ts", stats.maximum_timestamp));
    }
    data_stream_rows.push(FieldRow::new("total hits", report.total_hits));
    section(&mut out, "Data stream stats", data_stream_rows);

    for (index, usage) in &report.disk_usage {
        let fields = &usage.all_fields;
        section(
            &mut out,
            &format!("Disk usage for index {index} (for all fields)"),
            vec![
                FieldRow::new("total", DecimalBytes(fields.total_in_bytes)),
                FieldRow::new(
                    "inverted_index.total",
                    DecimalBytes(fields.inverted_index.total_in_bytes),
                ),
                FieldRow::new("stored_fields", DecimalBytes(fields.stored_fields_in_bytes)),
                FieldRow::new("doc_values", DecimalBytes(fields.doc_values_in_bytes)),
                FieldRow::new("points", DecimalBytes(fields.points_in_bytes)),
                FieldRow::new("norms", DecimalBytes(fields.norms_in_bytes)),
                FieldRow::new("term_vectors", DecimalBytes(fields.term_vectors_in_bytes)),
                FieldRow::new("knn_vectors", DecimalBytes(fields.knn_vectors_in_bytes)),
            ],
        );
    }

    section(
        &mut out,
        &format!(
            "Top {} processors by total time",
            report.top_processors_by_total_time.len()
        ),
        RankRow::ranked(&report.top_processors_by_total_time),
    );
    section(
        &mut out,
        &format!(
            "Top {} processors by average time per document",
            report.top_processors_by_avg_time.len()
        ),
        RankRow::ranked(&report.top_processors_by_avg_time),
    );

    for (node, pipelines) in &report.ingest_pipeline_stats {
        section(
            &mut out,
            &format!("Pipelines stats in node {node}"),
            pipelines
                .iter()
                .map(|(name, stats)| PipelineRow::new(name, &stats.stats))
                .collect(),
        );

        for (name, stats) in pipelines {
            if stats.processors.is_empty() {
                continue;
            }
            section(
                &mut out,
                &format!("{name} processors in node {node}"),
                stats
                    .processors
                    .iter()
                    .enumerate()
                    .map(|(i, processor)| ProcessorRow::new(i, processor))
                    .collect(),
            );
        }
    }

    out
}

fn section<R: Tabled>(out: &mut String, title: &str, rows: Vec<R>) {
    if rows.is_empty() {
        return;
    }

    let mut table = Table::new(&rows);
    table.with(Style::modern());

    out.push_str(title);
    out.push('\n');
    out.push_str(&table.to_string());
    out.push_str("\n\n");
}

fn info_rows(info: &RunInfo) -> Vec<FieldRow> {
    let mut rows = vec![
        FieldRow::new("benchmark", &info.benchmark),
        FieldRow::new("description", &info.description),
        FieldRow::new("run ID", &info.run_id),
        FieldRow::new("package", &info.package),
        FieldRow::new("start ts (s)", info.start_ts),
        FieldRow::new("end ts (s)", info.end_ts),
        FieldRow::new(
            "duration",
            humantime::format_duration(std::time::Duration::from_secs(
                info.duration_secs.max(0) as u64,
            )),
        ),
    ];
    if !info.generated_corpora_file.is_empty() {
        rows.push(FieldRow::new(
            "generated corpora file",
            &info.generated_corpora_file,
        ));
    }
    rows
}

fn parameter_rows(parameters: &ScenarioParameters) -> Vec<FieldRow> {
    let mut rows = vec![
        FieldRow::new("package version", &parameters.package_version),
        FieldRow::new("input", &parameters.input),
    ];
    rows.extend(
        parameters
            .vars
            .iter()
            .map(|(name, value)| FieldRow::new(format!("vars.{name}"), value)),
    );
    rows.push(FieldRow::new("data_stream.name", &parameters.data_stream.name));
    rows.extend(
        parameters
            .data_stream
            .vars
            .iter()
            .map(|(name, value)| FieldRow::new(format!("data_stream.vars.{name}"), value)),
    );
    rows.push(FieldRow::new(
        "warmup time period",
        format!("{}s", parameters.warmup_time_period_secs),
    ));
    if let Some(period) = parameters.benchmark_time_period_secs {
        rows.push(FieldRow::new("benchmark time period", format!("{period}s")));
    }
    rows.push(FieldRow::new(
        "wait for data timeout",
        format!("{}s", parameters.wait_for_data_timeout_secs),
    ));

    if let Some(generator) = &parameters.corpora.generator {
        if let Some(total_events) = generator.total_events {
            rows.push(FieldRow::new("corpora.generator.total_events", total_events));
        }
        if let Some(size) = &generator.size {
            rows.push(FieldRow::new("corpora.generator.size", size));
        }
        rows.push(FieldRow::new(
            "corpora.generator.template.type",
            &generator.template_type,
        ));
        for (name, path) in [
            ("corpora.generator.template.path", &generator.template_path),
            ("corpora.generator.config.path", &generator.config_path),
            ("corpora.generator.fields.path", &generator.fields_path),
        ] {
            if let Some(path) = path {
                rows.push(FieldRow::new(name, path));
            }
        }
    }
    if let Some(service) = &parameters.corpora.input_service {
        rows.push(FieldRow::new("corpora.input_service.name", &service.name));
        if let Some(signal) = &service.signal {
            rows.push(FieldRow::new("corpora.input_service.signal", signal));
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_bench_summary_model::{
        load_report, BenchmarkValue, DataStreamParameters, DataStreamStats, DiskUsage,
        FieldsDiskUsage, NodePipelineStats, PipelineStats, PipelineStatsMap, ProcessorStats,
        StatsRecord,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn summary() -> MetricsSummary {
        MetricsSummary {
            cluster_name: "bench".to_string(),
            nodes: 1,
            run_id: "12345".to_string(),
            collection_start_ts: 1_700_000_000,
            collection_end_ts: 1_700_000_042,
            data_stream_stats: Some(DataStreamStats {
                data_stream: "logs-nginx.access-ep".to_string(),
                backing_indices: 1,
                store_size_bytes: 4096,
                maximum_timestamp: 1_700_000_041_000,
            }),
            ingest_pipeline_stats: NodePipelineStats::from([(
                "node-1".to_string(),
                PipelineStatsMap::from([(
                    "logs-nginx.access-1.2.0".to_string(),
                    PipelineStats {
                        stats: StatsRecord {
                            count: 100,
                            time_in_millis: 80,
                            ..Default::default()
                        },
                        processors: vec![ProcessorStats {
                            processor_type: "grok".to_string(),
                            stats: StatsRecord {
                                count: 100,
                                time_in_millis: 50,
                                ..Default::default()
                            },
                            ..Default::default()
                        }],
                    },
                )]),
            )]),
            disk_usage: BTreeMap::from([(
                ".ds-logs-nginx.access-ep-000001".to_string(),
                DiskUsage {
                    all_fields: FieldsDiskUsage {
                        total_in_bytes: 1_500_000,
                        doc_values_in_bytes: 2_048,
                        ..Default::default()
                    },
                },
            )]),
            total_hits: 100,
            nodes_stats: BTreeMap::new(),
        }
    }

    fn rankings() -> ProcessorRankings {
        ProcessorRankings {
            by_total_time: vec![BenchmarkValue {
                name: "grok @ default.yml:2".to_string(),
                description: "grok @ default.yml:2".to_string(),
                unit: "%".to_string(),
                value: 62.5,
            }],
            by_avg_time: vec![BenchmarkValue {
                name: "grok @ default.yml:2".to_string(),
                description: "grok @ default.yml:2".to_string(),
                unit: "ms".to_string(),
                value: 0.5,
            }],
        }
    }

    fn report() -> BenchReport {
        build_report(
            RunInfo {
                benchmark: "access-benchmark".to_string(),
                run_id: "12345".to_string(),
                package: "nginx".to_string(),
                ..Default::default()
            },
            ScenarioParameters {
                package_version: "1.2.0".to_string(),
                input: "logfile".to_string(),
                data_stream: DataStreamParameters {
                    name: "access".to_string(),
                    vars: BTreeMap::from([(
                        "paths".to_string(),
                        serde_json::json!(["/tmp/service_logs/corpus-*"]),
                    )]),
                },
                wait_for_data_timeout_secs: 600,
                ..Default::default()
            },
            &summary(),
            rankings(),
        )
    }

    #[test]
    fn report_takes_window_from_summary() {
        let report = report();

        assert_eq!(report.info.start_ts, 1_700_000_000);
        assert_eq!(report.info.end_ts, 1_700_000_042);
        assert_eq!(report.info.duration_secs, 42);
        assert_eq!(report.info.benchmark, "access-benchmark");
        assert_eq!(report.total_hits, 100);
        assert_eq!(report.cluster_name, "bench");
        assert_eq!(report.top_processors_by_total_time.len(), 1);
        assert_eq!(report.ingest_bench_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn human_sections_in_order() {
        let human = render_human(&report());

        let positions = [
            "Info",
            "Parameters",
            "Cluster info",
            "Data stream stats",
            "Disk usage for index .ds-logs-nginx.access-ep-000001",
            "Top 1 processors by total time",
            "Top 1 processors by average time per document",
            "Pipelines stats in node node-1",
            "logs-nginx.access-1.2.0 processors in node node-1",
        ]
        .map(|title| {
            human
                .find(title)
                .unwrap_or_else(|| panic!("missing section {title}"))
        });

        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(human.contains("62.50%"));
        assert!(human.contains("0.50ms"));
        assert!(human.contains("data_stream.vars.paths"));
    }

    #[test]
    fn disk_usage_is_human_readable() {
        let report = report();
        let human = render_human(&report);

        assert!(human.contains("1.50 MB"));
        assert!(human.contains("2.05 kB"));
        assert!(!human.contains("1500000"));

        let json: serde_json::Value =
            serde_json::from_slice(&report_to_json(&report).unwrap()).unwrap();
        assert_eq!(
            json["disk_usage"][".ds-logs-nginx.access-ep-000001"]["all_fields"]["total_in_bytes"],
            1_500_000
        );
    }

    #[test]
    fn written_report_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let report = report();

        let path = write_report(&report, dir.path()).unwrap();

        assert_eq!(path, dir.path().join("system").join("12345").join("report.json"));
        let loaded = load_report(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
    }
}
