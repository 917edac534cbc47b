use std::fmt::Display;

use ingest_bench_summary_model::{BenchmarkValue, ProcessorStats, StatsRecord};
use tabled::Tabled;

#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    pub fn new(field: impl Into<String>, value: impl Display) -> Self {
        Self {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

#[derive(Tabled)]
pub struct RankRow {
    #[tabled(rename = "#")]
    pub rank: usize,
    #[tabled(rename = "Processor")]
    pub processor: String,
    #[tabled(rename = "Value")]
    pub value: BenchmarkValue,
}

impl RankRow {
    pub fn ranked(values: &[BenchmarkValue]) -> Vec<Self> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| Self {
                rank: i + 1,
                processor: value.name.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

#[derive(Tabled)]
pub struct PipelineRow {
    #[tabled(rename = "Pipeline")]
    pub pipeline: String,
    #[tabled(rename = "Count")]
    pub count: i64,
    #[tabled(rename = "Failed")]
    pub failed: i64,
    #[tabled(rename = "Time (ms)")]
    pub time_ms: i64,
    #[tabled(rename = "Avg (ms)", display = "float2")]
    pub avg_time_ms: f64,
}

impl PipelineRow {
    pub fn new(pipeline: &str, stats: &StatsRecord) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            count: stats.count,
            failed: stats.failed,
            time_ms: stats.time_in_millis,
            avg_time_ms: average(stats),
        }
    }
}

#[derive(Tabled)]
pub struct ProcessorRow {
    #[tabled(rename = "#")]
    pub position: usize,
    #[tabled(rename = "Processor")]
    pub processor: String,
    #[tabled(rename = "Conditional")]
    pub conditional: bool,
    #[tabled(rename = "Count")]
    pub count: i64,
    #[tabled(rename = "Failed")]
    pub failed: i64,
    #[tabled(rename = "Time (ms)")]
    pub time_ms: i64,
    #[tabled(rename = "Avg (ms)", display = "float2")]
    pub avg_time_ms: f64,
}

impl ProcessorRow {
    pub fn new(position: usize, processor: &ProcessorStats) -> Self {
        let name = if processor.extra.is_empty() {
            processor.processor_type.clone()
        } else {
            format!("{}:{}", processor.processor_type, processor.extra)
        };

        Self {
            position,
            processor: name,
            conditional: processor.conditional,
            count: processor.stats.count,
            failed: processor.stats.failed,
            time_ms: processor.stats.time_in_millis,
            avg_time_ms: average(&processor.stats),
        }
    }
}

fn average(stats: &StatsRecord) -> f64 {
    if stats.count == 0 {
        return 0.0;
    }
    stats.time_in_millis as f64 / stats.count as f64
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}
