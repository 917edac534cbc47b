use crate::api::{IngestStats, MetricsSink};
use crate::summarize::{pipeline_stats_delta, SummaryError};
use ingest_bench_core::prelude::{sleep_or_shutdown, DelegatedShutdownListener, ShutdownHandle};
use ingest_bench_summary_model::{
    BenchmarkMetadata, DataStreamStats, DiskUsage, NodePipelineStats, NodeStats, NodesStats,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

const METRICS_INDEX_BODY: &str = include_str!("metrics_index.json");

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Time between two samples
    pub interval: Duration,
    pub data_stream: String,
    /// Only pipelines whose name starts with this prefix are measured
    pub pipeline_prefix: String,
    /// Delay between the data stream appearing and the baseline sample
    pub warmup: Duration,
    pub metadata: BenchmarkMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Sampling,
    Draining,
    Stopped,
}

/// A timestamped capture of node and data stream stats.
///
/// Either part is `None` when the corresponding stats call failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSample {
    /// Unix timestamp in seconds
    pub ts: i64,
    pub data_stream: Option<DataStreamStats>,
    pub nodes: Option<NodesStats>,
}

/// Reduction of the baseline and final captures of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub cluster_name: String,
    pub nodes: usize,
    pub run_id: String,
    pub collection_start_ts: i64,
    pub collection_end_ts: i64,
    pub data_stream_stats: Option<DataStreamStats>,
    pub ingest_pipeline_stats: NodePipelineStats,
    pub disk_usage: BTreeMap<String, DiskUsage>,
    pub total_hits: i64,
    pub nodes_stats: BTreeMap<String, NodeStats>,
}

#[derive(Debug, Clone, Default)]
struct Capture {
    pipelines: NodePipelineStats,
    total_hits: u64,
    sample: MetricsSample,
}

#[derive(Default)]
struct Records {
    baseline: Option<Capture>,
    last: Option<Capture>,
    disk_usage: BTreeMap<String, DiskUsage>,
    samples: usize,
}

struct Inner {
    ingest: Arc<dyn IngestStats>,
    sink: Option<Arc<dyn MetricsSink>>,
    config: CollectorConfig,
    state: Mutex<CollectorState>,
    records: Mutex<Records>,
}

/// Samples the cluster on a fixed interval while a benchmark runs.
///
/// The collector moves through `Idle -> Sampling -> Draining -> Stopped`. The first tick waits
/// for the data stream to exist (plus the warm-up) and captures the baseline. [MetricsCollector::stop]
/// triggers the final capture and only returns once it has completed.
pub struct MetricsCollector {
    inner: Arc<Inner>,
    stop_signal: ShutdownHandle,
    stopped: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsCollector {
    pub fn new(
        ingest: Arc<dyn IngestStats>,
        sink: Option<Arc<dyn MetricsSink>>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ingest,
                sink,
                config,
                state: Mutex::new(CollectorState::Idle),
                records: Mutex::new(Records::default()),
            }),
            stop_signal: ShutdownHandle::new(),
            stopped: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// The index samples are published to, `bench-metrics-<data stream>-<run id>`.
    pub fn index_name(&self) -> String {
        self.inner.index_name()
    }

    pub fn state(&self) -> CollectorState {
        *self.inner.state.lock()
    }

    /// Number of samples taken so far, including the baseline and the final sample.
    pub fn samples_collected(&self) -> usize {
        self.inner.records.lock().samples
    }

    pub fn baseline_sample(&self) -> Option<MetricsSample> {
        self.inner
            .records
            .lock()
            .baseline
            .as_ref()
            .map(|c| c.sample.clone())
    }

    pub fn final_sample(&self) -> Option<MetricsSample> {
        self.inner
            .records
            .lock()
            .last
            .as_ref()
            .map(|c| c.sample.clone())
    }

    /// Create the metrics index if a sink is configured, then launch the sampling loop.
    pub async fn start(&self) -> anyhow::Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != CollectorState::Idle {
                anyhow::bail!("Metrics collector cannot be started from state {:?}", *state);
            }
            *state = CollectorState::Sampling;
        }

        self.inner.create_metrics_index().await;

        let inner = self.inner.clone();
        let listener = self.stop_signal.new_listener();
        let task = tokio::spawn(async move { inner.run(listener).await });
        *self.task.lock() = Some(task);

        Ok(())
    }

    /// Ask the sampling loop to drain and wait for it to exit.
    ///
    /// Only the first call has an effect.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.stop_signal.shutdown();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("Metrics collector task failed: {e}");
            }
        }

        *self.inner.state.lock() = CollectorState::Stopped;
    }

    /// Difference between the final capture and the baseline.
    pub fn summarize(&self) -> Result<MetricsSummary, SummaryError> {
        if self.state() != CollectorState::Stopped {
            return Err(SummaryError::NotStopped);
        }

        let records = self.inner.records.lock();
        let (Some(start), Some(end)) = (&records.baseline, &records.last) else {
            return Err(SummaryError::NoBaseline);
        };

        Ok(MetricsSummary {
            cluster_name: start
                .sample
                .nodes
                .as_ref()
                .map(|n| n.cluster_name.clone())
                .unwrap_or_default(),
            nodes: end
                .sample
                .nodes
                .as_ref()
                .map(|n| n.nodes.len())
                .unwrap_or_default(),
            run_id: self.inner.config.metadata.info.run_id.clone(),
            collection_start_ts: start.sample.ts,
            collection_end_ts: end.sample.ts,
            data_stream_stats: end.sample.data_stream.clone(),
            ingest_pipeline_stats: pipeline_stats_delta(&start.pipelines, &end.pipelines)?,
            disk_usage: records.disk_usage.clone(),
            total_hits: end.total_hits as i64 - start.total_hits as i64,
            nodes_stats: end
                .sample
                .nodes
                .as_ref()
                .map(|n| n.nodes.clone())
                .unwrap_or_default(),
        })
    }
}

impl Inner {
    fn index_name(&self) -> String {
        format!(
            "bench-metrics-{}-{}",
            self.config.data_stream, self.config.metadata.info.run_id
        )
    }

    fn set_state(&self, state: CollectorState) {
        log::trace!("Metrics collector entering state {state:?}");
        *self.state.lock() = state;
    }

    async fn run(self: Arc<Self>, mut stop: DelegatedShutdownListener) {
        let mut readiness_stop = stop.clone();
        let interval = self.config.interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.wait_for_shutdown() => {
                    log::debug!("Metrics collector received stop signal");
                    break;
                }
                _ = ticker.tick() => {
                    if self.records.lock().baseline.is_none() {
                        self.capture_baseline(&mut readiness_stop).await;
                    }
                    let sample = self.collect().await;
                    self.publish(&sample).await;
                }
            }
        }

        self.set_state(CollectorState::Draining);
        self.drain().await;
        self.set_state(CollectorState::Stopped);
    }

    async fn capture_baseline(&self, stop: &mut DelegatedShutdownListener) {
        self.wait_until_ready(stop).await;

        let pipelines = self.collect_ingest_metrics().await;
        let total_hits = self.collect_total_hits().await;
        let sample = self.collect().await;
        self.publish(&sample).await;

        self.records.lock().baseline = Some(Capture {
            pipelines,
            total_hits,
            sample,
        });
    }

    async fn wait_until_ready(&self, stop: &mut DelegatedShutdownListener) {
        log::debug!(
            "Waiting for data stream {} to be created...",
            self.config.data_stream
        );

        loop {
            if sleep_or_shutdown(READINESS_POLL_INTERVAL, stop).await.is_err() {
                return;
            }
            match self.ingest.data_stream_stats(&self.config.data_stream).await {
                Ok(Some(_)) => break,
                Ok(None) => {}
                Err(e) => log::debug!("Could not get data stream stats: {e:#}"),
            }
        }

        if !self.config.warmup.is_zero() {
            log::debug!("Waiting for warm-up period of {:?}", self.config.warmup);
            if sleep_or_shutdown(self.config.warmup, stop).await.is_err() {
                return;
            }
        }

        log::debug!("Metric collection starting...");
    }

    async fn drain(&self) {
        let pipelines = self.collect_ingest_metrics().await;
        let disk_usage = match self.ingest.disk_usage(&self.config.data_stream).await {
            Ok(disk_usage) => disk_usage,
            Err(e) => {
                log::warn!("Could not get disk usage metrics: {e:#}");
                BTreeMap::new()
            }
        };
        let total_hits = self.collect_total_hits().await;
        let sample = self.collect().await;
        self.publish(&sample).await;

        let mut records = self.records.lock();
        records.disk_usage = disk_usage;
        records.last = Some(Capture {
            pipelines,
            total_hits,
            sample,
        });
    }

    async fn collect(&self) -> MetricsSample {
        let mut sample = MetricsSample {
            ts: chrono::Utc::now().timestamp(),
            ..Default::default()
        };

        match self.ingest.nodes_stats().await {
            Ok(nodes) => sample.nodes = Some(nodes),
            Err(e) => log::warn!("Could not get node stats: {e:#}"),
        }
        match self.ingest.data_stream_stats(&self.config.data_stream).await {
            Ok(data_stream) => sample.data_stream = data_stream,
            Err(e) => log::warn!("Could not get data stream stats: {e:#}"),
        }

        self.records.lock().samples += 1;
        sample
    }

    async fn collect_ingest_metrics(&self) -> NodePipelineStats {
        match self
            .ingest
            .pipeline_stats_by_prefix(&self.config.pipeline_prefix)
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                log::warn!("Could not get ingest pipeline metrics: {e:#}");
                NodePipelineStats::new()
            }
        }
    }

    async fn collect_total_hits(&self) -> u64 {
        match self.ingest.count_docs(&self.config.data_stream).await {
            Ok(hits) => hits,
            Err(e) => {
                log::warn!("Could not get total hits: {e:#}");
                0
            }
        }
    }

    async fn create_metrics_index(&self) {
        let Some(sink) = &self.sink else {
            return;
        };

        let body = match serde_json::from_str::<serde_json::Value>(METRICS_INDEX_BODY) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Invalid metrics index definition: {e}");
                return;
            }
        };

        let index = self.index_name();
        log::debug!("Creating {index} index in metric store...");
        if let Err(e) = sink.create_index(&index, &body).await {
            log::warn!("Could not create metrics index {index}: {e:#}");
        }
    }

    async fn publish(&self, sample: &MetricsSample) {
        let Some(sink) = &self.sink else {
            return;
        };

        let index = self.index_name();
        for event in self.events_from_sample(sample) {
            if let Err(e) = sink.index_document(&index, &event).await {
                log::debug!("Error indexing metrics event: {e:#}");
            }
        }
    }

    /// One event per node plus one data stream event.
    fn events_from_sample(&self, sample: &MetricsSample) -> Vec<serde_json::Value> {
        let ts_millis = sample.ts * 1000;
        let metadata = &self.config.metadata;
        let mut events = Vec::new();

        if let Some(nodes) = &sample.nodes {
            for (node_name, stats) in &nodes.nodes {
                let mut event = serde_json::json!({
                    "@timestamp": ts_millis,
                    "cluster_name": nodes.cluster_name,
                    "node_name": node_name,
                    "benchmark_metadata": metadata,
                });
                merge_fields(&mut event, stats);
                events.push(event);
            }
        }

        let mut data_stream_event = serde_json::json!({
            "@timestamp": ts_millis,
            "benchmark_metadata": metadata,
        });
        if let Some(data_stream) = &sample.data_stream {
            merge_fields(&mut data_stream_event, data_stream);
        }
        events.push(data_stream_event);

        events
    }
}

fn merge_fields(event: &mut serde_json::Value, extra: &impl Serialize) {
    let serde_json::Value::Object(target) = event else {
        return;
    };
    match serde_json::to_value(extra) {
        Ok(serde_json::Value::Object(fields)) => {
            for (key, value) in fields {
                target.entry(key).or_insert(value);
            }
        }
        Ok(_) => {}
        Err(e) => log::debug!("Error encoding metrics event: {e}"),
    }
}
