// THEORY:
// The sensor aggregator turns a stream of frequent per-plant readings into one
// averaged summary per plant per time window.
//
// Key architectural principles:
// 1.  **Explicit store**: all buffering state lives in a `SensorStore` value that
//     is mutated only through `append` and `flush_due`. There is no global map.
// 2.  **Single owner**: at runtime the store is owned by one long-lived actor task
//     (`SensorAggregator`). Everything else talks to it through an
//     `AggregatorHandle` and every request carries its own reply channel.
// 3.  **At-least-once hand-off**: a window is reset only after its summary was
//     accepted by the `SummarySink`. A failed delivery keeps the buffer, and the
//     next tick retries with everything accumulated so far.

use crate::error::{AggregatorError, SinkError};
use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub type PlantId = u32;

/// One reading from a plant's sensor board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub plant_id: PlantId,
    /// Air temperature in °C.
    pub temp: f64,
    /// Relative humidity in %.
    pub hum: f64,
    /// Illuminance in lux.
    pub light: f64,
    /// Raw soil moisture sensor value.
    pub soil: f64,
}

/// Averages of one plant's readings over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub plant_id: PlantId,
    #[serde(with = "timestamp")]
    pub start_at: NaiveDateTime,
    #[serde(with = "timestamp")]
    pub end_at: NaiveDateTime,
    pub temp_avg: f64,
    pub hum_avg: f64,
    pub lux_avg: f64,
    pub soil_avg: f64,
}

impl WindowSummary {
    /// The window averages as a single reading, for threshold checks.
    pub fn as_reading(&self) -> SensorReading {
        SensorReading {
            plant_id: self.plant_id,
            temp: self.temp_avg,
            hum: self.hum_avg,
            light: self.lux_avg,
            soil: self.soil_avg,
        }
    }
}

/// `YYYY-mm-dd HH:MM:SS` wire format for timestamps. ISO-8601 with a `T`
/// separator is accepted on input.
pub(crate) mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, ISO_FORMAT))
            .map_err(serde::de::Error::custom)
    }
}

/// Readings collected for one plant since `started_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorBuffer {
    pub started_at: NaiveDateTime,
    pub rows: Vec<SensorReading>,
}

impl SensorBuffer {
    fn summarize(&self, plant_id: PlantId, end_at: NaiveDateTime) -> Option<WindowSummary> {
        if self.rows.is_empty() {
            return None;
        }
        let n = self.rows.len() as f64;
        let mean = |field: fn(&SensorReading) -> f64| self.rows.iter().map(field).sum::<f64>() / n;
        Some(WindowSummary {
            plant_id,
            start_at: self.started_at,
            end_at,
            temp_avg: mean(|r| r.temp),
            hum_avg: mean(|r| r.hum),
            lux_avg: mean(|r| r.light),
            soil_avg: mean(|r| r.soil),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStatus {
    /// First reading for this plant; a new window starts now.
    Created,
    /// Added to an open window that now holds `count` readings.
    Appended { count: usize },
}

/// Outcome of one flush pass, by plant id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: Vec<PlantId>,
    pub failed: Vec<PlantId>,
}

/// Downstream consumer of window summaries.
pub trait SummarySink: Send {
    fn deliver(&mut self, summary: &WindowSummary) -> Result<(), SinkError>;
}

/// Forwards summaries into a tokio channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<WindowSummary>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<WindowSummary>) -> Self {
        Self { sender }
    }
}

impl SummarySink for ChannelSink {
    fn deliver(&mut self, summary: &WindowSummary) -> Result<(), SinkError> {
        self.sender
            .send(summary.clone())
            .map_err(|_| SinkError::Disconnected)
    }
}

/// Per-plant buffers. Iteration is in ascending plant id order.
#[derive(Debug, Clone, Default)]
pub struct SensorStore {
    buffers: BTreeMap<PlantId, SensorBuffer>,
}

impl SensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, reading: SensorReading, now: NaiveDateTime) -> AppendStatus {
        match self.buffers.get_mut(&reading.plant_id) {
            Some(buffer) => {
                buffer.rows.push(reading);
                AppendStatus::Appended {
                    count: buffer.rows.len(),
                }
            }
            None => {
                self.buffers.insert(
                    reading.plant_id,
                    SensorBuffer {
                        started_at: now,
                        rows: vec![reading],
                    },
                );
                AppendStatus::Created
            }
        }
    }

    /// Delivers every non-empty window that is at least `window` old.
    pub fn flush_due(&mut self, now: NaiveDateTime, window: TimeDelta, sink: &mut dyn SummarySink) -> FlushReport {
        let mut report = FlushReport::default();

        for (&plant_id, buffer) in self.buffers.iter_mut() {
            if now - buffer.started_at < window {
                continue;
            }
            let Some(summary) = buffer.summarize(plant_id, now) else {
                continue;
            };

            match sink.deliver(&summary) {
                Ok(()) => {
                    debug!(plant_id, rows = buffer.rows.len(), "window delivered");
                    *buffer = SensorBuffer {
                        started_at: now,
                        rows: Vec::new(),
                    };
                    report.delivered.push(plant_id);
                }
                Err(error) => {
                    warn!(plant_id, %error, "window delivery failed, keeping buffer");
                    report.failed.push(plant_id);
                }
            }
        }

        report
    }

    pub fn buffer(&self, plant_id: PlantId) -> Option<&SensorBuffer> {
        self.buffers.get(&plant_id)
    }

    pub fn plant_count(&self) -> usize {
        self.buffers.len()
    }
}

/// Longest accepted tick period: roughly one hundred years.
pub const MAX_CHECK_INTERVAL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Timing of the aggregator actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Length of one averaging window, in seconds.
    pub window_secs: u64,
    /// How often due windows are checked, in seconds.
    pub check_interval_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_secs: 60 * 60,
            check_interval_secs: 10,
        }
    }
}

impl AggregatorConfig {
    /// Windows too long for `TimeDelta` saturate to its maximum.
    pub fn window(&self) -> TimeDelta {
        i64::try_from(self.window_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Clamped to `1..=MAX_CHECK_INTERVAL_SECS` so the first deadline is representable.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.clamp(1, MAX_CHECK_INTERVAL_SECS))
    }
}

/// Message type for the aggregator actor
enum AggregatorMessage {
    Append(SensorReading, oneshot::Sender<AppendStatus>),
    FlushNow(oneshot::Sender<FlushReport>),
    Shutdown,
}

/// Cheap, cloneable access to a running aggregator.
#[derive(Clone)]
pub struct AggregatorHandle {
    sender: mpsc::Sender<AggregatorMessage>,
}

impl AggregatorHandle {
    pub async fn append(&self, reading: SensorReading) -> Result<AppendStatus, AggregatorError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(AggregatorMessage::Append(reading, reply))
            .await
            .map_err(|_| AggregatorError::Stopped)?;
        response.await.map_err(|_| AggregatorError::Stopped)
    }

    /// Runs a flush pass immediately instead of waiting for the next tick.
    pub async fn flush_now(&self) -> Result<FlushReport, AggregatorError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(AggregatorMessage::FlushNow(reply))
            .await
            .map_err(|_| AggregatorError::Stopped)?;
        response.await.map_err(|_| AggregatorError::Stopped)
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(AggregatorMessage::Shutdown).await;
    }
}

/// The long-lived owner of the sensor store.
pub struct SensorAggregator;

impl SensorAggregator {
    /// Spawns the actor. The join handle yields the final store after shutdown.
    pub fn spawn<S>(config: AggregatorConfig, mut sink: S) -> (AggregatorHandle, JoinHandle<SensorStore>)
    where
        S: SummarySink + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<AggregatorMessage>(64);

        let task = tokio::spawn(async move {
            let mut store = SensorStore::new();
            let window = config.window();
            let period = config.check_interval();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(window_secs = config.window_secs, check_interval_secs = config.check_interval_secs, "sensor aggregator started");

            loop {
                tokio::select! {
                    message = receiver.recv() => match message {
                        Some(AggregatorMessage::Append(reading, reply)) => {
                            let status = store.append(reading, Local::now().naive_local());
                            let _ = reply.send(status);
                        }
                        Some(AggregatorMessage::FlushNow(reply)) => {
                            let report = store.flush_due(Local::now().naive_local(), window, &mut sink);
                            let _ = reply.send(report);
                        }
                        Some(AggregatorMessage::Shutdown) | None => break,
                    },
                    _ = ticker.tick() => {
                        store.flush_due(Local::now().naive_local(), window, &mut sink);
                    }
                }
            }

            info!(plants = store.plant_count(), "sensor aggregator stopped");
            store
        });

        (AggregatorHandle { sender }, task)
    }
}
