// THEORY:
// Care statistics for the dashboard: hourly sensor series with their gaps filled,
// plus watering habits derived from the event log. Everything here is a pure
// function of its input and a caller-supplied `now`, so reports are reproducible.

use crate::core_modules::height_estimator::round_to_tenth;
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Event type that marks a detected watering.
pub const WATERING_EVENT: &str = "WATER_DROP_DETECTED";

/// Weeks of the month reported in `water_weekly`. Days 29..=31 fall outside them.
pub const REPORTED_WEEKS: u32 = 4;

/// One hourly window as stored by the aggregator. Missing averages are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRecord {
    #[serde(with = "crate::sensor_aggregator::timestamp")]
    pub created_at: NaiveDateTime,
    pub temp_avg: Option<f64>,
    pub hum_avg: Option<f64>,
    pub light_avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareEvent {
    #[serde(with = "crate::sensor_aggregator::timestamp")]
    pub event_date: NaiveDateTime,
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyCount {
    pub label: String,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsAnalysis {
    pub avg_temp: f64,
    pub avg_hum: f64,
    pub avg_light: i64,
    pub water_avg_interval: f64,
    pub water_total_month: usize,
    pub water_weekly: Vec<WeeklyCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub labels: Vec<String>,
    pub temp_data: Vec<f64>,
    pub hum_data: Vec<f64>,
    pub light_data: Vec<f64>,
    pub analysis: StatsAnalysis,
}

/// Fills missing values by position.
///
/// Interior gaps are interpolated linearly between their known neighbours,
/// trailing gaps repeat the last known value and leading gaps become 0.
pub fn fill_gaps(values: &[Option<f64>]) -> Vec<f64> {
    let mut filled = vec![0.0; values.len()];
    let mut last_known: Option<(usize, f64)> = None;

    for (index, value) in values.iter().enumerate() {
        let Some(value) = *value else {
            continue;
        };
        // A leading gap has no left neighbour and stays at 0.
        if let Some((start, start_value)) = last_known {
            let span = (index - start) as f64;
            for gap in start + 1..index {
                let t = (gap - start) as f64 / span;
                filled[gap] = start_value + (value - start_value) * t;
            }
        }
        filled[index] = value;
        last_known = Some((index, value));
    }

    if let Some((last, last_value)) = last_known {
        for slot in filled.iter_mut().skip(last + 1) {
            *slot = last_value;
        }
    }

    filled
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean number of whole days between consecutive dates, or 0 with fewer than two.
pub fn average_interval_days(sorted_dates: &[NaiveDateTime]) -> f64 {
    let gaps: Vec<f64> = sorted_dates
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_days() as f64)
        .collect();
    mean(&gaps).map(round_to_tenth).unwrap_or(0.0)
}

/// Week of the month, 1-based, in blocks of seven days.
pub fn week_of_month(date: &NaiveDateTime) -> u32 {
    (date.day() - 1) / 7 + 1
}

pub fn analyze(hourly: &[HourlyRecord], events: &[CareEvent], now: NaiveDateTime) -> StatsReport {
    let mut hourly: Vec<&HourlyRecord> = hourly.iter().collect();
    hourly.sort_by_key(|record| record.created_at);

    let labels = hourly
        .iter()
        .map(|record| record.created_at.format("%H:%M").to_string())
        .collect();
    let temp_data = fill_gaps(&hourly.iter().map(|r| r.temp_avg).collect::<Vec<_>>());
    let hum_data = fill_gaps(&hourly.iter().map(|r| r.hum_avg).collect::<Vec<_>>());
    let light_data = fill_gaps(&hourly.iter().map(|r| r.light_avg).collect::<Vec<_>>());

    let mut waterings: Vec<NaiveDateTime> = events
        .iter()
        .filter(|event| event.event_type == WATERING_EVENT)
        .map(|event| event.event_date)
        .collect();
    waterings.sort();

    let this_month: Vec<&NaiveDateTime> = waterings
        .iter()
        .filter(|date| date.year() == now.year() && date.month() == now.month())
        .collect();

    let water_weekly = (1..=REPORTED_WEEKS)
        .map(|week| WeeklyCount {
            label: format!("Week {week}"),
            value: this_month.iter().filter(|date| week_of_month(date) == week).count(),
        })
        .collect();

    let analysis = StatsAnalysis {
        avg_temp: mean(&temp_data).map(round_to_tenth).unwrap_or(0.0),
        avg_hum: mean(&hum_data).map(round_to_tenth).unwrap_or(0.0),
        avg_light: mean(&light_data).map(|m| m.trunc() as i64).unwrap_or(0),
        water_avg_interval: average_interval_days(&waterings),
        water_total_month: this_month.len(),
        water_weekly,
    };

    StatsReport {
        labels,
        temp_data,
        hum_data,
        light_data,
        analysis,
    }
}
