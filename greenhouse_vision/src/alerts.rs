// THEORY:
// Alerting is split into a deterministic decision and a cosmetic explanation.
//
// `assess` decides *whether* something is wrong by comparing a reading against
// fixed care thresholds. Wording the notification may be delegated to an
// external generator, but its output is only a `NotificationDraft`: untrusted
// text that `finalize_notification` repairs or replaces. The event type alone
// picks the guide, and the guide alone picks the severity, so the same event
// always lands with the same urgency no matter who wrote the sentence.

use crate::sensor_aggregator::SensorReading;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Soil sensor drop between consecutive windows that counts as a watering.
/// The raw sensor range is 0..=4095.
pub const WATER_DROP_THRESHOLD: f64 = -500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Normal,
    TempLow,
    TempHigh,
    HumLow,
    HumHigh,
    LuxLow,
    SoilLow,
    SoilHigh,
    WaterLow,
    WaterDropDetected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "NORMAL",
            EventType::TempLow => "TEMP_LOW",
            EventType::TempHigh => "TEMP_HIGH",
            EventType::HumLow => "HUM_LOW",
            EventType::HumHigh => "HUM_HIGH",
            EventType::LuxLow => "LUX_LOW",
            EventType::SoilLow => "SOIL_LOW",
            EventType::SoilHigh => "SOIL_HIGH",
            EventType::WaterLow => "WATER_LOW",
            EventType::WaterDropDetected => "WATER_DROP_DETECTED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Care limits. Bounds are exclusive: a value equal to a limit is in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CareThresholds {
    pub temp_min: f64,
    pub temp_max: f64,
    pub hum_min: f64,
    pub hum_max: f64,
    pub lux_min: f64,
    pub soil_max: f64,
}

impl Default for CareThresholds {
    fn default() -> Self {
        Self {
            temp_min: 21.0,
            temp_max: 25.0,
            hum_min: 40.0,
            hum_max: 70.0,
            lux_min: 300.0,
            soil_max: 3000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub events: Vec<EventType>,
    /// The first event, or `Normal` when nothing is out of range.
    pub primary: EventType,
}

impl Assessment {
    pub fn event_occurred(&self) -> bool {
        !self.events.is_empty()
    }
}

pub fn assess(reading: &SensorReading, thresholds: &CareThresholds) -> Assessment {
    let mut events = Vec::new();

    if reading.temp < thresholds.temp_min {
        events.push(EventType::TempLow);
    } else if reading.temp > thresholds.temp_max {
        events.push(EventType::TempHigh);
    }

    if reading.hum < thresholds.hum_min {
        events.push(EventType::HumLow);
    } else if reading.hum > thresholds.hum_max {
        events.push(EventType::HumHigh);
    }

    if reading.light < thresholds.lux_min {
        events.push(EventType::LuxLow);
    }

    if reading.soil > thresholds.soil_max {
        events.push(EventType::SoilHigh);
    }

    let primary = events.first().copied().unwrap_or(EventType::Normal);
    debug!(plant_id = reading.plant_id, %primary, count = events.len(), "reading assessed");

    Assessment { events, primary }
}

/// Returns the soil delta when it is a drop large enough to mean the plant was watered.
pub fn detect_watering(previous_soil: f64, current_soil: f64) -> Option<f64> {
    let delta = current_soil - previous_soil;
    (delta <= WATER_DROP_THRESHOLD).then_some(delta)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Urgent,
}

/// Fixed wording and urgency for one event type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventGuide {
    pub title: &'static str,
    pub severity: Severity,
    pub tips: &'static [&'static str],
}

const TEMP_HIGH_GUIDE: EventGuide = EventGuide {
    title: "Temperature is high",
    severity: Severity::Warn,
    tips: &[
        "Improve ventilation around the plant",
        "Move it out of direct sunlight",
        "Avoid sudden changes in its environment",
    ],
};

const TEMP_LOW_GUIDE: EventGuide = EventGuide {
    title: "Temperature is low",
    severity: Severity::Warn,
    tips: &[
        "Keep it away from cold drafts and windows",
        "Keep the room temperature steady",
        "Be careful not to overwater",
    ],
};

const WATER_LOW_GUIDE: EventGuide = EventGuide {
    title: "Watering needed",
    severity: Severity::Warn,
    tips: &[
        "Check the soil and water the plant",
        "Avoid giving too much water at once",
        "Check that the pot drains well",
    ],
};

const SOIL_LOW_GUIDE: EventGuide = EventGuide {
    title: "Soil moisture is low",
    severity: Severity::Warn,
    tips: &[
        "Check both the top and deeper soil",
        "Water slowly in several small amounts if needed",
        "Review recent watering and drainage",
    ],
};

const LUX_LOW_GUIDE: EventGuide = EventGuide {
    title: "Not enough light",
    severity: Severity::Info,
    tips: &[
        "Move it to a brighter window",
        "Some plants dislike direct sunlight",
        "Consider a grow light",
    ],
};

const DEFAULT_GUIDE: EventGuide = EventGuide {
    title: "Plant status alert",
    severity: Severity::Info,
    tips: &["Check on your plant", "Adjust its environment if needed"],
};

pub fn guide_for(event: EventType) -> &'static EventGuide {
    match event {
        EventType::TempHigh => &TEMP_HIGH_GUIDE,
        EventType::TempLow => &TEMP_LOW_GUIDE,
        EventType::WaterLow => &WATER_LOW_GUIDE,
        EventType::SoilLow => &SOIL_LOW_GUIDE,
        EventType::LuxLow => &LUX_LOW_GUIDE,
        _ => &DEFAULT_GUIDE,
    }
}

/// A notification ready to show to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub status_short: String,
    pub reason: String,
    pub action_tip: String,
    pub action_steps: Vec<String>,
    pub severity: Severity,
}

/// Unvalidated notification text from an external generator.
///
/// Deserialization never rejects an object because of one badly typed field:
/// scalar text fields are taken as their text, `null` and nested values count as
/// missing, and a non-list `action_steps` becomes empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct NotificationDraft {
    pub title: Option<String>,
    pub message: Option<String>,
    pub status_short: Option<String>,
    pub reason: Option<String>,
    pub action_tip: Option<String>,
    pub action_steps: Vec<Value>,
    pub severity: Option<String>,
}

fn text_field(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl TryFrom<Value> for NotificationDraft {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(object) = value else {
            return Err("notification draft must be a JSON object".to_string());
        };

        let action_steps = match object.get("action_steps") {
            Some(Value::Array(steps)) => steps.clone(),
            _ => Vec::new(),
        };

        Ok(Self {
            title: text_field(&object, "title"),
            message: text_field(&object, "message"),
            status_short: text_field(&object, "status_short"),
            reason: text_field(&object, "reason"),
            action_tip: text_field(&object, "action_tip"),
            action_steps,
            severity: text_field(&object, "severity"),
        })
    }
}

impl NotificationDraft {
    /// Parses a draft from generator output. Accepts a bare JSON object or one
    /// embedded in surrounding prose.
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(draft) = serde_json::from_str(text) {
            return Some(draft);
        }
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&text[start..=end]).ok()
    }
}

/// The fixed notification used whenever no usable draft is available.
pub fn fallback_notification(event: EventType) -> Notification {
    let detected = format!("{event} event detected.");
    Notification {
        title: guide_for(event).title.to_string(),
        message: detected.clone(),
        status_short: "Needs a check.".to_string(),
        reason: detected,
        action_tip: "Check the plant and take action if needed.".to_string(),
        action_steps: Vec::new(),
        severity: Severity::Info,
    }
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

/// Turns an optional draft into a notification that always satisfies the schema.
pub fn finalize_notification(draft: Option<NotificationDraft>, event: EventType) -> Notification {
    let guide = guide_for(event);

    let Some(draft) = draft else {
        debug!(%event, "no draft, using fallback notification");
        return fallback_notification(event);
    };

    let (Some(title), Some(message), Some(status_short), Some(reason), Some(action_tip)) = (
        required(draft.title),
        required(draft.message),
        required(draft.status_short),
        required(draft.reason),
        required(draft.action_tip),
    ) else {
        debug!(%event, "draft is missing a required field, using fallback notification");
        return fallback_notification(event);
    };

    let mut action_steps: Vec<String> = draft
        .action_steps
        .iter()
        .filter_map(|step| step.as_str())
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .map(str::to_string)
        .collect();

    if action_steps.len() < 2 {
        action_steps = guide.tips.iter().map(|tip| tip.to_string()).collect();
    }
    action_steps.truncate(3);

    Notification {
        title,
        message,
        status_short,
        reason,
        action_tip,
        action_steps,
        severity: guide.severity,
    }
}
