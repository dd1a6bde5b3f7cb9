//! Client-side state: a single aggregate mutated only through a pure
//! reducer, plus the advisory-popup trigger and threshold settings.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::protocol::{Probe, ReadingPayload};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NpkLevels {
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorData {
    pub moisture_a: f64,
    pub moisture_b: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub npk: NpkLevels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nutrient {
    Nitrogen,
    Phosphorus,
    Potassium,
}

/// Freshness of the dashboard, derived from last-sync age. Never persisted;
/// recomputed from scratch after a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Live,
    Stale,
    Never,
}

/// The whole client aggregate. Created zero-valued at start and mutated
/// only by [`reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GardenState {
    pub irrigation: bool,
    pub sensor_data: SensorData,
    pub last_sync: Option<DateTime<Utc>>,
    /// Single popup slot: at most one nutrient advisory at a time.
    pub advice_popup: Option<Nutrient>,
}

impl GardenState {
    pub fn freshness(&self, now: DateTime<Utc>, max_age: Duration) -> Freshness {
        match self.last_sync {
            None => Freshness::Never,
            Some(at) if now - at <= max_age => Freshness::Live,
            Some(_) => Freshness::Stale,
        }
    }
}

// ---------------------------------------------------------------------------
// Actions and reducer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ToggleIrrigation,
    /// Server confirmation overwrites the local flag.
    SetIrrigationState(bool),
    UpdateSensorData(ReadingPayload),
    SetLastSync(DateTime<Utc>),
    ShowAdvicePopup(Nutrient),
    HideAdvicePopup,
}

/// Pure transition function: each action has exactly one deterministic
/// effect on the state.
pub fn reduce(state: GardenState, action: Action) -> GardenState {
    match action {
        Action::ToggleIrrigation => GardenState {
            irrigation: !state.irrigation,
            ..state
        },
        Action::SetIrrigationState(status) => GardenState {
            irrigation: status,
            ..state
        },
        Action::UpdateSensorData(payload) => {
            let mut data = state.sensor_data;
            match payload {
                ReadingPayload::Moisture { id: Probe::A, value } => data.moisture_a = value,
                ReadingPayload::Moisture { id: Probe::B, value } => data.moisture_b = value,
                ReadingPayload::Dht11 { temp, humidity } => {
                    data.temperature = temp;
                    data.humidity = humidity;
                }
                ReadingPayload::Npk { n, p, k } => {
                    data.npk = NpkLevels {
                        nitrogen: n,
                        phosphorus: p,
                        potassium: k,
                    };
                }
            }
            GardenState {
                sensor_data: data,
                ..state
            }
        }
        Action::SetLastSync(at) => GardenState {
            last_sync: Some(at),
            ..state
        },
        Action::ShowAdvicePopup(nutrient) => GardenState {
            advice_popup: Some(nutrient),
            ..state
        },
        Action::HideAdvicePopup => GardenState {
            advice_popup: None,
            ..state
        },
    }
}

// ---------------------------------------------------------------------------
// Threshold settings
// ---------------------------------------------------------------------------

/// Threshold settings, keyed the way the dashboard stores them. Absent keys
/// fall back to the defaults on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    pub moisture_low: f64,
    pub moisture_high: f64,
    pub temp_low: f64,
    pub temp_high: f64,
    pub humidity_low: f64,
    pub humidity_high: f64,
    pub nitrogen_advice_low: f64,
    pub phosphorus_advice_low: f64,
    pub potassium_advice_low: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            moisture_low: 30.0,
            moisture_high: 70.0,
            temp_low: 18.0,
            temp_high: 28.0,
            humidity_low: 40.0,
            humidity_high: 80.0,
            nitrogen_advice_low: 15.0,
            phosphorus_advice_low: 15.0,
            potassium_advice_low: 15.0,
        }
    }
}

impl Thresholds {
    /// Parse a settings document, merging with defaults for missing keys.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Load settings from a file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_json(&raw)
                .with_context(|| format!("invalid threshold settings in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn advice_low(&self, nutrient: Nutrient) -> f64 {
        match nutrient {
            Nutrient::Nitrogen => self.nitrogen_advice_low,
            Nutrient::Phosphorus => self.phosphorus_advice_low,
            Nutrient::Potassium => self.potassium_advice_low,
        }
    }
}

/// Edge-triggered advisory check: fires only when a nutrient sits below its
/// advisory threshold while no popup is open. While a popup is showing,
/// nothing re-fires and no second nutrient can claim the slot.
pub fn advice_trigger(state: &GardenState, thresholds: &Thresholds) -> Option<Nutrient> {
    if state.advice_popup.is_some() {
        return None;
    }
    let npk = &state.sensor_data.npk;
    [
        (Nutrient::Nitrogen, npk.nitrogen),
        (Nutrient::Phosphorus, npk.phosphorus),
        (Nutrient::Potassium, npk.potassium),
    ]
    .into_iter()
    .find(|&(nutrient, value)| value < thresholds.advice_low(nutrient))
    .map(|(nutrient, _)| nutrient)
}

/// Apply one inbound sensor update the way the connection manager does:
/// merge the reading, stamp last-sync, then run the advisory edge check.
pub fn apply_sensor_update(
    state: GardenState,
    thresholds: &Thresholds,
    reading: ReadingPayload,
    now: DateTime<Utc>,
) -> GardenState {
    let state = reduce(state, Action::UpdateSensorData(reading));
    let state = reduce(state, Action::SetLastSync(now));
    match advice_trigger(&state, thresholds) {
        Some(nutrient) => reduce(state, Action::ShowAdvicePopup(nutrient)),
        None => state,
    }
}

// ---------------------------------------------------------------------------
// Shared store
// ---------------------------------------------------------------------------

/// Reducer-backed store shared between the connection manager (sole writer)
/// and any number of readers.
#[derive(Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<GardenState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn dispatch(&self, action: Action) {
        let mut state = self.inner.write().await;
        *state = reduce(*state, action);
    }

    pub async fn apply_sensor_update(&self, thresholds: &Thresholds, reading: ReadingPayload) {
        let mut state = self.inner.write().await;
        *state = apply_sensor_update(*state, thresholds, reading, Utc::now());
    }

    pub async fn snapshot(&self) -> GardenState {
        *self.inner.read().await
    }
}
