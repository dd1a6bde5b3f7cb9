//! Headless dashboard: subscribes to the relay and logs the live garden
//! state. Stands in for the browser UI when debugging the relay.
//!
//! Usage:
//!   cargo run --bin garden_watch -- ws://localhost:3001/ws [thresholds.json]

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::{signal, time};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vertical_garden_service::client::{
    state::Thresholds, ClientConfig, ConnectionManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://localhost:3001/ws".to_owned());

    let mut config = ClientConfig::new(url);
    if let Some(path) = args.next() {
        config.thresholds = Thresholds::load(Path::new(&path))?;
    }

    let handle = ConnectionManager::spawn(config);
    let mut ticker = time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let state = handle.store().snapshot().await;
                let freshness = state.freshness(Utc::now(), chrono::Duration::seconds(30));
                info!(
                    status = ?handle.status(),
                    freshness = ?freshness,
                    moisture_a = state.sensor_data.moisture_a,
                    moisture_b = state.sensor_data.moisture_b,
                    temperature = state.sensor_data.temperature,
                    humidity = state.sensor_data.humidity,
                    nitrogen = state.sensor_data.npk.nitrogen,
                    phosphorus = state.sensor_data.npk.phosphorus,
                    potassium = state.sensor_data.npk.potassium,
                    irrigation = state.irrigation,
                    popup = ?state.advice_popup,
                    "garden"
                );
            }
        }
    }

    info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}
