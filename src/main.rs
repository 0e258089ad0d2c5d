// src/main.rs - demo binary: brings up the MMU coordination core against a
// real serial port and drives a single tool-change before shutting down.
use std::env;
use std::sync::Arc;

use tokio::signal;

use mmu_coordinator::config::Config;
use mmu_coordinator::mmu::coordinator::{Coordinator, PrinterCollaborators};
use mmu_coordinator::mmu::protocol::SerialProtocol;
use mmu_coordinator::mmu::verify::FilamentSensorState;
use mmu_coordinator::mmu::save_restore::Position;
use mmu_coordinator::serial::SerialConnection;

/// Placeholder collaborators until this crate is wired into a real
/// printer firmware host; reports a stationary printer at a fixed hotend
/// target with filament always present, matching spec.md §6.1's shape.
struct StubCollaborators;

impl PrinterCollaborators for StubCollaborators {
    fn current_position(&self) -> Position {
        Position { x: 0.0, y: 0.0, z: 0.0 }
    }
    fn current_hotend_target(&self) -> f64 {
        0.0
    }
    fn current_hotend_temp(&self) -> f64 {
        0.0
    }
    fn set_target_hotend(&self, _target: f64) {}
    fn printing_is_active(&self) -> bool {
        false
    }
    fn filament_sensor(&self) -> FilamentSensorState {
        FilamentSensorState::AtFsensor
    }
    fn idle_tick(&self) {}
    fn move_extruder_relative(&self, _delta_mm: f64) {}
    fn finda_detects_filament(&self) -> bool {
        true
    }
    fn num_joins(&self) -> u8 {
        0
    }
    fn spool_2(&self, _slot: u8) -> Option<u8> {
        None
    }
    fn enqueue_gcode(&self, gcode: &str) {
        tracing::info!(gcode, "enqueued gcode");
    }
    fn cutter_enabled(&self) -> bool {
        true
    }
    fn disable_mmu_in_settings(&self) {}
    fn stop_print(&self) {}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting MMU coordination core");

    let args: Vec<String> = env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or("mmu.toml");

    let config = match Config::load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Failed to load config from '{}': {} — using defaults", config_path, e);
            Config::default()
        }
    };
    config.validate().map_err(|e| e.to_string())?;

    tracing::info!(
        "Serial port: {} @ {} baud",
        config.serial.port,
        config.serial.baud
    );

    let conn = SerialConnection::new(&config.serial.port, config.serial.baud).await?;
    let protocol = Arc::new(SerialProtocol::new(conn));
    let collaborators = Arc::new(StubCollaborators);

    let mut coordinator = Coordinator::new(config.mmu, protocol, collaborators);
    coordinator.start().await?;

    tracing::info!("MMU coordinator active. Press Ctrl+C to shut down...");

    match signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::warn!("Failed to wait for shutdown signal: {}", e),
    }

    coordinator.stop().await?;
    Ok(())
}
