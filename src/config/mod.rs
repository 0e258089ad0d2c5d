// src/config/mod.rs - MMU coordination parameters (spec.md §6.4)
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;

/// Top-level configuration tree for the MMU coordination core.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub mmu: MmuConfig,
}

/// Serial link parameters. Baud is fixed by the wire contract (spec.md §6.3)
/// but the port path is host-specific.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud: default_baud(),
        }
    }
}

/// One step of an extruder move sequence: `{extrude_mm, feed_mm_s}`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct EStep {
    pub extrude_mm: f64,
    pub feed_mm_s: f64,
}

/// Design-time parameters from spec.md §6.4.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MmuConfig {
    #[serde(default = "default_heatbreak_length_mm")]
    pub heatbreak_length_mm: f64,
    #[serde(default = "default_nozzle_length_mm")]
    pub nozzle_length_mm: f64,

    #[serde(default = "default_verify_load_feed_rate_mm_s")]
    pub verify_load_feed_rate_mm_s: f64,
    #[serde(default = "default_verify_load_tweak_mm")]
    pub verify_load_tweak_mm: f64,

    #[serde(default = "default_tool_change_load_length_mm")]
    pub tool_change_load_length_mm: f64,
    #[serde(default = "default_load_to_nozzle_feed_rate_mm_s")]
    pub load_to_nozzle_feed_rate_mm_s: f64,
    #[serde(default = "default_unload_to_finda_feed_rate_mm_s")]
    pub unload_to_finda_feed_rate_mm_s: f64,

    #[serde(default = "default_retry_unload_to_finda_length_mm")]
    pub retry_unload_to_finda_length_mm: f64,
    #[serde(default = "default_retry_unload_to_finda_feed_rate_mm_s")]
    pub retry_unload_to_finda_feed_rate_mm_s: f64,
    #[serde(default = "default_retry_unload_finish_length_mm")]
    pub retry_unload_finish_length_mm: f64,
    #[serde(default = "default_retry_unload_finish_feed_rate_mm_s")]
    pub retry_unload_finish_feed_rate_mm_s: f64,

    #[serde(default = "default_err_pause_position_x")]
    pub err_pause_position_x: f64,
    #[serde(default = "default_err_pause_position_y")]
    pub err_pause_position_y: f64,
    #[serde(default = "default_err_pause_z_lift_mm")]
    pub err_pause_z_lift_mm: f64,

    #[serde(default = "default_safety_timer_minutes")]
    pub safety_timer_minutes: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u8,

    /// Mirrors the MMU's `Extra_Load_Distance` register (spec.md §4.10).
    #[serde(default = "default_extra_load_distance_mm")]
    pub extra_load_distance_mm: f64,
    /// Mirrors the MMU's `Pulley_Slow_Feedrate` register (spec.md §4.10).
    #[serde(default = "default_pulley_slow_feed_rate_mm_s")]
    pub pulley_slow_feed_rate_mm_s: f64,

    #[serde(default = "default_ramming_sequence")]
    pub ramming_sequence: Vec<EStep>,
    #[serde(default = "default_load_to_nozzle_sequence")]
    pub load_to_nozzle_sequence: Vec<EStep>,
}

fn default_serial_port() -> String {
    "/dev/ttyMMU".to_string()
}
fn default_baud() -> u32 {
    115_200
}
fn default_heatbreak_length_mm() -> f64 {
    67.0
}
fn default_nozzle_length_mm() -> f64 {
    20.0
}
fn default_verify_load_feed_rate_mm_s() -> f64 {
    50.0
}
fn default_verify_load_tweak_mm() -> f64 {
    -35.0
}
fn default_tool_change_load_length_mm() -> f64 {
    5.0
}
fn default_load_to_nozzle_feed_rate_mm_s() -> f64 {
    20.0
}
fn default_unload_to_finda_feed_rate_mm_s() -> f64 {
    120.0
}
fn default_retry_unload_to_finda_length_mm() -> f64 {
    20.0
}
fn default_retry_unload_to_finda_feed_rate_mm_s() -> f64 {
    20.0
}
fn default_retry_unload_finish_length_mm() -> f64 {
    -40.0
}
fn default_retry_unload_finish_feed_rate_mm_s() -> f64 {
    20.0
}
fn default_err_pause_position_x() -> f64 {
    125.0
}
fn default_err_pause_position_y() -> f64 {
    0.0
}
fn default_err_pause_z_lift_mm() -> f64 {
    20.0
}
fn default_safety_timer_minutes() -> u32 {
    30
}
fn default_max_retries() -> u8 {
    3
}
fn default_extra_load_distance_mm() -> f64 {
    8.0
}
fn default_pulley_slow_feed_rate_mm_s() -> f64 {
    20.0
}
fn default_ramming_sequence() -> Vec<EStep> {
    vec![
        EStep { extrude_mm: 2.0, feed_mm_s: 70.0 },
        EStep { extrude_mm: -1.0, feed_mm_s: 15.0 },
        EStep { extrude_mm: -10.5, feed_mm_s: 65.0 },
    ]
}
fn default_load_to_nozzle_sequence() -> Vec<EStep> {
    vec![
        EStep { extrude_mm: 67.0, feed_mm_s: 20.0 },
        EStep { extrude_mm: 20.0, feed_mm_s: 5.0 },
    ]
}

impl Default for MmuConfig {
    fn default() -> Self {
        Self {
            heatbreak_length_mm: default_heatbreak_length_mm(),
            nozzle_length_mm: default_nozzle_length_mm(),
            verify_load_feed_rate_mm_s: default_verify_load_feed_rate_mm_s(),
            verify_load_tweak_mm: default_verify_load_tweak_mm(),
            tool_change_load_length_mm: default_tool_change_load_length_mm(),
            load_to_nozzle_feed_rate_mm_s: default_load_to_nozzle_feed_rate_mm_s(),
            unload_to_finda_feed_rate_mm_s: default_unload_to_finda_feed_rate_mm_s(),
            retry_unload_to_finda_length_mm: default_retry_unload_to_finda_length_mm(),
            retry_unload_to_finda_feed_rate_mm_s: default_retry_unload_to_finda_feed_rate_mm_s(),
            retry_unload_finish_length_mm: default_retry_unload_finish_length_mm(),
            retry_unload_finish_feed_rate_mm_s: default_retry_unload_finish_feed_rate_mm_s(),
            err_pause_position_x: default_err_pause_position_x(),
            err_pause_position_y: default_err_pause_position_y(),
            err_pause_z_lift_mm: default_err_pause_z_lift_mm(),
            safety_timer_minutes: default_safety_timer_minutes(),
            max_retries: default_max_retries(),
            extra_load_distance_mm: default_extra_load_distance_mm(),
            pulley_slow_feed_rate_mm_s: default_pulley_slow_feed_rate_mm_s(),
            ramming_sequence: default_ramming_sequence(),
            load_to_nozzle_sequence: default_load_to_nozzle_sequence(),
        }
    }
}

impl MmuConfig {
    /// Target distance for the try-load verification (spec.md §4.8).
    pub fn verify_load_distance_mm(&self) -> f64 {
        self.heatbreak_length_mm - self.extra_load_distance_mm + self.verify_load_tweak_mm
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            mmu: MmuConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file (supports both TOML and legacy `key = value` format).
    pub fn load_config(config_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = File::open(config_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        if let Ok(config) = Self::parse_toml(&contents) {
            tracing::info!("Loaded configuration from TOML file: {}", config_path);
            return Ok(config);
        }

        if let Ok(config) = Self::parse_legacy_config(&contents) {
            tracing::info!("Loaded configuration from legacy config file: {}", config_path);
            return Ok(config);
        }

        Err(format!("Failed to parse configuration file: {}", config_path).into())
    }

    fn parse_toml(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Parse a flat `key = value` legacy file. Only the handful of settings that
    /// existed in the original printer.cfg-style tooling are recognised; the
    /// rest fall back to defaults.
    fn parse_legacy_config(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Config::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(equals_pos) = line.find('=') {
                let key = line[..equals_pos].trim();
                let value = line[equals_pos + 1..].trim();
                Self::parse_config_value(&mut config, key, value)?;
            }
        }

        Ok(config)
    }

    fn parse_config_value(
        config: &mut Config,
        key: &str,
        value: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match key.to_lowercase().as_str() {
            "serial" => config.serial.port = value.to_string(),
            "baud" => config.serial.baud = value.parse()?,
            "heatbreak_length_mm" => config.mmu.heatbreak_length_mm = value.parse()?,
            "nozzle_length_mm" => config.mmu.nozzle_length_mm = value.parse()?,
            "safety_timer_minutes" => config.mmu.safety_timer_minutes = value.parse()?,
            "max_retries" => config.mmu.max_retries = value.parse()?,
            _ => tracing::warn!("Unknown legacy configuration key: {}", key),
        }
        Ok(())
    }

    pub fn save_config(&self, config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(config_path, toml_string)?;
        Ok(())
    }

    /// Validate configuration. `max_retries` must be at least 2 (spec.md §6.3).
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.serial.port.is_empty() {
            return Err("serial.port must be specified".into());
        }
        if self.serial.baud == 0 {
            return Err("serial.baud must be positive".into());
        }
        if self.mmu.max_retries < 2 {
            return Err("mmu.max_retries must be >= 2".into());
        }
        if self.mmu.safety_timer_minutes == 0 {
            return Err("mmu.safety_timer_minutes must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud, 115_200);
        assert_eq!(config.mmu.safety_timer_minutes, 30);
        assert_eq!(config.mmu.max_retries, 3);
    }

    #[test]
    fn test_parse_legacy_config() {
        let legacy_config = r#"
# MMU configuration
serial = /dev/ttyUSB0
baud = 115200
heatbreak_length_mm = 67.0
safety_timer_minutes = 30
max_retries = 3
        "#;

        let config = Config::parse_legacy_config(legacy_config).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.mmu.heatbreak_length_mm, 67.0);
        assert_eq!(config.mmu.max_retries, 3);
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_config = r#"
[serial]
port = "/dev/ttyUSB0"
baud = 115200

[mmu]
heatbreak_length_mm = 67.0
max_retries = 4
        "#;

        let config = Config::parse_toml(toml_config).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.mmu.max_retries, 4);
    }

    #[test]
    fn test_verify_load_distance() {
        let config = MmuConfig::default();
        // 67.0 - 8.0 + (-35.0) == 24.0
        assert_eq!(config.verify_load_distance_mm(), 24.0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.mmu.max_retries = 1;
        assert!(config.validate().is_err());
        config.mmu.max_retries = 3;

        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }
}
