//! Layered configuration
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. The `--config` file, if given
//! 3. Environment variables prefixed `KIWI_`, nested keys joined by `__`
//!    (`KIWI_INTERSECTION__ARRIVAL_DEBOUNCE_TICKS=3`)
//! 4. Command line arguments (`--width` sets the frame center)

use config::{Config, ConfigError, Environment, File};
use intersection::IntersectionConfig;
use maneuver::ManeuverConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vision::PresenceConfig;

use crate::cli::CliArgs;

/// Settings of the whole program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub intersection: IntersectionConfig,
    /// Debouncing of stop sign detections into presence updates
    pub stop_sign: PresenceConfig,
    pub maneuver: ManeuverConfig,
    pub bus: BusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Envelopes buffered per subscriber
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: kiwi_bus::DEFAULT_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Build the configuration for a command line
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        Self::load_with_env(args, Environment::with_prefix("KIWI"))
    }

    fn load_with_env(args: &CliArgs, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = &args.config {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path.as_path()));
        }

        let config: AppConfig = builder
            .add_source(
                env.prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override(
                "intersection.classifier.frame_center_x",
                f64::from(args.width) / 2.0,
            )?
            .build()?
            .try_deserialize()?;

        if config.bus.capacity == 0 {
            return Err(ConfigError::Message("bus.capacity must be at least 1".into()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;

    fn args(width: u32, config: Option<PathBuf>) -> CliArgs {
        let mut argv = vec![
            "--cid=111".to_string(),
            "--name=img.argb".to_string(),
            format!("--width={}", width),
            "--height=480".to_string(),
        ];
        if let Some(path) = config {
            argv.push(format!("--config={}", path.display()));
        }
        CliArgs::parse(argv).unwrap()
    }

    fn no_env() -> Environment {
        Environment::with_prefix("KIWI").source(Some(HashMap::new()))
    }

    #[test]
    fn test_defaults_with_frame_center_from_width() {
        let config = AppConfig::load_with_env(&args(1280, None), no_env()).unwrap();
        assert_eq!(config.intersection.classifier.frame_center_x, 640.0);
        assert_eq!(config.intersection.arrival_debounce_ticks, 4);
        assert_eq!(config.stop_sign.window, 20);
        assert_eq!(config.maneuver.speed, 0.14);
        assert_eq!(config.bus.capacity, kiwi_bus::DEFAULT_CAPACITY);
    }

    #[test]
    fn test_file_and_environment_layers() {
        let path = std::env::temp_dir().join(format!("kiwi-car-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "intersection": { "car_leave_cooldown_ticks": 3 },
                "maneuver": { "left_secs": 4.0 }
            }"#,
        )
        .unwrap();

        let env = Environment::with_prefix("KIWI").source(Some(HashMap::from([(
            "KIWI_MANEUVER__LEFT_SECS".to_string(),
            "5.5".to_string(),
        )])));
        let config = AppConfig::load_with_env(&args(640, Some(path.clone())), env).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.intersection.car_leave_cooldown_ticks, 3);
        assert_eq!(config.intersection.arrival_debounce_ticks, 4);
        assert_eq!(config.maneuver.left_secs, 5.5);
        assert_eq!(config.intersection.classifier.frame_center_x, 320.0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = PathBuf::from("/nonexistent/kiwi-car.toml");
        assert!(AppConfig::load_with_env(&args(640, Some(missing)), no_env()).is_err());
    }
}
