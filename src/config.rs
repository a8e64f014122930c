//! Driver configuration loaded from TOML.
//!
//! The global instance reads the file named by `NANODRIVER_CONFIG`; every
//! field is optional.
//!
//! ```toml
//! backend = "raspberry"
//! vref = 5.0
//! tick_interval_us = 100
//!
//! [spi]
//! clock_hz = 10000000
//!
//! [pins]
//! ldac = 22
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::device::reg::OFS_MAX;
use crate::error::{DriverError, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "NANODRIVER_CONFIG";

/// Where the driver sends its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process device model.
    #[default]
    Simulated,
    /// SPI and GPIO on a Raspberry Pi (feature `raspberry`).
    Raspberry,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    pub bus: u8,
    pub slave_select: u8,
    pub clock_hz: u32,
    /// SPI mode 0..=3. The AD5370 samples on the falling SCLK edge.
    pub mode: u8,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            bus: 0,
            slave_select: 0,
            clock_hz: 1_000_000,
            mode: 1,
        }
    }
}

/// BCM GPIO numbers of the control lines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub busy: u8,
    pub ldac: u8,
    pub reset: u8,
    pub clr: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            busy: 27,
            ldac: 22,
            reset: 23,
            clr: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub backend: Backend,
    /// Reference voltage in volts.
    pub vref: f64,
    /// Offset DAC for group 0 (14 bits).
    pub ofs0: u16,
    /// Offset DAC for groups 1 to 4 (14 bits).
    pub ofs1: u16,
    /// Runtime worker threads (0 = one per CPU).
    pub worker_threads: usize,
    /// Waveform update period in microseconds.
    pub tick_interval_us: u64,
    /// Depth of the waveform command queue.
    pub command_queue: usize,
    /// Pulse LDAC after every write made through the C interface.
    pub auto_load: bool,
    /// BUSY polls before a load fails (0 = don't poll).
    pub busy_poll_limit: u32,
    pub default_frequency_hz: u64,
    pub default_amplitude: u16,
    /// Append logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Filter directive used when `NANODRIVER_LOG` is unset.
    pub log_filter: Option<String>,
    pub spi: SpiConfig,
    pub pins: PinConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            vref: 4.0,
            ofs0: 0x1555,
            ofs1: 0x1555,
            worker_threads: 0,
            tick_interval_us: 50,
            command_queue: 16,
            auto_load: true,
            busy_poll_limit: 1000,
            default_frequency_hz: 1000,
            default_amplitude: 0x8888,
            log_file: None,
            log_filter: None,
            spi: SpiConfig::default(),
            pins: PinConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DriverConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DriverError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from `NANODRIVER_CONFIG`, or defaults when it is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Half the waveform update rate. Frequencies at or above it alias.
    pub fn nyquist_hz(&self) -> f64 {
        1e6 / (2.0 * self.tick_interval_us as f64)
    }

    /// Worker threads with 0 resolved to the CPU count.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.vref.is_finite() || self.vref <= 0.0 {
            return Err(DriverError::Config(format!(
                "vref must be positive, got {}",
                self.vref
            )));
        }
        for (name, value) in [("ofs0", self.ofs0), ("ofs1", self.ofs1)] {
            if value > OFS_MAX {
                return Err(DriverError::Config(format!(
                    "{name} {value:#06X} exceeds 14 bits"
                )));
            }
        }
        if self.tick_interval_us == 0 {
            return Err(DriverError::Config("tick_interval_us must be non-zero".into()));
        }
        if self.default_frequency_hz as f64 >= self.nyquist_hz() {
            return Err(DriverError::Config(format!(
                "default_frequency_hz {} needs a tick below {} us",
                self.default_frequency_hz,
                500_000 / self.default_frequency_hz.max(1)
            )));
        }
        if self.command_queue == 0 {
            return Err(DriverError::Config("command_queue must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_is_default() {
        let config = DriverConfig::from_toml_str("").unwrap();
        assert_eq!(config, DriverConfig::default());
        assert_eq!(config.backend, Backend::Simulated);
    }

    #[test]
    fn test_partial_document() {
        let config = DriverConfig::from_toml_str(
            r#"
            backend = "raspberry"
            vref = 5.0
            worker_threads = 2

            [spi]
            clock_hz = 10000000

            [pins]
            ldac = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, Backend::Raspberry);
        assert_eq!(config.vref, 5.0);
        assert_eq!(config.resolved_worker_threads(), 2);
        assert_eq!(config.spi.clock_hz, 10_000_000);
        assert_eq!(config.spi.bus, 0);
        assert_eq!(config.pins.ldac, 5);
        assert_eq!(config.pins.busy, 27);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            DriverConfig::from_toml_str("vref = -1.0"),
            Err(DriverError::Config(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str("ofs1 = 20000"),
            Err(DriverError::Config(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str("command_queue = 0"),
            Err(DriverError::Config(_))
        ));
        assert!(matches!(
            DriverConfig::from_toml_str("backend = \"ftdi\""),
            Err(DriverError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_default_frequency_below_nyquist() {
        let config = DriverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.nyquist_hz(), 10_000.0);
        assert!((config.default_frequency_hz as f64) < config.nyquist_hz());

        // One sample per period would hold a flat level.
        assert!(matches!(
            DriverConfig::from_toml_str("tick_interval_us = 1000"),
            Err(DriverError::Config(_))
        ));
        let config =
            DriverConfig::from_toml_str("tick_interval_us = 1000\ndefault_frequency_hz = 100")
                .unwrap();
        assert_eq!(config.nyquist_hz(), 500.0);
        DriverConfig::from_toml_str("tick_interval_us = 1000\ndefault_frequency_hz = 0").unwrap();
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_interval_us = 250").unwrap();
        let config = DriverConfig::load(file.path()).unwrap();
        assert_eq!(config.tick_interval_us, 250);

        assert!(matches!(
            DriverConfig::load("/nonexistent/nanodriver.toml"),
            Err(DriverError::ConfigIo { .. })
        ));
    }

    #[test]
    fn test_auto_worker_threads() {
        let config = DriverConfig::default();
        assert!(config.resolved_worker_threads() >= 1);
    }
}
