//! The static configuration of a sweep, loaded once per process.

use crate::engine::EngineConfig;
use crate::error::{Error, Result};
use crate::geometry::RingGeometry;
use crate::measurement;
use crate::placement::PlacementPolicy;
use crate::run::{NetworkConfig, ProtocolConfig};
use crate::sweep::SweepConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// The complete configuration of a sweep.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
    pub ring: RingConfig,
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
    pub placement: PlacementPolicy,
    pub sweep: SweepConfig,
    pub output: OutputConfig,
}

/// The ring road's dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RingConfig {
    /// The length of the loop in length units (m).
    pub circumference: f64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            circumference: 1000.0,
        }
    }
}

/// Where the results are written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// The rendered chart (SVG).
    pub chart: PathBuf,
    /// The measured curve (JSON).
    pub data: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            chart: PathBuf::from("fundamental_diagram.svg"),
            data: PathBuf::from("fundamental_diagram.json"),
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the configuration for nonsensical values before any engine is started.
    pub fn validate(&self) -> Result<()> {
        RingGeometry::new(self.ring.circumference)?;

        measurement::check_step_length(self.engine.step_length)?;

        if let PlacementPolicy::MinimumGap { min_gap } = self.placement {
            if !(min_gap.is_finite() && min_gap >= 0.0) {
                return Err(Error::invalid(format!(
                    "minimum gap must be non-negative, got {min_gap}"
                )));
            }
        }

        let names = [
            ("first route", &self.network.first_route),
            ("second route", &self.network.second_route),
            ("reference edge", &self.network.reference_edge),
        ];
        if let Some((what, _)) = names.iter().find(|(_, name)| name.is_empty()) {
            return Err(Error::invalid(format!("{what} must not be empty")));
        }

        self.sweep.vehicle_counts()?;
        Ok(())
    }
}
