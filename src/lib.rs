//! Measures the fundamental diagram of a ring road by driving an external
//! microscopic traffic simulator through a fixed run protocol.

pub use config::{Config, OutputConfig, RingConfig};
pub use engine::{Engine, EngineConfig, EngineError, EngineSession, SpeedCommand, SumoEngine};
pub use error::{Error, Result};
pub use geometry::{Edge, RingGeometry};
pub use measurement::{RunSamples, SamplingStrategy};
pub use placement::{PlacementPolicy, VehiclePlacement};
pub use run::{DiagramPoint, NetworkConfig, ProtocolConfig, RunController};
pub use sweep::{sweep, FailurePolicy, FundamentalDiagram, SweepConfig};
pub use util::Interval;

pub mod chart;
mod config;
pub mod engine;
mod error;
mod geometry;
pub mod measurement;
pub mod placement;
mod run;
mod sweep;
mod util;
