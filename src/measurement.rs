//! Per-step sampling of engine state and the reduction of samples to a flow value.

use crate::engine::{EngineError, EngineSession};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Seconds per hour, used to express flow per hour.
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Which quantity is sampled during the measurement window.
///
/// The two strategies feed different flow estimators and are never mixed in one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Mean instantaneous speed of all vehicles present; `flow = density * mean speed`.
    MeanSpeed,
    /// Leading-vehicle changes on the reference edge; `flow = crossings per hour`.
    #[default]
    EdgeCrossings,
}

/// The raw samples collected over one measurement window.
#[derive(Clone, Debug, PartialEq)]
pub enum RunSamples {
    /// One mean speed per step that had vehicles present.
    Speeds(Vec<f64>),
    /// The IDs of newly observed leading vehicles, in order of observation.
    Crossings(Vec<String>),
}

impl RunSamples {
    /// Creates an empty sample sequence for the strategy.
    pub fn new(strategy: SamplingStrategy) -> Self {
        match strategy {
            SamplingStrategy::MeanSpeed => RunSamples::Speeds(vec![]),
            SamplingStrategy::EdgeCrossings => RunSamples::Crossings(vec![]),
        }
    }

    /// The number of samples collected.
    pub fn len(&self) -> usize {
        match self {
            RunSamples::Speeds(speeds) => speeds.len(),
            RunSamples::Crossings(crossings) => crossings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Takes one sample per step from a session.
pub struct Sampler<'a> {
    reference_edge: &'a str,
    samples: RunSamples,
    leader: Option<String>,
}

impl<'a> Sampler<'a> {
    /// Creates a sampler. `reference_edge` is only consulted for crossing samples.
    pub fn new(strategy: SamplingStrategy, reference_edge: &'a str) -> Self {
        Self {
            reference_edge,
            samples: RunSamples::new(strategy),
            leader: None,
        }
    }

    /// Samples the session after a step.
    pub fn sample(&mut self, session: &mut impl EngineSession) -> std::result::Result<(), EngineError> {
        match &mut self.samples {
            RunSamples::Speeds(speeds) => {
                let ids = session.vehicle_ids()?;
                let speed_sum = ids
                    .iter()
                    .map(|id| session.vehicle_speed(id))
                    .sum::<std::result::Result<f64, _>>()?;
                if let Some(mean) = mean_of(speed_sum, ids.len()) {
                    log::trace!("mean speed {mean:.3} over {} vehicles", ids.len());
                    speeds.push(mean);
                }
            }
            RunSamples::Crossings(crossings) => {
                let ids = session.edge_vehicle_ids(self.reference_edge)?;
                if let Some(leader) = detect_crossing(&mut self.leader, &ids) {
                    log::trace!("{leader} crossed {}", self.reference_edge);
                    crossings.push(leader);
                }
            }
        }
        Ok(())
    }

    /// Finishes sampling and returns the collected samples.
    pub fn finish(self) -> RunSamples {
        self.samples
    }
}

fn mean_of(sum: f64, count: usize) -> Option<f64> {
    (count > 0).then(|| sum / count as f64)
}

/// Records a crossing when the leading vehicle on the reference edge differs from the
/// one last recorded, returning the new leader.
///
/// Only the leader is compared, so if more than one vehicle enters the edge between
/// two consecutive observations, only one crossing is counted.
pub fn detect_crossing(last_leader: &mut Option<String>, edge_vehicles: &[String]) -> Option<String> {
    let leader = edge_vehicles.first()?;
    if last_leader.as_deref() == Some(leader.as_str()) {
        return None;
    }
    *last_leader = Some(leader.clone());
    Some(leader.clone())
}

/// Speed-based flow: `density * mean(speeds)`.
pub fn speed_flow(vehicle_count: usize, density: f64, speeds: &[f64]) -> Result<f64> {
    let mean = mean_of(speeds.iter().sum(), speeds.len())
        .ok_or_else(|| Error::degenerate(vehicle_count, "no speed samples were collected"))?;
    Ok(density * mean)
}

/// Checks that a step length describes a positive, finite duration.
pub fn check_step_length(step_length: f64) -> Result<()> {
    if !(step_length.is_finite() && step_length > 0.0) {
        return Err(Error::invalid(format!(
            "step length must be positive, got {step_length}"
        )));
    }
    Ok(())
}

/// Crossing-based flow: crossings per hour of simulated time.
pub fn crossing_flow(
    vehicle_count: usize,
    crossings: usize,
    measurement_steps: usize,
    step_length: f64,
) -> Result<f64> {
    if measurement_steps == 0 {
        return Err(Error::degenerate(vehicle_count, "the measurement window is empty"));
    }
    check_step_length(step_length)?;
    let duration = measurement_steps as f64 * step_length;
    Ok(crossings as f64 * SECONDS_PER_HOUR / duration)
}

/// Reduces a run's samples to a flow value using the estimator matching their kind.
pub fn reduce_flow(
    vehicle_count: usize,
    density: f64,
    samples: &RunSamples,
    measurement_steps: usize,
    step_length: f64,
) -> Result<f64> {
    match samples {
        RunSamples::Speeds(speeds) => speed_flow(vehicle_count, density, speeds),
        RunSamples::Crossings(crossings) => {
            crossing_flow(vehicle_count, crossings.len(), measurement_steps, step_length)
        }
    }
}
