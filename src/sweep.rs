//! Repeating runs across a range of vehicle counts.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::run::{DiagramPoint, RunController};
use serde::{Deserialize, Serialize};

/// What happens to a sweep when one of its runs fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the sweep on the first failed run.
    #[default]
    FailFast,
    /// Skip the failed run and continue.
    FailSoft,
}

/// The swept vehicle counts, `start..stop` in increments of `step`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// The first vehicle count.
    pub start: usize,
    /// The exclusive upper bound.
    pub stop: usize,
    /// The increment between counts.
    pub step: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start: 3,
            stop: 138,
            step: 5,
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

impl SweepConfig {
    /// Gets the vehicle counts in sweep order.
    ///
    /// Fails with [Error::InvalidParameter] if the range is empty, has a zero step,
    /// or includes a count of zero.
    pub fn vehicle_counts(&self) -> Result<Vec<usize>> {
        if self.step == 0 {
            return Err(Error::invalid("sweep step must be positive"));
        }
        if self.start == 0 {
            return Err(Error::invalid("sweep must start at one vehicle or more"));
        }
        let counts = (self.start..self.stop).step_by(self.step).collect::<Vec<_>>();
        if counts.is_empty() {
            return Err(Error::invalid(format!(
                "sweep range {}..{} is empty",
                self.start, self.stop
            )));
        }
        Ok(counts)
    }
}

/// A measured fundamental diagram.
///
/// `vehicle_counts`, `densities` and `flows` are index-aligned and in sweep order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalDiagram {
    pub vehicle_counts: Vec<usize>,
    pub densities: Vec<f64>,
    pub flows: Vec<f64>,
    /// Vehicle counts whose runs failed and were skipped.
    pub skipped: Vec<usize>,
}

impl FundamentalDiagram {
    /// Appends a point to the curve.
    pub fn push(&mut self, point: DiagramPoint) {
        self.vehicle_counts.push(point.vehicle_count);
        self.densities.push(point.density);
        self.flows.push(point.flow);
    }

    /// The number of points on the curve.
    pub fn len(&self) -> usize {
        self.densities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.densities.is_empty()
    }

    /// Iterates over the points of the curve.
    pub fn points(&self) -> impl Iterator<Item = DiagramPoint> + '_ {
        itertools::izip!(&self.vehicle_counts, &self.densities, &self.flows).map(
            |(&vehicle_count, &density, &flow)| DiagramPoint {
                vehicle_count,
                density,
                flow,
            },
        )
    }
}

/// Runs `controller` once per vehicle count, in order, collecting the diagram.
pub fn sweep<E: Engine>(
    controller: &mut RunController<E>,
    vehicle_counts: &[usize],
    policy: FailurePolicy,
) -> Result<FundamentalDiagram> {
    if vehicle_counts.is_empty() {
        return Err(Error::invalid("no vehicle counts to sweep"));
    }
    log::info!(
        "sweeping {} vehicle counts from {} to {}",
        vehicle_counts.len(),
        vehicle_counts[0],
        vehicle_counts[vehicle_counts.len() - 1]
    );

    let mut diagram = FundamentalDiagram::default();
    for &vehicle_count in vehicle_counts {
        match controller.run(vehicle_count) {
            Ok(point) => diagram.push(point),
            Err(err) => match policy {
                FailurePolicy::FailFast => {
                    return Err(Error::RunFailed {
                        vehicle_count,
                        source: Box::new(err),
                    });
                }
                FailurePolicy::FailSoft => {
                    log::warn!("skipping {vehicle_count} vehicles: {err}");
                    diagram.skipped.push(vehicle_count);
                }
            },
        }
    }

    log::info!(
        "sweep complete: {} points, {} skipped",
        diagram.len(),
        diagram.skipped.len()
    );
    Ok(diagram)
}
