use crate::error::{Error, Result};
use crate::util::Interval;
use serde::{Deserialize, Serialize};

/// Length units per kilometre-equivalent, used to normalise density.
const UNITS_PER_KM: f64 = 1000.0;

/// One of the two equal-length edges making up the ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// Covers global offsets `[0, C/2)`.
    First,
    /// Covers global offsets `[C/2, C)`.
    Second,
}

/// The geometry of a closed ring road built from two symmetric edges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RingGeometry {
    /// The length of the loop in length units.
    circumference: f64,
}

impl RingGeometry {
    /// Creates a new ring geometry.
    ///
    /// Fails with [Error::InvalidParameter] unless `circumference` is finite and positive.
    pub fn new(circumference: f64) -> Result<Self> {
        if !(circumference.is_finite() && circumference > 0.0) {
            return Err(Error::invalid(format!(
                "circumference must be positive, got {circumference}"
            )));
        }
        Ok(Self { circumference })
    }

    /// The length of the loop.
    pub fn circumference(&self) -> f64 {
        self.circumference
    }

    /// The length of each edge.
    pub fn half_circumference(&self) -> f64 {
        0.5 * self.circumference
    }

    /// The range of valid local offsets along either edge.
    pub fn edge_span(&self) -> Interval<f64> {
        Interval::new(0.0, self.half_circumference())
    }

    /// Maps a global offset around the ring to an edge and an offset along that edge.
    ///
    /// The offset is expected to lie in `[0, circumference)`.
    pub fn locate(&self, global_offset: f64) -> (Edge, f64) {
        let half = self.half_circumference();
        if global_offset < half {
            (Edge::First, global_offset)
        } else {
            (Edge::Second, global_offset - half)
        }
    }

    /// Vehicles per kilometre-equivalent for the given vehicle count.
    pub fn density(&self, vehicle_count: usize) -> f64 {
        vehicle_count as f64 / (self.circumference / UNITS_PER_KM)
    }
}
