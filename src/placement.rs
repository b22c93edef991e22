//! Even spacing of vehicles around the ring.

use crate::error::{Error, Result};
use crate::geometry::{Edge, RingGeometry};
use serde::{Deserialize, Serialize};

/// The default minimum spacing below which [PlacementPolicy::MinimumGap] places nothing.
pub const DEFAULT_MIN_GAP: f64 = 5.0;

/// How vehicles are laid out when the ring gets crowded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// Always place every vehicle; global offsets wrap modulo the circumference.
    Wrapping,
    /// Stop placing vehicles once the spacing is at or below `min_gap`.
    /// Global offsets are not wrapped.
    MinimumGap {
        #[serde(default = "default_min_gap")]
        min_gap: f64,
    },
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self::Wrapping
    }
}

fn default_min_gap() -> f64 {
    DEFAULT_MIN_GAP
}

/// The initial location of one vehicle.
#[derive(Clone, Debug, PartialEq)]
pub struct VehiclePlacement {
    /// The vehicle's ID, unique within a run.
    pub vehicle_id: String,
    /// The edge the vehicle departs from.
    pub edge: Edge,
    /// The offset along `edge`, in `[0, C/2)`.
    pub local_offset: f64,
    /// The commanded speed at departure. Always zero.
    pub depart_speed: f64,
}

/// Gets the ID of the `index`-th vehicle of a run.
pub fn vehicle_id(index: usize) -> String {
    format!("car_{index}")
}

/// Plans the placement of `vehicle_count` vehicles evenly around the ring.
///
/// Under [PlacementPolicy::MinimumGap] the plan is cut short as soon as the spacing
/// drops to `min_gap`; since the spacing does not depend on the index, the plan is
/// then empty.
pub fn plan(
    vehicle_count: usize,
    geometry: &RingGeometry,
    policy: PlacementPolicy,
) -> Result<Vec<VehiclePlacement>> {
    if vehicle_count == 0 {
        return Err(Error::invalid("vehicle count must be positive"));
    }

    let circumference = geometry.circumference();
    let spacing = circumference / vehicle_count as f64;
    let mut placements = Vec::with_capacity(vehicle_count);

    for i in 0..vehicle_count {
        let global_offset = match policy {
            PlacementPolicy::Wrapping => (i as f64 * spacing).rem_euclid(circumference),
            PlacementPolicy::MinimumGap { min_gap } => {
                if spacing <= min_gap {
                    log::debug!(
                        "spacing {spacing:.3} is within the minimum gap {min_gap}; placed {i} of {vehicle_count}"
                    );
                    break;
                }
                i as f64 * spacing
            }
        };

        let (edge, local_offset) = geometry.locate(global_offset);
        placements.push(VehiclePlacement {
            vehicle_id: vehicle_id(i),
            edge,
            local_offset,
            depart_speed: 0.0,
        });
    }

    Ok(placements)
}
