use crate::config::Config;
use crate::engine::{Engine, EngineSession, SessionGuard, SpeedCommand, VehicleRequest};
use crate::error::{Error, Result};
use crate::geometry::{Edge, RingGeometry};
use crate::measurement::{self, RunSamples, Sampler, SamplingStrategy};
use crate::placement::{self, PlacementPolicy, VehiclePlacement};
use serde::{Deserialize, Serialize};

/// The names the scenario gives to the ring's routes and edges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// The route of vehicles departing from the first edge.
    pub first_route: String,
    /// The route of vehicles departing from the second edge.
    pub second_route: String,
    /// The edge whose leading vehicle is watched for crossings.
    pub reference_edge: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            first_route: "ring_route".to_string(),
            second_route: "ring_route2".to_string(),
            reference_edge: "left".to_string(),
        }
    }
}

impl NetworkConfig {
    /// The route that starts on the given edge.
    pub fn route_for(&self, edge: Edge) -> &str {
        match edge {
            Edge::First => &self.first_route,
            Edge::Second => &self.second_route,
        }
    }
}

/// The timing of a single run, in engine steps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Steps taken with all vehicles held stationary after injection.
    pub settle_steps: usize,
    /// Steps taken after release whose output is discarded.
    pub warmup_steps: usize,
    /// Steps taken while sampling.
    pub measurement_steps: usize,
    /// What is sampled during measurement.
    pub sampling: SamplingStrategy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            settle_steps: 10,
            warmup_steps: 5000,
            measurement_steps: 5000,
            sampling: SamplingStrategy::EdgeCrossings,
        }
    }
}

/// One point of the fundamental diagram.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiagramPoint {
    /// The number of vehicles requested for the run.
    pub vehicle_count: usize,
    /// Vehicles per kilometre-equivalent.
    pub density: f64,
    /// Vehicles per hour.
    pub flow: f64,
}

/// Executes complete measurement runs, each in a fresh engine session.
pub struct RunController<'e, E: Engine> {
    engine: &'e mut E,
    geometry: RingGeometry,
    placement: PlacementPolicy,
    network: NetworkConfig,
    protocol: ProtocolConfig,
    step_length: f64,
}

impl<'e, E: Engine> RunController<'e, E> {
    /// Creates a run controller from the relevant configuration sections.
    ///
    /// Fails with [Error::InvalidParameter] on a bad ring or step length, before any
    /// session is opened.
    pub fn new(engine: &'e mut E, config: &Config) -> Result<Self> {
        measurement::check_step_length(config.engine.step_length)?;
        Ok(Self {
            engine,
            geometry: RingGeometry::new(config.ring.circumference)?,
            placement: config.placement,
            network: config.network.clone(),
            protocol: config.protocol.clone(),
            step_length: config.engine.step_length,
        })
    }

    /// The ring the runs take place on.
    pub fn geometry(&self) -> &RingGeometry {
        &self.geometry
    }

    /// Executes one run with `vehicle_count` vehicles and reduces it to a diagram point.
    ///
    /// The engine session is closed on every path out of this function.
    pub fn run(&mut self, vehicle_count: usize) -> Result<DiagramPoint> {
        let measurement_steps = self.protocol.measurement_steps;
        if measurement_steps == 0 {
            return Err(Error::degenerate(
                vehicle_count,
                "the measurement window is empty",
            ));
        }

        let placements = placement::plan(vehicle_count, &self.geometry, self.placement)?;
        if placements.is_empty() {
            return Err(Error::degenerate(
                vehicle_count,
                "no vehicles fit within the minimum gap",
            ));
        }

        log::info!(
            "run: {} vehicles, {} warm-up + {} measurement steps",
            placements.len(),
            self.protocol.warmup_steps,
            measurement_steps
        );

        let mut session = SessionGuard::new(self.engine.start()?);
        let samples = self.drive(&mut *session, &placements)?;
        session.close()?;

        let density = self.geometry.density(placements.len());
        let flow = measurement::reduce_flow(
            vehicle_count,
            density,
            &samples,
            measurement_steps,
            self.step_length,
        )?;

        log::info!(
            "run: {vehicle_count} vehicles -> density {density:.2}/km, flow {flow:.2}/h ({} samples)",
            samples.len()
        );

        Ok(DiagramPoint {
            vehicle_count,
            density,
            flow,
        })
    }

    /// Takes an open session through injection, settling, release, warm-up and measurement.
    fn drive(
        &self,
        session: &mut E::Session,
        placements: &[VehiclePlacement],
    ) -> Result<RunSamples> {
        for placement in placements {
            session.add_vehicle(&VehicleRequest {
                id: &placement.vehicle_id,
                route: self.network.route_for(placement.edge),
                depart: 0.0,
                depart_offset: placement.local_offset,
                depart_speed: placement.depart_speed,
            })?;
            session.set_vehicle_speed(
                &placement.vehicle_id,
                SpeedCommand::Hold(placement.depart_speed),
            )?;
        }

        log::debug!("settling for {} steps", self.protocol.settle_steps);
        advance(session, self.protocol.settle_steps)?;

        for placement in placements {
            session.set_vehicle_speed(&placement.vehicle_id, SpeedCommand::Release)?;
        }

        log::debug!("warming up for {} steps", self.protocol.warmup_steps);
        advance(session, self.protocol.warmup_steps)?;

        log::debug!(
            "measuring {:?} for {} steps",
            self.protocol.sampling,
            self.protocol.measurement_steps
        );
        let mut sampler = Sampler::new(self.protocol.sampling, &self.network.reference_edge);
        for _ in 0..self.protocol.measurement_steps {
            session.step()?;
            sampler.sample(session)?;
        }

        Ok(sampler.finish())
    }
}

fn advance(session: &mut impl EngineSession, steps: usize) -> Result<()> {
    for _ in 0..steps {
        session.step()?;
    }
    Ok(())
}
