//! The control interface of the external traffic simulation engine.
//!
//! The experiment never models vehicle dynamics itself. It drives an engine through
//! [Engine] (which opens sessions) and [EngineSession] (which controls one session).
//! The production binding is [SumoEngine], which talks TraCI to a SUMO process.

use std::ops::{Deref, DerefMut};
use thiserror::Error;

pub use traci::{EngineConfig, SumoEngine, TraciSession};

mod traci;

/// The speed value which hands control of a vehicle back to the engine's own model.
pub const RELEASE_SENTINEL: f64 = -1.0;

/// Errors raised by an engine or one of its sessions.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine process could not be spawned.
    #[error("failed to launch '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine never accepted a control connection.
    #[error("could not connect to {address} after {attempts} attempts: {source}")]
    Connect {
        address: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// The engine process exited before accepting a control connection.
    #[error("engine exited before accepting a connection ({0})")]
    Exited(std::process::ExitStatus),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine answered a command with an error status.
    #[error("command 0x{command:02x} rejected: {description}")]
    Rejected { command: u8, description: String },

    /// The engine sent something that could not be understood.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("unknown vehicle '{0}'")]
    UnknownVehicle(String),
}

/// A speed command for a single vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpeedCommand {
    /// Hold the vehicle at exactly this speed.
    Hold(f64),
    /// Return the vehicle to the engine's car-following model.
    Release,
}

impl SpeedCommand {
    /// The value sent to the engine for this command.
    pub fn engine_value(self) -> f64 {
        match self {
            SpeedCommand::Hold(speed) => speed,
            SpeedCommand::Release => RELEASE_SENTINEL,
        }
    }
}

/// A request to inject one vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleRequest<'a> {
    /// The vehicle ID; must not already exist in the session.
    pub id: &'a str,
    /// The route ID; must be known to the scenario.
    pub route: &'a str,
    /// The departure time in s.
    pub depart: f64,
    /// The offset along the first edge of the route.
    pub depart_offset: f64,
    /// The initial speed.
    pub depart_speed: f64,
}

/// Something that can start fresh simulation sessions.
pub trait Engine {
    type Session: EngineSession;

    /// Starts a new session. Every session returned must eventually be closed.
    fn start(&mut self) -> Result<Self::Session, EngineError>;
}

/// A live simulation session.
pub trait EngineSession {
    /// Injects a vehicle.
    fn add_vehicle(&mut self, request: &VehicleRequest) -> Result<(), EngineError>;

    /// Commands the speed of a vehicle.
    fn set_vehicle_speed(&mut self, id: &str, command: SpeedCommand) -> Result<(), EngineError>;

    /// Advances simulated time by one tick.
    fn step(&mut self) -> Result<(), EngineError>;

    /// The IDs of all vehicles currently in the network.
    fn vehicle_ids(&mut self) -> Result<Vec<String>, EngineError>;

    /// The instantaneous speed of a vehicle.
    fn vehicle_speed(&mut self, id: &str) -> Result<f64, EngineError>;

    /// The IDs of vehicles on the edge, leading vehicle first.
    fn edge_vehicle_ids(&mut self, edge: &str) -> Result<Vec<String>, EngineError>;

    /// Ends the session. Calling this more than once is harmless.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// Owns a session for the duration of a run and closes it exactly once,
/// either through [SessionGuard::close] or on drop.
pub struct SessionGuard<S: EngineSession> {
    session: S,
    closed: bool,
}

impl<S: EngineSession> SessionGuard<S> {
    /// Takes ownership of an open session.
    pub fn new(session: S) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    /// Closes the session, reporting any failure to do so.
    pub fn close(mut self) -> Result<(), EngineError> {
        self.closed = true;
        self.session.close()
    }
}

impl<S: EngineSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: EngineSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: EngineSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        log::debug!("closing engine session on an error path");
        if let Err(err) = self.session.close() {
            log::warn!("failed to close engine session: {err}");
        }
    }
}
