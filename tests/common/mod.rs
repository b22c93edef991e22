//! A scripted engine double that records every command it receives.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use traffic_fd::engine::{Engine, EngineError, EngineSession, SpeedCommand, VehicleRequest};
use traffic_fd::Config;

/// A command observed by the double.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Start,
    Add {
        id: String,
        route: String,
        offset: f64,
        speed: f64,
    },
    Speed {
        id: String,
        command: SpeedCommand,
    },
    Step,
    Close,
}

/// Where the double should fail.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Fault {
    /// `start` fails, whatever the vehicle count.
    Start,
    /// The `n`-th `add_vehicle` call of a session fails, whatever the vehicle count.
    Add(usize),
    /// The `n`-th `step` call of a session fails.
    Step(usize),
}

/// Which vehicles sit on the reference edge after the `n`-th step of a session,
/// given the vehicles in the session.
pub type EdgeScript = Rc<dyn Fn(usize, &[String]) -> Vec<String>>;

pub struct RingDouble {
    pub events: Rc<RefCell<Vec<Event>>>,
    /// The speed of vehicles under the engine's own control.
    pub cruise_speed: f64,
    pub edge_script: EdgeScript,
    /// Faults, optionally restricted to sessions holding the given number of vehicles.
    pub faults: Vec<(Option<usize>, Fault)>,
}

impl RingDouble {
    pub fn new() -> Self {
        Self {
            events: Default::default(),
            cruise_speed: 10.0,
            edge_script: Rc::new(|_: usize, _: &[String]| -> Vec<String> { Vec::new() }),
            faults: vec![],
        }
    }

    pub fn with_edge_script(mut self, script: impl Fn(usize, &[String]) -> Vec<String> + 'static) -> Self {
        self.edge_script = Rc::new(script);
        self
    }

    pub fn with_fault(mut self, vehicle_count: Option<usize>, fault: Fault) -> Self {
        self.faults.push((vehicle_count, fault));
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }

    pub fn steps(&self) -> usize {
        self.count(&Event::Step)
    }
}

impl Engine for RingDouble {
    type Session = DoubleSession;

    fn start(&mut self) -> Result<DoubleSession, EngineError> {
        if self.faults.iter().any(|(_, f)| *f == Fault::Start) {
            return Err(EngineError::Protocol("engine refused to start".to_string()));
        }
        self.events.borrow_mut().push(Event::Start);
        Ok(DoubleSession {
            events: self.events.clone(),
            cruise_speed: self.cruise_speed,
            edge_script: self.edge_script.clone(),
            faults: self.faults.clone(),
            vehicles: vec![],
            adds: 0,
            steps: 0,
        })
    }
}

struct Vehicle {
    id: String,
    held: Option<f64>,
}

pub struct DoubleSession {
    events: Rc<RefCell<Vec<Event>>>,
    cruise_speed: f64,
    edge_script: EdgeScript,
    faults: Vec<(Option<usize>, Fault)>,
    vehicles: Vec<Vehicle>,
    adds: usize,
    steps: usize,
}

impl DoubleSession {
    fn faulted(&self, fault: Fault) -> bool {
        let count = self.vehicles.len();
        self.faults
            .iter()
            .any(|(n, f)| *f == fault && n.map_or(true, |n| n == count))
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    fn ids(&self) -> Vec<String> {
        self.vehicles.iter().map(|v| v.id.clone()).collect()
    }
}

impl EngineSession for DoubleSession {
    fn add_vehicle(&mut self, request: &VehicleRequest) -> Result<(), EngineError> {
        self.adds += 1;
        if self
            .faults
            .iter()
            .any(|(_, f)| *f == Fault::Add(self.adds))
        {
            return Err(EngineError::Rejected {
                command: 0xc4,
                description: format!("cannot add '{}'", request.id),
            });
        }
        if self.vehicles.iter().any(|v| v.id == request.id) {
            return Err(EngineError::Rejected {
                command: 0xc4,
                description: format!("duplicate vehicle '{}'", request.id),
            });
        }
        self.record(Event::Add {
            id: request.id.to_string(),
            route: request.route.to_string(),
            offset: request.depart_offset,
            speed: request.depart_speed,
        });
        self.vehicles.push(Vehicle {
            id: request.id.to_string(),
            held: Some(request.depart_speed),
        });
        Ok(())
    }

    fn set_vehicle_speed(&mut self, id: &str, command: SpeedCommand) -> Result<(), EngineError> {
        let vehicle = self
            .vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| EngineError::UnknownVehicle(id.to_string()))?;
        vehicle.held = match command {
            SpeedCommand::Hold(speed) => Some(speed),
            SpeedCommand::Release => None,
        };
        self.record(Event::Speed {
            id: id.to_string(),
            command,
        });
        Ok(())
    }

    fn step(&mut self) -> Result<(), EngineError> {
        self.steps += 1;
        if self.faulted(Fault::Step(self.steps)) {
            return Err(EngineError::Protocol("engine crashed".to_string()));
        }
        self.record(Event::Step);
        Ok(())
    }

    fn vehicle_ids(&mut self) -> Result<Vec<String>, EngineError> {
        Ok(self.ids())
    }

    fn vehicle_speed(&mut self, id: &str) -> Result<f64, EngineError> {
        let vehicle = self
            .vehicles
            .iter()
            .find(|v| v.id == id)
            .ok_or_else(|| EngineError::UnknownVehicle(id.to_string()))?;
        Ok(vehicle.held.unwrap_or(self.cruise_speed))
    }

    fn edge_vehicle_ids(&mut self, _edge: &str) -> Result<Vec<String>, EngineError> {
        Ok((self.edge_script)(self.steps, &self.ids()))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.record(Event::Close);
        Ok(())
    }
}

/// A configuration with short phases suitable for the double.
pub fn short_config() -> Config {
    let mut config = Config::default();
    config.protocol.settle_steps = 10;
    config.protocol.warmup_steps = 20;
    config.protocol.measurement_steps = 30;
    config
}
