//! SUMO, driven over TraCI.

use self::codec::{Reader, Writer};
use super::{Engine, EngineError, EngineSession, SpeedCommand, VehicleRequest};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

mod codec;

/// The vehicle type injected vehicles are given.
const VEHICLE_TYPE: &str = "DEFAULT_VEHTYPE";

/// How to launch the engine for each session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// The engine executable, e.g. `sumo` or `sumo-gui`.
    pub binary: String,
    /// The scenario configuration describing the ring network and its routes.
    pub scenario: PathBuf,
    /// The duration of one simulation step in s.
    pub step_length: f64,
    /// Additional command line arguments passed to the engine.
    pub extra_args: Vec<String>,
    /// The TraCI port; a free port is picked when unset.
    pub port: Option<u16>,
    /// How many times to try connecting before giving up.
    pub connect_attempts: u32,
    /// The delay between connection attempts in ms.
    pub connect_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "sumo".to_string(),
            scenario: PathBuf::from("circles.sumocfg"),
            step_length: 1.0,
            extra_args: vec![],
            port: None,
            connect_attempts: 60,
            connect_delay_ms: 250,
        }
    }
}

/// Launches a new SUMO process for every session.
pub struct SumoEngine {
    config: EngineConfig,
}

impl SumoEngine {
    /// Creates a new engine launcher.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn command(&self, port: u16) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("-c")
            .arg(&self.config.scenario)
            .arg("--step-length")
            .arg(self.config.step_length.to_string())
            .arg("--remote-port")
            .arg(port.to_string())
            .args(&self.config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        command
    }
}

impl Engine for SumoEngine {
    type Session = TraciSession;

    fn start(&mut self) -> Result<TraciSession, EngineError> {
        let port = match self.config.port {
            Some(port) => port,
            None => free_port()?,
        };

        let mut child = self
            .command(port)
            .spawn()
            .map_err(|source| EngineError::Launch {
                binary: self.config.binary.clone(),
                source,
            })?;
        log::debug!("launched {} (pid {}) on port {port}", self.config.binary, child.id());

        let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let delay = Duration::from_millis(self.config.connect_delay_ms);
        match connect(address, self.config.connect_attempts, delay, Some(&mut child)) {
            Ok(stream) => Ok(TraciSession::new(stream, Some(child))),
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(err)
            }
        }
    }
}

/// Asks the OS for a port that is currently free.
fn free_port() -> Result<u16, EngineError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Connects to the engine, retrying while it starts up.
///
/// When the engine process is given, gives up as soon as it has exited.
fn connect(
    address: SocketAddr,
    attempts: u32,
    delay: Duration,
    mut child: Option<&mut Child>,
) -> Result<TcpStream, EngineError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let source = match TcpStream::connect(address) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(source) => source,
        };
        if let Some(child) = child.as_deref_mut() {
            if let Some(status) = child.try_wait()? {
                return Err(EngineError::Exited(status));
            }
        }
        if attempt >= attempts {
            return Err(EngineError::Connect {
                address: address.to_string(),
                attempts,
                source,
            });
        }
        attempt += 1;
        thread::sleep(delay);
    }
}

/// One TraCI connection, optionally owning the engine process behind it.
pub struct TraciSession {
    stream: TcpStream,
    child: Option<Child>,
    closed: bool,
}

impl TraciSession {
    fn new(stream: TcpStream, child: Option<Child>) -> Self {
        Self {
            stream,
            child,
            closed: false,
        }
    }

    /// Attaches to an engine that is already listening at `address`.
    /// The session does not own the engine process.
    pub fn attach(address: SocketAddr, attempts: u32, delay: Duration) -> Result<Self, EngineError> {
        Ok(Self::new(connect(address, attempts, delay, None)?, None))
    }

    /// Sends a single command and returns the body of the response message.
    fn exchange(&mut self, command: u8, content: &[u8]) -> Result<Vec<u8>, EngineError> {
        let message = codec::frame_message(&codec::frame_command(command, content)?)?;
        log::trace!("traci -> 0x{command:02x} ({} bytes)", message.len());
        self.stream.write_all(&message)?;
        let body = codec::read_message(&mut self.stream)?;
        log::trace!("traci <- {} bytes", body.len());
        Ok(body)
    }

    /// Sends a command whose response is a bare status.
    fn command(&mut self, command: u8, content: Writer) -> Result<(), EngineError> {
        let body = self.exchange(command, &content.into_bytes())?;
        Reader::new(&body).status(command)
    }

    /// Sends a "get" command and passes the reader, positioned at the value, to `read`.
    fn query<T>(
        &mut self,
        command: u8,
        variable: u8,
        object: &str,
        read: impl FnOnce(&mut Reader) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut content = Writer::new();
        content.ubyte(variable)?.string(object)?;
        let body = self.exchange(command, &content.into_bytes())?;
        let mut reader = Reader::new(&body);
        reader.status(command)?;
        reader.variable_header(command, variable)?;
        read(&mut reader)
    }
}

impl EngineSession for TraciSession {
    fn add_vehicle(&mut self, request: &VehicleRequest) -> Result<(), EngineError> {
        let depart = request.depart.to_string();
        let depart_pos = request.depart_offset.to_string();
        let depart_speed = request.depart_speed.to_string();
        let strings: [&str; 12] = [
            request.route,
            VEHICLE_TYPE,
            depart.as_str(),
            "first",
            depart_pos.as_str(),
            depart_speed.as_str(),
            "current",
            "max",
            "current",
            "",
            "",
            "",
        ];

        let mut content = Writer::new();
        content
            .ubyte(codec::ADD_FULL)?
            .string(request.id)?
            .compound(strings.len() as i32 + 2)?;
        for value in strings {
            content.typed_string(value)?;
        }
        content.typed_int(0)?.typed_int(0)?;
        self.command(codec::CMD_SET_VEHICLE_VARIABLE, content)
    }

    fn set_vehicle_speed(&mut self, id: &str, command: SpeedCommand) -> Result<(), EngineError> {
        let mut content = Writer::new();
        content
            .ubyte(codec::VAR_SPEED)?
            .string(id)?
            .typed_double(command.engine_value())?;
        self.command(codec::CMD_SET_VEHICLE_VARIABLE, content)
    }

    fn step(&mut self) -> Result<(), EngineError> {
        let mut content = Writer::new();
        content.double(0.0)?;
        let body = self.exchange(codec::CMD_SIMSTEP, &content.into_bytes())?;
        let mut reader = Reader::new(&body);
        reader.status(codec::CMD_SIMSTEP)?;
        // Subscription results follow; none are ever requested.
        let subscriptions = reader.int()?;
        if subscriptions != 0 {
            log::trace!("ignoring {subscriptions} subscription results");
        }
        Ok(())
    }

    fn vehicle_ids(&mut self) -> Result<Vec<String>, EngineError> {
        self.query(codec::CMD_GET_VEHICLE_VARIABLE, codec::ID_LIST, "", |r| {
            r.typed_string_list()
        })
    }

    fn vehicle_speed(&mut self, id: &str) -> Result<f64, EngineError> {
        self.query(codec::CMD_GET_VEHICLE_VARIABLE, codec::VAR_SPEED, id, |r| {
            r.typed_double()
        })
    }

    fn edge_vehicle_ids(&mut self, edge: &str) -> Result<Vec<String>, EngineError> {
        self.query(
            codec::CMD_GET_EDGE_VARIABLE,
            codec::LAST_STEP_VEHICLE_ID_LIST,
            edge,
            |r| r.typed_string_list(),
        )
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self
            .exchange(codec::CMD_CLOSE, &[])
            .and_then(|body| Reader::new(&body).status(codec::CMD_CLOSE));

        if let Some(mut child) = self.child.take() {
            if result.is_err() {
                let _ = child.kill();
            }
            let status = child.wait()?;
            log::debug!("engine exited with {status}");
        }
        result
    }
}

impl Drop for TraciSession {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
