//! Tests of the TraCI client against a scripted server on a loopback socket.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use traffic_fd::engine::{EngineError, EngineSession, SpeedCommand, TraciSession, VehicleRequest};

const SIMSTEP: u8 = 0x02;
const CLOSE: u8 = 0x7f;
const GET_VEHICLE: u8 = 0xa4;
const GET_EDGE: u8 = 0xaa;
const SET_VEHICLE: u8 = 0xc4;

/// A command received by the server: its ID and content.
type Received = (u8, Vec<u8>);

fn put_string(buf: &mut Vec<u8>, value: &str) {
    buf.write_i32::<BigEndian>(value.len() as i32).unwrap();
    buf.write_all(value.as_bytes()).unwrap();
}

fn get_string(cursor: &mut Cursor<&[u8]>) -> String {
    let len = cursor.read_i32::<BigEndian>().unwrap() as usize;
    let mut bytes = vec![0; len];
    cursor.read_exact(&mut bytes).unwrap();
    String::from_utf8(bytes).unwrap()
}

fn command(id: u8, content: &[u8]) -> Vec<u8> {
    let mut buf = vec![(content.len() + 2) as u8, id];
    buf.extend_from_slice(content);
    buf
}

fn status(id: u8, result: u8, description: &str) -> Vec<u8> {
    let mut content = vec![result];
    put_string(&mut content, description);
    command(id, &content)
}

fn string_list_response(id: u8, variable: u8, object: &str, values: &[&str]) -> Vec<u8> {
    let mut content = vec![variable];
    put_string(&mut content, object);
    content.push(0x0e);
    content.write_i32::<BigEndian>(values.len() as i32).unwrap();
    for value in values {
        put_string(&mut content, value);
    }
    let mut body = status(id, 0, "");
    body.extend(command(id + 0x10, &content));
    body
}

/// Serves one connection, answering each command with `respond` until a close arrives.
fn serve(
    respond: impl Fn(u8, &[u8]) -> Vec<u8> + Send + 'static,
) -> (SocketAddr, JoinHandle<Vec<Received>>) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let address = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = vec![];
        loop {
            let len = match stream.read_u32::<BigEndian>() {
                Ok(len) => len as usize,
                Err(_) => break,
            };
            let mut message = vec![0; len - 4];
            stream.read_exact(&mut message).unwrap();

            let mut cursor = Cursor::new(&message[..]);
            let content_len = match cursor.read_u8().unwrap() {
                0 => cursor.read_i32::<BigEndian>().unwrap() as usize - 6,
                short => short as usize - 2,
            };
            let id = cursor.read_u8().unwrap();
            let mut content = vec![0; content_len];
            cursor.read_exact(&mut content).unwrap();

            let body = respond(id, &content);
            let mut reply = vec![];
            reply.write_u32::<BigEndian>(body.len() as u32 + 4).unwrap();
            reply.extend(body);
            stream.write_all(&reply).unwrap();

            received.push((id, content));
            if id == CLOSE {
                break;
            }
        }
        received
    });
    (address, handle)
}

fn attach(address: SocketAddr) -> TraciSession {
    TraciSession::attach(address, 5, Duration::from_millis(20)).unwrap()
}

/// A server that accepts everything and reports two vehicles moving at 7.5 m/s.
fn agreeable(id: u8, content: &[u8]) -> Vec<u8> {
    match id {
        SIMSTEP => {
            let mut body = status(SIMSTEP, 0, "");
            body.write_i32::<BigEndian>(0).unwrap();
            body
        }
        GET_VEHICLE if content[0] == 0x00 => {
            string_list_response(GET_VEHICLE, 0x00, "", &["car_0", "car_1"])
        }
        GET_VEHICLE => {
            let mut cursor = Cursor::new(&content[1..]);
            let vehicle = get_string(&mut cursor);
            let mut value = vec![0x40];
            put_string(&mut value, &vehicle);
            value.push(0x0b);
            value.write_f64::<BigEndian>(7.5).unwrap();
            let mut body = status(GET_VEHICLE, 0, "");
            body.extend(command(GET_VEHICLE + 0x10, &value));
            body
        }
        GET_EDGE => string_list_response(GET_EDGE, 0x12, "left", &["car_1"]),
        other => status(other, 0, ""),
    }
}

/// Test a full session: injection, control, stepping, queries and close.
#[test]
fn session_round_trip() {
    let (address, server) = serve(agreeable);
    let mut session = attach(address);

    session
        .add_vehicle(&VehicleRequest {
            id: "car_0",
            route: "ring_route",
            depart: 0.0,
            depart_offset: 250.0,
            depart_speed: 0.0,
        })
        .unwrap();
    session
        .set_vehicle_speed("car_0", SpeedCommand::Hold(0.0))
        .unwrap();
    session.step().unwrap();
    session
        .set_vehicle_speed("car_0", SpeedCommand::Release)
        .unwrap();

    assert_eq!(session.vehicle_ids().unwrap(), vec!["car_0", "car_1"]);
    assert_eq!(session.vehicle_speed("car_1").unwrap(), 7.5);
    assert_eq!(session.edge_vehicle_ids("left").unwrap(), vec!["car_1"]);
    session.close().unwrap();
    // A second close is a no-op.
    session.close().unwrap();

    let received = server.join().unwrap();
    let ids = received.iter().map(|(id, _)| *id).collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            SET_VEHICLE,
            SET_VEHICLE,
            SIMSTEP,
            SET_VEHICLE,
            GET_VEHICLE,
            GET_VEHICLE,
            GET_EDGE,
            CLOSE
        ]
    );

    // Injection is a 14-item compound keyed by the vehicle ID.
    let mut add = Cursor::new(&received[0].1[..]);
    assert_eq!(add.read_u8().unwrap(), 0x85);
    assert_eq!(get_string(&mut add), "car_0");
    assert_eq!(add.read_u8().unwrap(), 0x0f);
    assert_eq!(add.read_i32::<BigEndian>().unwrap(), 14);
    assert_eq!(add.read_u8().unwrap(), 0x0c);
    assert_eq!(get_string(&mut add), "ring_route");

    // The step targets time zero, i.e. exactly one step.
    assert_eq!(received[2].1, 0.0f64.to_be_bytes());

    // Releasing control sends the engine's sentinel speed.
    let mut release = Cursor::new(&received[3].1[..]);
    assert_eq!(release.read_u8().unwrap(), 0x40);
    assert_eq!(get_string(&mut release), "car_0");
    assert_eq!(release.read_u8().unwrap(), 0x0b);
    assert_eq!(release.read_f64::<BigEndian>().unwrap(), -1.0);
}

/// Test that an error status is surfaced with the engine's description.
#[test]
fn rejected_command_is_reported() {
    let (address, server) = serve(|id, content| match id {
        SET_VEHICLE => status(SET_VEHICLE, 0xff, "Vehicle 'ghost' is not known"),
        _ => agreeable(id, content),
    });
    let mut session = attach(address);

    let err = session
        .set_vehicle_speed("ghost", SpeedCommand::Release)
        .unwrap_err();
    match err {
        EngineError::Rejected {
            command,
            description,
        } => {
            assert_eq!(command, SET_VEHICLE);
            assert!(description.contains("ghost"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    session.close().unwrap();
    server.join().unwrap();
}

/// Test that a response to the wrong command is a protocol error.
#[test]
fn mismatched_response_is_a_protocol_error() {
    let (address, server) = serve(|id, content| match id {
        SIMSTEP => status(CLOSE, 0, ""),
        _ => agreeable(id, content),
    });
    let mut session = attach(address);

    assert!(matches!(session.step(), Err(EngineError::Protocol(_))));

    session.close().unwrap();
    server.join().unwrap();
}

/// Test that attaching to nothing fails after the configured attempts.
#[test]
fn attach_gives_up() {
    let address = {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap()
    };
    let result = TraciSession::attach(address, 2, Duration::from_millis(10));
    assert!(matches!(
        result,
        Err(EngineError::Connect { attempts: 2, .. })
    ));
}

/// Test that an engine which exits at once is reported without waiting out the retries.
#[cfg(unix)]
#[test]
fn exited_engine_stops_retries() {
    use std::time::Instant;
    use traffic_fd::engine::{Engine, EngineConfig, SumoEngine};

    let mut engine = SumoEngine::new(EngineConfig {
        binary: "true".to_string(),
        connect_attempts: 400,
        connect_delay_ms: 50,
        ..Default::default()
    });

    let started = Instant::now();
    let result = engine.start();

    match result {
        Err(EngineError::Exited(status)) => assert!(status.success()),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("connected to an engine that is not running"),
    }
    assert!(started.elapsed() < Duration::from_secs(10));
}
