//! Framing and value encoding for the TraCI wire protocol.
//!
//! A message is a big-endian `u32` total length (including itself) followed by one or
//! more commands. A command is `[len: u8][id: u8][content]`, or, when it does not fit
//! in a byte, `[0: u8][len: u32][id: u8][content]`.

use crate::engine::EngineError;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

pub const CMD_SIMSTEP: u8 = 0x02;
pub const CMD_CLOSE: u8 = 0x7f;
pub const CMD_GET_VEHICLE_VARIABLE: u8 = 0xa4;
pub const CMD_GET_EDGE_VARIABLE: u8 = 0xaa;
pub const CMD_SET_VEHICLE_VARIABLE: u8 = 0xc4;

/// Responses to "get" commands use the command ID offset by this amount.
pub const RESPONSE_OFFSET: u8 = 0x10;

pub const ID_LIST: u8 = 0x00;
pub const LAST_STEP_VEHICLE_ID_LIST: u8 = 0x12;
pub const VAR_SPEED: u8 = 0x40;
pub const ADD_FULL: u8 = 0x85;

pub const TYPE_INTEGER: u8 = 0x09;
pub const TYPE_DOUBLE: u8 = 0x0b;
pub const TYPE_STRING: u8 = 0x0c;
pub const TYPE_STRINGLIST: u8 = 0x0e;
pub const TYPE_COMPOUND: u8 = 0x0f;

pub const RTYPE_OK: u8 = 0x00;

/// Builds the content of a single command.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn ubyte(&mut self, value: u8) -> io::Result<&mut Self> {
        self.buf.write_u8(value)?;
        Ok(self)
    }

    pub fn int(&mut self, value: i32) -> io::Result<&mut Self> {
        self.buf.write_i32::<BigEndian>(value)?;
        Ok(self)
    }

    pub fn double(&mut self, value: f64) -> io::Result<&mut Self> {
        self.buf.write_f64::<BigEndian>(value)?;
        Ok(self)
    }

    pub fn string(&mut self, value: &str) -> io::Result<&mut Self> {
        self.int(length_i32(value.len())?)?;
        self.buf.write_all(value.as_bytes())?;
        Ok(self)
    }

    pub fn typed_int(&mut self, value: i32) -> io::Result<&mut Self> {
        self.ubyte(TYPE_INTEGER)?.int(value)
    }

    pub fn typed_double(&mut self, value: f64) -> io::Result<&mut Self> {
        self.ubyte(TYPE_DOUBLE)?.double(value)
    }

    pub fn typed_string(&mut self, value: &str) -> io::Result<&mut Self> {
        self.ubyte(TYPE_STRING)?.string(value)
    }

    pub fn compound(&mut self, items: i32) -> io::Result<&mut Self> {
        self.ubyte(TYPE_COMPOUND)?.int(items)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

fn length_i32(len: usize) -> io::Result<i32> {
    i32::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length overflow"))
}

/// Frames a command with its length prefix.
pub fn frame_command(id: u8, content: &[u8]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(content.len() + 6);
    let short_len = content.len() + 2;
    if short_len <= u8::MAX as usize {
        buf.write_u8(short_len as u8)?;
    } else {
        buf.write_u8(0)?;
        buf.write_i32::<BigEndian>(length_i32(content.len() + 6)?)?;
    }
    buf.write_u8(id)?;
    buf.write_all(content)?;
    Ok(buf)
}

/// Wraps framed commands into a message.
pub fn frame_message(commands: &[u8]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(commands.len() + 4);
    buf.write_u32::<BigEndian>(length_i32(commands.len() + 4)? as u32)?;
    buf.write_all(commands)?;
    Ok(buf)
}

/// Reads one complete message and returns its body.
pub fn read_message(stream: &mut impl Read) -> io::Result<Vec<u8>> {
    let len = stream.read_u32::<BigEndian>()? as usize;
    if len < 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message length {len} is shorter than its header"),
        ));
    }
    let mut body = vec![0; len - 4];
    stream.read_exact(&mut body)?;
    Ok(body)
}

/// Decodes the body of a response message.
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

fn truncated(err: io::Error) -> EngineError {
    EngineError::Protocol(format!("truncated response: {err}"))
}

impl<'a> Reader<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(body),
        }
    }

    pub fn ubyte(&mut self) -> Result<u8, EngineError> {
        self.cursor.read_u8().map_err(truncated)
    }

    pub fn int(&mut self) -> Result<i32, EngineError> {
        self.cursor.read_i32::<BigEndian>().map_err(truncated)
    }

    pub fn double(&mut self) -> Result<f64, EngineError> {
        self.cursor.read_f64::<BigEndian>().map_err(truncated)
    }

    pub fn string(&mut self) -> Result<String, EngineError> {
        let len = self.count()?;
        let mut bytes = vec![0; len];
        self.cursor.read_exact(&mut bytes).map_err(truncated)?;
        String::from_utf8(bytes).map_err(|err| EngineError::Protocol(err.to_string()))
    }

    pub fn string_list(&mut self) -> Result<Vec<String>, EngineError> {
        let len = self.count()?;
        (0..len).map(|_| self.string()).collect()
    }

    /// Reads a type tag, failing unless it is `expected`.
    pub fn expect_type(&mut self, expected: u8) -> Result<(), EngineError> {
        let found = self.ubyte()?;
        if found != expected {
            return Err(EngineError::Protocol(format!(
                "expected type 0x{expected:02x}, found 0x{found:02x}"
            )));
        }
        Ok(())
    }

    pub fn typed_double(&mut self) -> Result<f64, EngineError> {
        self.expect_type(TYPE_DOUBLE)?;
        self.double()
    }

    pub fn typed_string_list(&mut self) -> Result<Vec<String>, EngineError> {
        self.expect_type(TYPE_STRINGLIST)?;
        self.string_list()
    }

    /// Reads the status response to `command`, failing if the engine reported an error.
    pub fn status(&mut self, command: u8) -> Result<(), EngineError> {
        self.command_length()?;
        let id = self.ubyte()?;
        if id != command {
            return Err(EngineError::Protocol(format!(
                "status for 0x{id:02x} while awaiting 0x{command:02x}"
            )));
        }
        let result = self.ubyte()?;
        let description = self.string()?;
        if result != RTYPE_OK {
            return Err(EngineError::Rejected {
                command,
                description,
            });
        }
        Ok(())
    }

    /// Reads the header of a "get" response up to the value's type tag,
    /// returning the object ID the value belongs to.
    pub fn variable_header(&mut self, command: u8, variable: u8) -> Result<String, EngineError> {
        self.command_length()?;
        let id = self.ubyte()?;
        let expected = command.wrapping_add(RESPONSE_OFFSET);
        if id != expected {
            return Err(EngineError::Protocol(format!(
                "response 0x{id:02x} while awaiting 0x{expected:02x}"
            )));
        }
        let found = self.ubyte()?;
        if found != variable {
            return Err(EngineError::Protocol(format!(
                "variable 0x{found:02x} while awaiting 0x{variable:02x}"
            )));
        }
        self.string()
    }

    /// Reads a command length prefix and returns the length of the rest of the command.
    fn command_length(&mut self) -> Result<usize, EngineError> {
        match self.ubyte()? {
            0 => {
                let len = self.count()?;
                len.checked_sub(5)
                    .ok_or_else(|| EngineError::Protocol(format!("bad command length {len}")))
            }
            len => Ok(len as usize - 1),
        }
    }

    fn count(&mut self) -> Result<usize, EngineError> {
        let value = self.int()?;
        usize::try_from(value).map_err(|_| EngineError::Protocol(format!("negative length {value}")))
    }
}
