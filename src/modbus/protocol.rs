use serde::{Deserialize, Serialize};
use std::fmt;

use super::crc::{crc16_modbus, crc16_wire_bytes};
use crate::utils::error::{ConfigError, FrameError};

pub const FUNC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;

/// Coil driven on every light actuator in this deployment.
pub const LIGHT_COIL_ADDRESS: u16 = 0x0000;

pub const WRITE_SINGLE_COIL_LEN: usize = 8;

/// Address, function code and the two CRC bytes.
pub const MIN_FRAME_LEN: usize = 4;

/// Modbus unit address, always within 1..=247.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlaveId(u8);

impl SlaveId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 247;

    pub fn new(address: u8) -> Result<Self, ConfigError> {
        if (Self::MIN..=Self::MAX).contains(&address) {
            Ok(Self(address))
        } else {
            Err(ConfigError::InvalidSlaveAddress(address))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for SlaveId {
    type Error = ConfigError;

    fn try_from(address: u8) -> Result<Self, Self::Error> {
        Self::new(address)
    }
}

impl From<SlaveId> for u8 {
    fn from(id: SlaveId) -> Self {
        id.0
    }
}

impl fmt::Display for SlaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoilCommand {
    pub slave: SlaveId,
    pub coil_address: u16,
    pub value: bool,
}

impl CoilCommand {
    pub fn light(slave: SlaveId, value: bool) -> Self {
        Self {
            slave,
            coil_address: LIGHT_COIL_ADDRESS,
            value,
        }
    }

    pub fn encode(&self) -> RtuFrame {
        encode_write_single_coil(self.slave, self.coil_address, self.value)
    }
}

/// A complete "Write Single Coil" request, CRC included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtuFrame([u8; WRITE_SINGLE_COIL_LEN]);

impl RtuFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn crc(&self) -> u16 {
        u16::from_le_bytes([self.0[6], self.0[7]])
    }
}

impl AsRef<[u8]> for RtuFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RtuFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self
            .0
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&hex)
    }
}

pub fn encode_write_single_coil(slave: SlaveId, coil_address: u16, value: bool) -> RtuFrame {
    let [addr_hi, addr_lo] = coil_address.to_be_bytes();
    let [value_hi, value_lo] = (if value { COIL_ON } else { COIL_OFF }).to_be_bytes();

    let mut frame = [
        slave.get(),
        FUNC_WRITE_SINGLE_COIL,
        addr_hi,
        addr_lo,
        value_hi,
        value_lo,
        0x00,
        0x00,
    ];

    let [crc_lo, crc_hi] = crc16_wire_bytes(&frame[..6]);
    frame[6] = crc_lo;
    frame[7] = crc_hi;

    RtuFrame(frame)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub slave_address: u8,
    pub function_code: u8,
    pub payload: Vec<u8>,
}

impl ParsedResponse {
    /// Modbus exception responses set the high bit of the function code.
    pub fn is_exception(&self) -> bool {
        self.function_code & 0x80 != 0
    }
}

pub fn decode_response(bytes: &[u8]) -> Result<ParsedResponse, FrameError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort {
            len: bytes.len(),
            min: MIN_FRAME_LEN,
        });
    }

    let data_len = bytes.len() - 2;
    let received = u16::from_le_bytes([bytes[data_len], bytes[data_len + 1]]);
    let calculated = crc16_modbus(&bytes[..data_len]);

    if received != calculated {
        return Err(FrameError::CrcMismatch {
            calculated,
            received,
        });
    }

    Ok(ParsedResponse {
        slave_address: bytes[0],
        function_code: bytes[1],
        payload: bytes[2..data_len].to_vec(),
    })
}
