// Feetech STS3215 serial protocol
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Status packet:  [0xFF, 0xFF, ID, Length, Error, Params..., Checksum]

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for Feetech servos
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 20;

/// Encoder resolution: 4096 steps per output revolution
pub const STEPS_PER_REVOLUTION: i32 = 4096;

/// Full-scale PWM command in PWM mode (GoalTime register)
pub const PWM_FULL_SCALE: i16 = 1000;

/// Largest goal magnitude accepted in multi-turn position mode
pub const MULTI_TURN_LIMIT: i32 = 30719;

const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Sign bit positions for sign-magnitude registers
const VELOCITY_SIGN_BIT: u8 = 15;
const POSITION_SIGN_BIT: u8 = 15;
const PWM_SIGN_BIT: u8 = 10;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// Register addresses for STS3215
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    MinAngleLimit = 9,    // 2 bytes, EEPROM
    MaxAngleLimit = 11,   // 2 bytes, EEPROM; both 0 = multi-turn
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 2=PWM
    TorqueEnable = 40,    // 1 byte: 0=off, 1=on
    GoalPosition = 42,    // 2 bytes (sign bit 15 in multi-turn)
    GoalTime = 44,        // 2 bytes, PWM duty in PWM mode (sign bit 10)
    GoalVelocity = 46,    // 2 bytes (sign bit 15)
    Lock = 55,            // 1 byte: 0=unlocked, 1=locked
    PresentPosition = 56, // 2 bytes, read-only
    PresentVelocity = 58, // 2 bytes, read-only (sign bit 15)
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Position and velocity read back in one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoFeedback {
    /// Single-turn position, 0..4095
    pub position: u16,
    /// Signed steps per second
    pub velocity: i16,
}

/// Serial connection to a chain of Feetech servos
pub struct FeetechBus {
    port: Box<dyn SerialPort>,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }

    /// Inverted low byte of the sum, header excluded
    fn checksum(data: &[u8]) -> u8 {
        let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        !sum
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // instruction + params + checksum
        let mut packet = Vec::with_capacity(6 + params.len());
        packet.extend_from_slice(&HEADER);
        packet.extend_from_slice(&[id, length, instruction as u8]);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));
        packet
    }

    /// Send one instruction and return the parameters of the status packet
    fn transact(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = Self::build_packet(id, instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        self.read_status(id)
    }

    fn read_exact_or_timeout(&mut self, id: u8, buf: &mut [u8]) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FeetechError::Timeout { id }
            } else {
                FeetechError::Io(e)
            }
        })
    }

    fn read_status(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.read_exact_or_timeout(expected_id, &mut head)?;
        if head[..2] != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", &head[..2]),
            });
        }

        let (id, length) = (head[2], head[3] as usize);
        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short for a status packet", length),
            });
        }

        // error byte + params + checksum
        let mut body = vec![0u8; length];
        self.read_exact_or_timeout(id, &mut body)?;

        let (checksum, payload) = (body[length - 1], &body[..length - 1]);
        let mut summed = vec![id, length as u8];
        summed.extend_from_slice(payload);
        if Self::checksum(&summed) != checksum {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        let status = payload[0];
        if status != 0 {
            return Err(FeetechError::ServoError { id, status });
        }
        Ok(payload[1..].to_vec())
    }

    /// Check whether a servo answers on the bus
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.transact(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to servo {}: reg={:?}, value={}", id, register, value);
        self.transact(id, Instruction::Write, &[register as u8, value])?;
        Ok(())
    }

    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        debug!("Write u16 to servo {}: reg={:?}, value={}", id, register, value);
        let [lo, hi] = value.to_le_bytes();
        self.transact(id, Instruction::Write, &[register as u8, lo, hi])?;
        Ok(())
    }

    fn read_bytes(&mut self, id: u8, register: Register, len: u8) -> Result<Vec<u8>> {
        let data = self.transact(id, Instruction::Read, &[register as u8, len])?;
        if data.len() < len as usize {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected {} bytes, got {}", len, data.len()),
            });
        }
        Ok(data)
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let data = self.read_bytes(id, register, 2)?;
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }

    /// Read present position and velocity in a single 4-byte read
    pub fn read_feedback(&mut self, id: u8) -> Result<ServoFeedback> {
        let data = self.read_bytes(id, Register::PresentPosition, 4)?;
        let position = u16::from_le_bytes([data[0], data[1]]) % STEPS_PER_REVOLUTION as u16;
        let velocity = decode_sign_magnitude(u16::from_le_bytes([data[2], data[3]]), VELOCITY_SIGN_BIT);
        Ok(ServoFeedback { position, velocity })
    }

    pub fn read_position(&mut self, id: u8) -> Result<u16> {
        Ok(self.read_u16(id, Register::PresentPosition)? % STEPS_PER_REVOLUTION as u16)
    }

    pub fn set_torque(&mut self, id: u8, enabled: bool) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, enabled as u8)?;
        self.write_u8(id, Register::Lock, enabled as u8)
    }

    /// Torque must be off while the mode changes
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.set_torque(id, false)?;
        self.write_u8(id, Register::OperatingMode, mode as u8)?;
        self.set_torque(id, true)
    }

    /// Zero both angle limits so position mode accepts goals past one turn.
    /// Torque off also unlocks the EEPROM for the write.
    pub fn enable_multi_turn(&mut self, id: u8) -> Result<()> {
        self.set_torque(id, false)?;
        self.write_u16(id, Register::MinAngleLimit, 0)?;
        self.write_u16(id, Register::MaxAngleLimit, 0)?;
        self.set_torque(id, true)
    }

    /// Multi-turn goal in steps, saturated at ±MULTI_TURN_LIMIT
    pub fn set_goal_position(&mut self, id: u8, steps: i32) -> Result<()> {
        self.write_u16(id, Register::GoalPosition, encode_goal_position(steps))
    }

    pub fn set_goal_velocity(&mut self, id: u8, steps_per_s: i16) -> Result<()> {
        self.write_u16(
            id,
            Register::GoalVelocity,
            encode_sign_magnitude(steps_per_s, VELOCITY_SIGN_BIT),
        )
    }

    /// Duty cycle in [-1, 1], only honoured in PWM mode
    pub fn set_goal_pwm(&mut self, id: u8, duty: f64) -> Result<()> {
        let pwm = (duty.clamp(-1.0, 1.0) * PWM_FULL_SCALE as f64).round() as i16;
        self.write_u16(id, Register::GoalTime, encode_sign_magnitude(pwm, PWM_SIGN_BIT))
    }
}

fn encode_goal_position(steps: i32) -> u16 {
    let steps = steps.clamp(-MULTI_TURN_LIMIT, MULTI_TURN_LIMIT) as i16;
    encode_sign_magnitude(steps, POSITION_SIGN_BIT)
}

/// Sign-magnitude encoding with the sign at `sign_bit`
fn encode_sign_magnitude(value: i16, sign_bit: u8) -> u16 {
    let mask = (1u16 << sign_bit) - 1;
    let magnitude = value.unsigned_abs().min(mask);
    if value < 0 {
        (1 << sign_bit) | magnitude
    } else {
        magnitude
    }
}

fn decode_sign_magnitude(raw: u16, sign_bit: u8) -> i16 {
    let mask = (1u16 << sign_bit) - 1;
    let magnitude = (raw & mask) as i16;
    if raw & (1 << sign_bit) != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ID=2, Length=4, READ, addr=56, len=4 -> ~(2+4+2+56+4) = ~68
        let data = [2u8, 4, 0x02, 56, 4];
        assert_eq!(FeetechBus::checksum(&data), !68u8);
    }

    #[test]
    fn test_checksum_wraps() {
        let data = [0xFFu8, 0x02, 0x01];
        // 0xFF + 2 + 1 = 0x102, low byte 0x02
        assert_eq!(FeetechBus::checksum(&data), !0x02u8);
    }

    #[test]
    fn test_velocity_sign_magnitude() {
        assert_eq!(encode_sign_magnitude(100, VELOCITY_SIGN_BIT), 100);
        assert_eq!(encode_sign_magnitude(-100, VELOCITY_SIGN_BIT), 0x8064);
        assert_eq!(decode_sign_magnitude(0x8064, VELOCITY_SIGN_BIT), -100);
        assert_eq!(decode_sign_magnitude(0x0064, VELOCITY_SIGN_BIT), 100);
    }

    #[test]
    fn test_pwm_sign_bit() {
        assert_eq!(encode_sign_magnitude(-500, PWM_SIGN_BIT), 0x0400 | 500);
        assert_eq!(decode_sign_magnitude(0x0400 | 500, PWM_SIGN_BIT), -500);
        // Magnitude saturates below the sign bit
        assert_eq!(encode_sign_magnitude(i16::MIN, PWM_SIGN_BIT), 0x07FF);
    }

    #[test]
    fn test_goal_position_encoding() {
        assert_eq!(encode_goal_position(4107), 4107);
        assert_eq!(encode_goal_position(-20), 0x8000 | 20);
        assert_eq!(encode_goal_position(40_000), MULTI_TURN_LIMIT as u16);
        assert_eq!(encode_goal_position(-40_000), 0x8000 | MULTI_TURN_LIMIT as u16);
    }

    #[test]
    fn test_build_read_packet() {
        let packet = FeetechBus::build_packet(2, Instruction::Read, &[56, 4]);
        assert_eq!(packet.len(), 8);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], 2); // ID
        assert_eq!(packet[3], 4); // instruction + 2 params + checksum
        assert_eq!(packet[4], Instruction::Read as u8);
        assert_eq!(packet[7], FeetechBus::checksum(&packet[2..7]));
    }
}
