const CRC_INIT: u16 = 0xFFFF;
const CRC_POLY: u16 = 0xA001;

/// Modbus RTU CRC16 (reflected polynomial 0xA001, initial value 0xFFFF).
pub fn crc16_modbus(data: &[u8]) -> u16 {
    data.iter().fold(CRC_INIT, |crc, &byte| {
        let mut crc = crc ^ u16::from(byte);
        for _ in 0..8 {
            let lsb = crc & 1;
            crc >>= 1;
            if lsb != 0 {
                crc ^= CRC_POLY;
            }
        }
        crc
    })
}

/// CRC in wire order: low byte first.
pub fn crc16_wire_bytes(data: &[u8]) -> [u8; 2] {
    crc16_modbus(data).to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_empty_input() {
        assert_eq!(crc16_modbus(&[]), 0xFFFF);
    }

    #[test]
    fn test_crc16_write_single_coil_on() {
        // 01 05 00 00 FF 00 8C 3A
        let data = [0x01, 0x05, 0x00, 0x00, 0xFF, 0x00];
        assert_eq!(crc16_modbus(&data), 0x3A8C);
    }

    #[test]
    fn test_crc16_write_single_coil_off() {
        let data = [0x02, 0x05, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(crc16_modbus(&data), 0xF9CD);
        assert_eq!(crc16_wire_bytes(&data), [0xCD, 0xF9]);
    }

    #[test]
    fn test_crc16_is_deterministic() {
        let data = [0x01, 0x03, 0x00, 0xF4, 0x00, 0x16];
        assert_eq!(crc16_modbus(&data), crc16_modbus(&data));
    }

    #[test]
    fn test_crc16_appended_frame_checks_to_zero() {
        let mut frame = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let crc = crc16_modbus(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(crc16_modbus(&frame), 0x0000);
    }
}
