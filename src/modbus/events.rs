use chrono::{DateTime, Local};
use std::fmt;

/// Which log pane an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogChannel {
    General,
    ModbusTrace,
}

impl fmt::Display for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogChannel::General => write!(f, "general"),
            LogChannel::ModbusTrace => write!(f, "modbus"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub channel: LogChannel,
    pub message: String,
}

impl LogEvent {
    pub fn new(channel: LogChannel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            channel,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_display_uses_clock_time() {
        let event = LogEvent {
            timestamp: Local.with_ymd_and_hms(2024, 5, 1, 9, 7, 3).unwrap(),
            channel: LogChannel::ModbusTrace,
            message: "[TX] Slave 1: ON - ESP32 (songoku)".to_string(),
        };
        assert_eq!(event.to_string(), "[09:07:03] [TX] Slave 1: ON - ESP32 (songoku)");
    }
}
