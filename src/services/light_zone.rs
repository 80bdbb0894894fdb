use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::modbus::master::ModbusMaster;
use crate::utils::error::MasterError;

/// Where a detected object was last seen relative to its watched region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Inside,
    Outside,
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inside" | "in" => Ok(Zone::Inside),
            "outside" | "out" => Ok(Zone::Outside),
            other => Err(format!("unknown zone '{}' (expected inside or outside)", other)),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Inside => write!(f, "INSIDE"),
            Zone::Outside => write!(f, "OUTSIDE"),
        }
    }
}

/// Drives a label's light from its zone transitions.
///
/// Leaving the region (any state but Outside, to Outside) switches the light
/// on. Returning (Outside to Inside) switches it off. Repeated reports of the
/// same zone, and a first report of Inside, write nothing.
pub struct LightZones {
    master: Arc<ModbusMaster>,
    last: HashMap<String, Zone>,
}

impl LightZones {
    pub fn new(master: Arc<ModbusMaster>) -> Self {
        Self {
            master,
            last: HashMap::new(),
        }
    }

    pub fn last_zone(&self, label: &str) -> Option<Zone> {
        self.last.get(&label.trim().to_lowercase()).copied()
    }

    /// Records `zone` for `label` and writes the coil on a transition.
    ///
    /// Returns the state written, or `None` when nothing was sent. The zone is
    /// tracked even while the master is disconnected; the light is then left
    /// alone.
    pub fn update(&mut self, label: &str, zone: Zone) -> Result<Option<bool>, MasterError> {
        let key = label.trim().to_lowercase();
        let previous = self.last.insert(key, zone);

        let target = match (previous, zone) {
            (Some(Zone::Outside), Zone::Outside) => None,
            (_, Zone::Outside) => Some(true),
            (Some(Zone::Outside), Zone::Inside) => Some(false),
            (_, Zone::Inside) => None,
        };

        let Some(on) = target else {
            return Ok(None);
        };
        if !self.master.is_connected() {
            debug!("{} went {} while disconnected, light untouched", label, zone);
            return Ok(None);
        }

        self.master.set_light_for_label(label, on)?;
        Ok(Some(on))
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::modbus::transport::mock::MockDriver;
    use crate::modbus::transport::{BaudRate, ConnectionConfig};

    fn zones(driver: &MockDriver, connect: bool) -> LightZones {
        let master = ModbusMaster::new(Box::new(driver.clone()), Config::default().slaves);
        if connect {
            master
                .connect(ConnectionConfig::new("COM7", BaudRate::B9600))
                .unwrap();
        }
        LightZones::new(Arc::new(master))
    }

    /// (slave, on) for each frame written
    fn writes(driver: &MockDriver) -> Vec<(u8, bool)> {
        driver.frames().iter().map(|f| (f[0], f[4] == 0xFF)).collect()
    }

    #[test]
    fn test_zone_parsing() {
        assert_eq!("Inside".parse::<Zone>(), Ok(Zone::Inside));
        assert_eq!(" out ".parse::<Zone>(), Ok(Zone::Outside));
        assert!("nowhere".parse::<Zone>().is_err());
    }

    #[test]
    fn test_first_outside_switches_on_once() {
        let driver = MockDriver::new();
        let mut zones = zones(&driver, true);

        assert_eq!(zones.update("songoku", Zone::Outside), Ok(Some(true)));
        assert_eq!(zones.update("songoku", Zone::Outside), Ok(None));
        assert_eq!(writes(&driver), vec![(1, true)]);
    }

    #[test]
    fn test_inside_switches_off_only_after_outside() {
        let driver = MockDriver::new();
        let mut zones = zones(&driver, true);

        assert_eq!(zones.update("dog", Zone::Inside), Ok(None));
        assert_eq!(zones.update("dog", Zone::Outside), Ok(Some(true)));
        assert_eq!(zones.update("dog", Zone::Inside), Ok(Some(false)));
        assert_eq!(zones.update("dog", Zone::Inside), Ok(None));
        assert_eq!(writes(&driver), vec![(2, true), (2, false)]);
    }

    #[test]
    fn test_labels_are_tracked_separately_and_ignore_case() {
        let driver = MockDriver::new();
        let mut zones = zones(&driver, true);

        zones.update("Songoku", Zone::Outside).unwrap();
        zones.update("dog", Zone::Outside).unwrap();
        assert_eq!(zones.update("SONGOKU", Zone::Outside), Ok(None));
        assert_eq!(zones.last_zone("songoku"), Some(Zone::Outside));
        assert_eq!(writes(&driver), vec![(1, true), (2, true)]);
    }

    #[test]
    fn test_disconnected_tracks_zone_without_writing() {
        let driver = MockDriver::new();
        let mut zones = zones(&driver, false);

        assert_eq!(zones.update("dog", Zone::Outside), Ok(None));
        assert_eq!(zones.last_zone("dog"), Some(Zone::Outside));
        assert!(driver.frames().is_empty());
    }

    #[test]
    fn test_unknown_label_is_reported_and_still_tracked() {
        let driver = MockDriver::new();
        let mut zones = zones(&driver, true);

        assert_eq!(
            zones.update("cat", Zone::Outside),
            Err(MasterError::UnknownLabel("cat".to_string()))
        );
        assert_eq!(zones.update("cat", Zone::Outside), Ok(None));
        assert!(driver.frames().is_empty());
    }

    #[test]
    fn test_reset_forgets_previous_zones() {
        let driver = MockDriver::new();
        let mut zones = zones(&driver, true);

        zones.update("dog", Zone::Outside).unwrap();
        zones.reset();
        assert_eq!(zones.last_zone("dog"), None);
        assert_eq!(zones.update("dog", Zone::Outside), Ok(Some(true)));
        assert_eq!(driver.frames().len(), 2);
    }
}
