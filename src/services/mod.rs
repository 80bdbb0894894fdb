pub mod blink_service;
pub mod light_zone;

pub use blink_service::{run_blink_test, BlinkPlan, BlinkReport, BlinkTask};
pub use light_zone::{LightZones, Zone};
