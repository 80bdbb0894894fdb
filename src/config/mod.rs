pub mod settings;

pub use settings::{
    find_slave_by_address, find_slave_by_label, BlinkSettings, Config, ParityConfig, SlaveBinding,
};
