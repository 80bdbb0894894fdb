pub mod senders;

pub use senders::{spawn_event_pump, ConsoleSink, EventSink, FileSink};
