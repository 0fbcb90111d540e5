//! Exercise events: typed event enum, broadcast bus, append-only history.

pub mod bus;
pub mod history;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use history::{EventLog, SharedEventLog};
pub use types::ExerciseEvent;
