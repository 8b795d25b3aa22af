//! Event notification
//!
//! - `EventBus`: generic publish/subscribe over a declared set of names
//! - `RecorderEvent`: the payloads a recorder publishes, with their names

pub mod bus;
pub mod recorder_event;

pub use bus::{EventBus, Handler, HandlerId};
pub use recorder_event::{RecorderEvent, RECORDER_EVENTS};
