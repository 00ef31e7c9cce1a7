//! Run orchestration: the page loop and the state it mutates.

mod controller;
mod state;

pub use controller::{HarvestController, ShutdownHandle};
pub use state::{PageEmission, RunState};
