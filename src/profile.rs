//! Bindings for individual BlueZ interfaces.

pub mod agent;
pub mod thermometer;

pub use agent::{Agent1, Agent1Properties, AGENT1_INTERFACE};
pub use thermometer::{Thermometer1, Thermometer1Properties, THERMOMETER1_INTERFACE};
