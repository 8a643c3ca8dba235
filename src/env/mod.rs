mod environment;
mod sim;

pub use environment::{Environment, Step, StepInfo};
pub use sim::{SimConfig, SimulatedEnvironment};
