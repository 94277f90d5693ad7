//! dirtsim-server - the simulation service.
//!
//! A deterministic cell world, a registry of scenarios (grid and
//! emulator-backed), an evolution trainer, and the render broadcast path,
//! all driven by one cooperative state machine over WebSocket commands.

pub mod evolution;
pub mod machine;
pub mod render;
pub mod scenario;
pub mod session;
pub mod settings;
pub mod world;

pub use machine::{register_handlers, ServerEvent, State, StateMachine};
pub use session::{ContainerSize, ScenarioSession};
pub use world::World;
