//! dirtsim-ui - the display and input process.
//!
//! Renders frames pushed by the server, forwards synth input to the
//! audio service, and answers its own WebSocket command surface
//! (screenshots, remote input, state queries).

pub mod links;
pub mod machine;
pub mod screen;
pub mod synth;

pub use links::{AudioLink, ServerLink};
pub use machine::{UiEvent, UiMachine, UiState};
pub use screen::Framebuffer;
