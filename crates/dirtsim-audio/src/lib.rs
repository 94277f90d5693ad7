//! dirtsim-audio - polyphonic tone synthesis service.
//!
//! The engine renders up to 16 voices into the output device; NoteOn and
//! NoteOff arrive over WebSocket and cross into the render callback
//! through a lock-free command ring.

pub mod commands;
pub mod engine;
pub mod pool;
pub mod voice;

pub use commands::{AudioCommand, CommandSender, COMMAND_QUEUE_CAPACITY};
pub use engine::{list_output_devices, AudioEngine, AudioEngineConfig, AudioEngineError, AudioHandle};
pub use pool::{VoicePool, VOICE_COUNT};
pub use voice::Voice;
