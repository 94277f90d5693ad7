//! Minimal configuration and runtime utilities for DirtSim.
//!
//! This crate is imported by every DirtSim service without creating
//! dependency cycles. It covers three ambient concerns:
//!
//! - **Logging channels** (`logging`): per-channel levels loaded from
//!   `logging-config.json`, with a `.local` override preferred when
//!   present, compiled into a `tracing` EnvFilter.
//! - **Work directories** (`workdir`): the OS-manager state directory and
//!   the file-permission ensurer for SSH key material.
//! - **Timers** (`timers`): named accumulating timers with an RAII scope
//!   guard, reported by the stats commands.

pub mod logging;
pub mod timers;
pub mod workdir;

pub use logging::{init_logging, LogLevel, LoggingConfig};
pub use timers::{ScopeTimer, TimerReport, Timers};
pub use workdir::WorkDir;
