//! UI-process command table.

use serde::{Deserialize, Serialize};

use super::ApiCommand;
use crate::impl_wire;

/// Capture the current framebuffer. Only `"png"` is supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGrab {
    pub format: String,
}
impl_wire!(ScreenGrab { format });

impl Default for ScreenGrab {
    fn default() -> Self {
        Self {
            format: "png".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScreenGrabOkay {
    /// Base64-encoded image bytes.
    pub data: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
}
impl_wire!(ScreenGrabOkay {
    data,
    width,
    height,
    format
});

impl ApiCommand for ScreenGrab {
    const NAME: &'static str = "ScreenGrab";
    type Okay = ScreenGrabOkay;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MouseDown {
    pub x: f64,
    pub y: f64,
}
impl_wire!(MouseDown { x, y });
impl ApiCommand for MouseDown {
    const NAME: &'static str = "MouseDown";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MouseUp {
    pub x: f64,
    pub y: f64,
}
impl_wire!(MouseUp { x, y });
impl ApiCommand for MouseUp {
    const NAME: &'static str = "MouseUp";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MouseMove {
    pub x: f64,
    pub y: f64,
}
impl_wire!(MouseMove { x, y });
impl ApiCommand for MouseMove {
    const NAME: &'static str = "MouseMove";
    type Okay = ();
}

/// A synth-keyboard key transition. `key` is the label on the on-screen
/// keyboard ("C4", "F#3", ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SynthKeyPress {
    pub key: String,
    pub pressed: bool,
}
impl_wire!(SynthKeyPress { key, pressed });
impl ApiCommand for SynthKeyPress {
    const NAME: &'static str = "SynthKeyPress";
    type Okay = ();
}

/// Forwarded to the server's SimPause by the UI state machine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimPause {}
impl_wire!(SimPause {});
impl ApiCommand for SimPause {
    const NAME: &'static str = "SimPause";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimStop {}
impl_wire!(SimStop {});
impl ApiCommand for SimStop {
    const NAME: &'static str = "SimStop";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingResultDiscard {}
impl_wire!(TrainingResultDiscard {});
impl ApiCommand for TrainingResultDiscard {
    const NAME: &'static str = "TrainingResultDiscard";
    type Okay = ();
}
