//! Audio-process command table and status shapes.

use serde::{Deserialize, Serialize};

use super::ApiCommand;
use crate::{impl_wire, impl_wire_enum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Triangle,
    Saw,
}

impl_wire_enum!(Waveform {
    0 => Sine,
    1 => Square,
    2 => Triangle,
    3 => Saw,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeState {
    #[default]
    Idle,
    Attack,
    Sustain,
    Release,
}

impl_wire_enum!(EnvelopeState {
    0 => Idle,
    1 => Attack,
    2 => Sustain,
    3 => Release,
});

/// Whether a sounding note is held or winding down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    #[default]
    Held,
    Releasing,
}

impl_wire_enum!(HoldState {
    0 => Held,
    1 => Releasing,
});

/// Start (or retrigger) a note.
///
/// `note_id == 0` allocates a fresh id, returned in the Okay. A
/// `duration_s <= 0` means hold until an explicit NoteOff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteOn {
    #[serde(default)]
    pub note_id: u32,
    pub frequency_hz: f64,
    pub amplitude: f64,
    #[serde(default)]
    pub attack_s: f64,
    #[serde(default)]
    pub duration_s: f64,
    #[serde(default)]
    pub release_s: f64,
    #[serde(default)]
    pub waveform: Waveform,
}
impl_wire!(NoteOn {
    note_id,
    frequency_hz,
    amplitude,
    attack_s,
    duration_s,
    release_s,
    waveform
});

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteOnOkay {
    pub note_id: u32,
}
impl_wire!(NoteOnOkay { note_id });

impl ApiCommand for NoteOn {
    const NAME: &'static str = "NoteOn";
    type Okay = NoteOnOkay;
}

/// Release a note; `note_id == 0` releases everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteOff {
    pub note_id: u32,
}
impl_wire!(NoteOff { note_id });
impl ApiCommand for NoteOff {
    const NAME: &'static str = "NoteOff";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveNote {
    pub note_id: u32,
    pub frequency_hz: f64,
    pub amplitude: f64,
    pub waveform: Waveform,
    pub envelope_state: EnvelopeState,
    pub hold_state: HoldState,
}
impl_wire!(ActiveNote {
    note_id,
    frequency_hz,
    amplitude,
    waveform,
    envelope_state,
    hold_state
});

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioStatus {
    pub active_notes: Vec<ActiveNote>,
    pub sample_rate: f64,
    pub device_name: String,
    pub master_volume_percent: i32,
}
impl_wire!(AudioStatus {
    active_notes,
    sample_rate,
    device_name,
    master_volume_percent
});

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioStatusGet {}
impl_wire!(AudioStatusGet {});
impl ApiCommand for AudioStatusGet {
    const NAME: &'static str = "AudioStatusGet";
    type Okay = AudioStatus;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MasterVolumeSet {
    pub volume_percent: i32,
}
impl_wire!(MasterVolumeSet { volume_percent });
impl ApiCommand for MasterVolumeSet {
    const NAME: &'static str = "MasterVolumeSet";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioDeviceList {}
impl_wire!(AudioDeviceList {});

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioDeviceListOkay {
    pub devices: Vec<String>,
}
impl_wire!(AudioDeviceListOkay { devices });

impl ApiCommand for AudioDeviceList {
    const NAME: &'static str = "AudioDeviceList";
    type Okay = AudioDeviceListOkay;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Wire;
    use pretty_assertions::assert_eq;

    #[test]
    fn note_on_roundtrip() {
        let cmd = NoteOn {
            note_id: 0,
            frequency_hz: 440.0,
            amplitude: 0.5,
            attack_s: 0.01,
            duration_s: 0.0,
            release_s: 0.2,
            waveform: Waveform::Saw,
        };
        assert_eq!(NoteOn::from_wire_bytes(&cmd.to_wire_bytes()).unwrap(), cmd);
    }

    #[test]
    fn note_on_json_defaults() {
        // Minimal JSON body: only frequency and amplitude.
        let cmd: NoteOn =
            serde_json::from_value(serde_json::json!({"frequency_hz": 440.0, "amplitude": 0.5}))
                .unwrap();
        assert_eq!(cmd.note_id, 0);
        assert_eq!(cmd.waveform, Waveform::Sine);
        assert_eq!(cmd.duration_s, 0.0);
    }

    #[test]
    fn status_roundtrip() {
        let status = AudioStatus {
            active_notes: vec![ActiveNote {
                note_id: 3,
                frequency_hz: 220.0,
                amplitude: 0.8,
                waveform: Waveform::Square,
                envelope_state: EnvelopeState::Sustain,
                hold_state: HoldState::Held,
            }],
            sample_rate: 48000.0,
            device_name: "default".into(),
            master_volume_percent: 80,
        };
        assert_eq!(
            AudioStatus::from_wire_bytes(&status.to_wire_bytes()).unwrap(),
            status
        );
    }
}
