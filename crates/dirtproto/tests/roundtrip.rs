//! Envelope round-trip coverage across the declared protocol types.

use dirtproto::api::audio::{NoteOn, Waveform};
use dirtproto::api::events::TrainingBestSnapshot;
use dirtproto::api::osman::RemoteCliRun;
use dirtproto::api::server::{SimRun, StatusOkay};
use dirtproto::render::{
    BasicCell, OrganismData, RenderFormat, RenderMessage, RenderMessageFull, ScenarioVideoFrame,
};
use dirtproto::scenario::{ScenarioConfig, ScenarioId};
use dirtproto::world::{Cell, Material, Vec2, WorldData};
use dirtproto::{ApiError, Envelope, MessageKind, Wire};
use pretty_assertions::assert_eq;

fn roundtrip<T: Wire + PartialEq + std::fmt::Debug>(value: &T) {
    let bytes = value.to_wire_bytes();
    let back = T::from_wire_bytes(&bytes).expect("decode");
    assert_eq!(&back, value);
}

#[test]
fn envelope_with_command_payload() {
    let cmd = SimRun {
        scenario_id: ScenarioId::Sandbox,
        scenario_config: Some(ScenarioConfig::default_for(ScenarioId::Sandbox)),
        timestep: 0.016,
        max_steps: -1,
        max_frame_ms: Some(16),
    };
    let envelope = Envelope::command(12, "SimRun", cmd.to_wire_bytes());
    let bytes = envelope.to_wire_bytes();
    let back = Envelope::from_wire_bytes(&bytes).unwrap();
    assert_eq!(back.kind, MessageKind::Command);
    assert_eq!(back.correlation_id, 12);
    let decoded = SimRun::from_wire_bytes(&back.payload).unwrap();
    assert_eq!(decoded, cmd);
}

#[test]
fn render_message_with_and_without_video_frame() {
    let mut payload = Vec::new();
    for index in 0..4u8 {
        BasicCell {
            material: index % 3,
            fill: index * 40,
            render_as: -1,
            color: 0xFF00FF00u32.wrapping_add(index as u32),
        }
        .write_to(&mut payload);
    }
    let mut message = RenderMessage {
        format: RenderFormat::Basic,
        width: 2,
        height: 2,
        timestep: 10,
        fps_server: 58.8,
        payload,
        organisms: vec![OrganismData {
            organism_id: 2,
            cell_indices: vec![1, 3],
        }],
        bones: Vec::new(),
        tree_vision: None,
        entities: Vec::new(),
        scenario_video_frame: None,
    };
    roundtrip(&message);

    message.scenario_video_frame = Some(ScenarioVideoFrame {
        width: 256,
        height: 240,
        frame_id: 77,
        pixels: vec![0x1F; 64],
    });
    roundtrip(&message);
}

#[test]
fn render_message_full_carries_scenario_identity() {
    let full = RenderMessageFull {
        scenario_id: ScenarioId::Raining,
        scenario_config: ScenarioConfig::default_for(ScenarioId::Raining),
        message: RenderMessage::default(),
    };
    roundtrip(&full);
}

#[test]
fn training_best_snapshot_with_nested_optionals() {
    let snapshot = TrainingBestSnapshot {
        world: WorldData {
            width: 3,
            height: 1,
            timestep: 9,
            cells: vec![
                Cell::default(),
                Cell {
                    material: Material::Water,
                    fill_ratio: 0.4,
                    com: Vec2::new(0.2, 0.0),
                    velocity: Vec2::new(0.0, -1.0),
                    pressure: 10.0,
                    pressure_gradient: Vec2::default(),
                },
                Cell::of_material(Material::Dirt, 1.0),
            ],
            entities: Vec::new(),
            bones: Vec::new(),
            tree_vision: None,
            scenario_video_frame: Some(ScenarioVideoFrame {
                width: 2,
                height: 2,
                frame_id: 5,
                pixels: vec![1, 2, 3, 4, 5, 6, 7, 8],
            }),
        },
        organism_ids: vec![1],
        fitness: 99.5,
        generation: 12,
        scenario_video_frame: None,
    };
    roundtrip(&snapshot);
}

#[test]
fn remote_cli_run_command_roundtrip() {
    roundtrip(&RemoteCliRun {
        host: "dirtsim2".into(),
        args: vec!["server".into(), "GenomeList".into()],
        timeout_ms: 1234,
    });
}

#[test]
fn note_on_all_waveforms() {
    for waveform in [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Triangle,
        Waveform::Saw,
    ] {
        roundtrip(&NoteOn {
            note_id: 7,
            frequency_hz: 261.63,
            amplitude: 0.9,
            attack_s: 0.005,
            duration_s: -1.0,
            release_s: 0.1,
            waveform,
        });
    }
}

#[test]
fn result_envelopes_roundtrip_both_arms() {
    let okay: Result<StatusOkay, ApiError> = Ok(StatusOkay {
        scenario_id: Some(ScenarioId::Sandbox),
        width: 45,
        height: 30,
        timestep: 100,
        state: "SimRunning".into(),
    });
    let envelope = Envelope::response_result(3, "StatusGet", &okay);
    assert_eq!(envelope.decode_result::<StatusOkay>().unwrap(), okay);

    let err: Result<StatusOkay, ApiError> = Err(ApiError::new("Command not valid in state Idle"));
    let envelope = Envelope::response_result(4, "StatusGet", &err);
    assert_eq!(envelope.decode_result::<StatusOkay>().unwrap(), err);
}
