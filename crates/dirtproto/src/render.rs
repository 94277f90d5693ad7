//! The on-wire projection of [`WorldData`](crate::world::WorldData) pushed
//! to render subscribers.
//!
//! Two cell packings exist: `BasicCell` (7 bytes, what the display needs)
//! and `DebugCell` (quantized physics for overlays). Organisms are sent
//! sparsely; sending an organism id for every cell would waste the frame
//! on zeros.

use serde::{Deserialize, Serialize};

use crate::scenario::{ScenarioConfig, ScenarioId};
use crate::world::{BoneData, Cell, Entity, TreeSensoryData, Vec2f};
use crate::{impl_wire, impl_wire_enum};

/// Selects the cell packing of a `RenderMessage` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFormat {
    #[default]
    Basic,
    Debug,
}

impl_wire_enum!(RenderFormat {
    0 => Basic,
    1 => Debug,
});

/// Quantization ranges for the debug packing. Fixed by the protocol;
/// changing them breaks every deployed unpacker.
pub mod quant {
    /// `com` in [-1, 1] maps to the full i16 range.
    pub const COM_RANGE: f64 = 1.0;
    /// `velocity` in [-10, 10] maps to the full i16 range.
    pub const VELOCITY_RANGE: f64 = 10.0;
    /// `pressure` in [0, 1000] maps to the full u16 range.
    pub const PRESSURE_RANGE: f64 = 1000.0;

    pub fn pack_signed(value: f64, range: f64) -> i16 {
        let clamped = value.clamp(-range, range);
        (clamped / range * i16::MAX as f64).round() as i16
    }

    pub fn unpack_signed(value: i16, range: f64) -> f64 {
        value as f64 / i16::MAX as f64 * range
    }

    pub fn pack_unsigned(value: f64, range: f64) -> u16 {
        let clamped = value.clamp(0.0, range);
        (clamped / range * u16::MAX as f64).round() as u16
    }

    pub fn unpack_unsigned(value: u16, range: f64) -> f64 {
        value as f64 / u16::MAX as f64 * range
    }
}

/// Basic cell packing: 7 bytes on the wire.
///
/// `color` is packed RGBA with red in the most significant byte:
/// `R<<24 | G<<16 | B<<8 | A`. Both packer and unpacker use this layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BasicCell {
    pub material: u8,
    /// Fill ratio quantized [0, 1] -> [0, 255].
    pub fill: u8,
    /// Render override: -1 = use material, otherwise a material index.
    pub render_as: i8,
    pub color: u32,
}

impl BasicCell {
    pub const WIRE_SIZE: usize = 7;

    pub fn from_cell(cell: &Cell, color: u32) -> Self {
        Self {
            material: cell.material.index(),
            fill: (cell.fill_ratio.clamp(0.0, 1.0) * 255.0).round() as u8,
            render_as: -1,
            color,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.material);
        out.push(self.fill);
        out.push(self.render_as as u8);
        out.extend_from_slice(&self.color.to_le_bytes());
    }

    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            material: bytes[0],
            fill: bytes[1],
            render_as: bytes[2] as i8,
            color: u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]),
        })
    }
}

/// Debug cell packing: quantized physics state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugCell {
    pub material: u8,
    pub fill: u8,
    pub render_as: i8,
    pub com_x: i16,
    pub com_y: i16,
    pub velocity_x: i16,
    pub velocity_y: i16,
    pub pressure_hydro: u16,
    pub pressure_dynamic: u16,
    pub pressure_gradient: Vec2f,
}

impl DebugCell {
    pub const WIRE_SIZE: usize = 3 + 4 * 2 + 2 * 2 + 2 * 4;

    pub fn from_cell(cell: &Cell) -> Self {
        Self {
            material: cell.material.index(),
            fill: (cell.fill_ratio.clamp(0.0, 1.0) * 255.0).round() as u8,
            render_as: -1,
            com_x: quant::pack_signed(cell.com.x, quant::COM_RANGE),
            com_y: quant::pack_signed(cell.com.y, quant::COM_RANGE),
            velocity_x: quant::pack_signed(cell.velocity.x, quant::VELOCITY_RANGE),
            velocity_y: quant::pack_signed(cell.velocity.y, quant::VELOCITY_RANGE),
            pressure_hydro: quant::pack_unsigned(cell.pressure, quant::PRESSURE_RANGE),
            pressure_dynamic: 0,
            pressure_gradient: Vec2f {
                x: cell.pressure_gradient.x as f32,
                y: cell.pressure_gradient.y as f32,
            },
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.material);
        out.push(self.fill);
        out.push(self.render_as as u8);
        out.extend_from_slice(&self.com_x.to_le_bytes());
        out.extend_from_slice(&self.com_y.to_le_bytes());
        out.extend_from_slice(&self.velocity_x.to_le_bytes());
        out.extend_from_slice(&self.velocity_y.to_le_bytes());
        out.extend_from_slice(&self.pressure_hydro.to_le_bytes());
        out.extend_from_slice(&self.pressure_dynamic.to_le_bytes());
        out.extend_from_slice(&self.pressure_gradient.x.to_le_bytes());
        out.extend_from_slice(&self.pressure_gradient.y.to_le_bytes());
    }

    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::WIRE_SIZE {
            return None;
        }
        let i16_at = |offset: usize| i16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        let u16_at = |offset: usize| u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        let f32_at = |offset: usize| {
            f32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        Some(Self {
            material: bytes[0],
            fill: bytes[1],
            render_as: bytes[2] as i8,
            com_x: i16_at(3),
            com_y: i16_at(5),
            velocity_x: i16_at(7),
            velocity_y: i16_at(9),
            pressure_hydro: u16_at(11),
            pressure_dynamic: u16_at(13),
            pressure_gradient: Vec2f {
                x: f32_at(15),
                y: f32_at(19),
            },
        })
    }
}

/// Sparse organism occupancy: id + flat cell indices (`y * width + x`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganismData {
    pub organism_id: u8,
    pub cell_indices: Vec<u16>,
}

impl_wire!(OrganismData {
    organism_id,
    cell_indices
});

/// Scenario-provided video frame: packed RGB565, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioVideoFrame {
    pub width: u16,
    pub height: u16,
    pub frame_id: u64,
    pub pixels: Vec<u8>,
}

impl_wire!(ScenarioVideoFrame {
    width,
    height,
    frame_id,
    pixels
});

/// One rendered frame for one subscriber.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderMessage {
    pub format: RenderFormat,
    pub width: i16,
    pub height: i16,
    pub timestep: i32,
    pub fps_server: f64,
    /// Densely packed `BasicCell`s or `DebugCell`s, per `format`.
    pub payload: Vec<u8>,
    pub organisms: Vec<OrganismData>,
    pub bones: Vec<BoneData>,
    pub tree_vision: Option<TreeSensoryData>,
    pub entities: Vec<Entity>,
    pub scenario_video_frame: Option<ScenarioVideoFrame>,
}

impl_wire!(RenderMessage {
    format,
    width,
    height,
    timestep,
    fps_server,
    payload,
    organisms,
    bones,
    tree_vision,
    entities,
    scenario_video_frame
});

/// The push wrapper: a frame plus the scenario identity that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderMessageFull {
    pub scenario_id: ScenarioId,
    pub scenario_config: ScenarioConfig,
    pub message: RenderMessage,
}

impl_wire!(RenderMessageFull {
    scenario_id,
    scenario_config,
    message
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Wire;
    use crate::world::{Material, Vec2};
    use pretty_assertions::assert_eq;

    #[test]
    fn basic_cell_is_seven_bytes() {
        let cell = BasicCell {
            material: 2,
            fill: 128,
            render_as: -1,
            color: 0x11223344,
        };
        let mut out = Vec::new();
        cell.write_to(&mut out);
        assert_eq!(out.len(), BasicCell::WIRE_SIZE);
        assert_eq!(BasicCell::read_from(&out).unwrap(), cell);
    }

    #[test]
    fn basic_cell_color_is_rgba_msb_red() {
        // R=0xAA, G=0xBB, B=0xCC, A=0xFF
        let color = (0xAAu32 << 24) | (0xBBu32 << 16) | (0xCCu32 << 8) | 0xFF;
        let cell = BasicCell {
            material: 0,
            fill: 0,
            render_as: -1,
            color,
        };
        let mut out = Vec::new();
        cell.write_to(&mut out);
        let back = BasicCell::read_from(&out).unwrap();
        assert_eq!(back.color >> 24, 0xAA);
        assert_eq!(back.color & 0xFF, 0xFF);
    }

    #[test]
    fn debug_cell_quantization_within_tolerance() {
        let cell = Cell {
            material: Material::Water,
            fill_ratio: 0.5,
            com: Vec2::new(0.37, -0.91),
            velocity: Vec2::new(4.2, -7.7),
            pressure: 345.6,
            pressure_gradient: Vec2::new(0.5, -0.25),
        };
        let packed = DebugCell::from_cell(&cell);
        let mut out = Vec::new();
        packed.write_to(&mut out);
        assert_eq!(out.len(), DebugCell::WIRE_SIZE);
        let back = DebugCell::read_from(&out).unwrap();

        let com_x = quant::unpack_signed(back.com_x, quant::COM_RANGE);
        let com_y = quant::unpack_signed(back.com_y, quant::COM_RANGE);
        assert!((com_x - cell.com.x).abs() <= 0.01);
        assert!((com_y - cell.com.y).abs() <= 0.01);

        let vel_x = quant::unpack_signed(back.velocity_x, quant::VELOCITY_RANGE);
        let vel_y = quant::unpack_signed(back.velocity_y, quant::VELOCITY_RANGE);
        assert!((vel_x - cell.velocity.x).abs() <= 0.1);
        assert!((vel_y - cell.velocity.y).abs() <= 0.1);

        let pressure = quant::unpack_unsigned(back.pressure_hydro, quant::PRESSURE_RANGE);
        assert!((pressure - cell.pressure).abs() <= 1.0);
    }

    #[test]
    fn quantization_saturates_out_of_range() {
        assert_eq!(quant::pack_signed(5.0, quant::COM_RANGE), i16::MAX);
        assert_eq!(quant::pack_signed(-5.0, quant::COM_RANGE), -i16::MAX);
        assert_eq!(
            quant::pack_unsigned(2000.0, quant::PRESSURE_RANGE),
            u16::MAX
        );
    }

    #[test]
    fn render_message_roundtrip_without_video() {
        let message = RenderMessage {
            format: RenderFormat::Basic,
            width: 3,
            height: 2,
            timestep: 42,
            fps_server: 59.9,
            payload: vec![0; 6 * BasicCell::WIRE_SIZE],
            organisms: vec![OrganismData {
                organism_id: 1,
                cell_indices: vec![0, 1, 4],
            }],
            bones: Vec::new(),
            tree_vision: None,
            entities: Vec::new(),
            scenario_video_frame: None,
        };
        assert_eq!(
            RenderMessage::from_wire_bytes(&message.to_wire_bytes()).unwrap(),
            message
        );
    }

    #[test]
    fn render_message_roundtrip_with_video() {
        let message = RenderMessage {
            format: RenderFormat::Basic,
            width: 0,
            height: 0,
            timestep: 7,
            fps_server: 60.0,
            payload: Vec::new(),
            organisms: Vec::new(),
            bones: Vec::new(),
            tree_vision: None,
            entities: Vec::new(),
            scenario_video_frame: Some(ScenarioVideoFrame {
                width: 256,
                height: 240,
                frame_id: 99,
                pixels: vec![0xAB; 16],
            }),
        };
        assert_eq!(
            RenderMessage::from_wire_bytes(&message.to_wire_bytes()).unwrap(),
            message
        );
    }

    #[test]
    fn render_message_full_roundtrip() {
        let full = RenderMessageFull {
            scenario_id: ScenarioId::Sandbox,
            scenario_config: ScenarioConfig::default_for(ScenarioId::Sandbox),
            message: RenderMessage::default(),
        };
        assert_eq!(
            RenderMessageFull::from_wire_bytes(&full.to_wire_bytes()).unwrap(),
            full
        );
    }
}
