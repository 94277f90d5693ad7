//! Simulation world data as it crosses the wire.
//!
//! `WorldData` is the dense snapshot the server produces each tick; the
//! render path projects it into the much smaller `RenderMessage`.

use serde::{Deserialize, Serialize};

use crate::{impl_wire, impl_wire_enum};

/// 2D vector of f64, used for COM, velocity and gradients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl_wire!(Vec2 { x, y });

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// 2D vector of f32, used in the quantized debug payload.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2f {
    pub x: f32,
    pub y: f32,
}

impl_wire!(Vec2f { x, y });

/// 2D vector of i32, used for cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vec2i {
    pub x: i32,
    pub y: i32,
}

impl_wire!(Vec2i { x, y });

/// Cell materials. The discriminator values are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    #[default]
    Air,
    Dirt,
    Water,
    Sand,
    Stone,
    Wood,
    Leaf,
    Root,
    Fire,
    Smoke,
}

impl_wire_enum!(Material {
    0 => Air,
    1 => Dirt,
    2 => Water,
    3 => Sand,
    4 => Stone,
    5 => Wood,
    6 => Leaf,
    7 => Root,
    8 => Fire,
    9 => Smoke,
});

impl Material {
    pub const COUNT: usize = 10;

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Air),
            1 => Some(Self::Dirt),
            2 => Some(Self::Water),
            3 => Some(Self::Sand),
            4 => Some(Self::Stone),
            5 => Some(Self::Wood),
            6 => Some(Self::Leaf),
            7 => Some(Self::Root),
            8 => Some(Self::Fire),
            9 => Some(Self::Smoke),
            _ => None,
        }
    }

    pub fn index(&self) -> u8 {
        *self as u8
    }

    /// Whether the material participates in gravity settling.
    pub fn is_granular(&self) -> bool {
        matches!(self, Self::Dirt | Self::Sand | Self::Water)
    }
}

/// One grid location in the physics world.
///
/// Invariants: `0 <= fill_ratio <= 1`; `com.x` and `com.y` are in `[-1, 1]`
/// (cell-local coordinates with 0 at the cell center).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub material: Material,
    pub fill_ratio: f64,
    pub com: Vec2,
    pub velocity: Vec2,
    pub pressure: f64,
    pub pressure_gradient: Vec2,
}

impl_wire!(Cell {
    material,
    fill_ratio,
    com,
    velocity,
    pressure,
    pressure_gradient
});

impl Cell {
    pub fn of_material(material: Material, fill_ratio: f64) -> Self {
        Self {
            material,
            fill_ratio: fill_ratio.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.material == Material::Air || self.fill_ratio <= 0.0
    }
}

/// Sprite-layer entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Duck,
    Goose,
    Sparkle,
    Butterfly,
}

impl_wire_enum!(EntityKind {
    0 => Duck,
    1 => Goose,
    2 => Sparkle,
    3 => Butterfly,
});

/// A sprite-layer object positioned in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u32,
    pub kind: EntityKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing_left: bool,
    pub frame: u16,
}

impl_wire!(Entity {
    id,
    kind,
    position,
    velocity,
    facing_left,
    frame
});

/// Spring connection between two organism cells, rendered as a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoneData {
    pub cell_a: Vec2i,
    pub cell_b: Vec2i,
}

impl_wire!(BoneData { cell_a, cell_b });

/// What a tree organism currently senses, forwarded for visualization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSensoryData {
    pub organism_id: u8,
    pub light_levels: Vec<f32>,
    pub moisture_levels: Vec<f32>,
}

impl_wire!(TreeSensoryData {
    organism_id,
    light_levels,
    moisture_levels
});

/// Dense snapshot of the world, produced once per tick.
///
/// Cells are indexed `y * width + x`, row-major.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldData {
    pub width: u32,
    pub height: u32,
    pub timestep: i32,
    pub cells: Vec<Cell>,
    pub entities: Vec<Entity>,
    pub bones: Vec<BoneData>,
    pub tree_vision: Option<TreeSensoryData>,
    pub scenario_video_frame: Option<crate::render::ScenarioVideoFrame>,
}

impl_wire!(WorldData {
    width,
    height,
    timestep,
    cells,
    entities,
    bones,
    tree_vision,
    scenario_video_frame
});

impl WorldData {
    pub fn cell_at(&self, x: u32, y: u32) -> Option<&Cell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get((y * self.width + x) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Wire;
    use pretty_assertions::assert_eq;

    #[test]
    fn material_discriminators_are_stable() {
        assert_eq!(Material::Air.to_wire_bytes(), 0u32.to_le_bytes());
        assert_eq!(Material::Smoke.to_wire_bytes(), 9u32.to_le_bytes());
        assert_eq!(Material::from_index(9), Some(Material::Smoke));
        assert_eq!(Material::from_index(10), None);
    }

    #[test]
    fn cell_roundtrip() {
        let cell = Cell {
            material: Material::Water,
            fill_ratio: 0.75,
            com: Vec2::new(0.1, -0.2),
            velocity: Vec2::new(2.0, -9.8),
            pressure: 101.3,
            pressure_gradient: Vec2::new(0.0, 1.0),
        };
        assert_eq!(Cell::from_wire_bytes(&cell.to_wire_bytes()).unwrap(), cell);
    }

    #[test]
    fn world_data_roundtrip_with_optionals() {
        let world = WorldData {
            width: 2,
            height: 1,
            timestep: 3,
            cells: vec![Cell::default(), Cell::of_material(Material::Dirt, 1.0)],
            entities: vec![Entity {
                id: 1,
                kind: EntityKind::Duck,
                position: Vec2::new(0.5, 0.5),
                velocity: Vec2::default(),
                facing_left: true,
                frame: 2,
            }],
            bones: vec![BoneData {
                cell_a: Vec2i { x: 0, y: 0 },
                cell_b: Vec2i { x: 1, y: 0 },
            }],
            tree_vision: None,
            scenario_video_frame: None,
        };
        assert_eq!(
            WorldData::from_wire_bytes(&world.to_wire_bytes()).unwrap(),
            world
        );
    }

    #[test]
    fn cell_index_is_row_major() {
        let mut world = WorldData {
            width: 3,
            height: 2,
            cells: vec![Cell::default(); 6],
            ..Default::default()
        };
        world.cells[4].material = Material::Stone;
        assert_eq!(world.cell_at(1, 1).unwrap().material, Material::Stone);
        assert!(world.cell_at(3, 0).is_none());
    }
}
