//! World -> RenderMessage packing for the broadcast path.

use dirtproto::render::{
    BasicCell, DebugCell, OrganismData, RenderFormat, RenderMessage,
};
use dirtproto::world::{Cell, Material, WorldData};

use crate::world::OrganismId;

/// Per-material base colors, RGBA with red in the most significant byte.
/// Lighting is a renderer concern; the server ships flat material colors.
fn material_color(material: Material, fill_ratio: f64) -> u32 {
    let (r, g, b) = match material {
        Material::Air => (0x00, 0x00, 0x00),
        Material::Dirt => (0x8B, 0x5A, 0x2B),
        Material::Water => (0x1E, 0x6F, 0xC8),
        Material::Sand => (0xD8, 0xC0, 0x6A),
        Material::Stone => (0x80, 0x80, 0x88),
        Material::Wood => (0x6B, 0x44, 0x1F),
        Material::Leaf => (0x2F, 0x9E, 0x44),
        Material::Root => (0x54, 0x38, 0x1A),
        Material::Fire => (0xE8, 0x4D, 0x1C),
        Material::Smoke => (0x55, 0x55, 0x55),
    };
    let alpha = (fill_ratio.clamp(0.0, 1.0) * 255.0).round() as u32;
    ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | alpha
}

fn pack_basic_payload(cells: &[Cell]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(cells.len() * BasicCell::WIRE_SIZE);
    for cell in cells {
        BasicCell::from_cell(cell, material_color(cell.material, cell.fill_ratio))
            .write_to(&mut payload);
    }
    payload
}

fn pack_debug_payload(cells: &[Cell]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(cells.len() * DebugCell::WIRE_SIZE);
    for cell in cells {
        DebugCell::from_cell(cell).write_to(&mut payload);
    }
    payload
}

/// Walk the organism grid once and emit the sparse per-organism index
/// lists, ordered by organism id.
pub fn sparse_organisms(grid: &[OrganismId]) -> Vec<OrganismData> {
    let mut by_id: std::collections::BTreeMap<u8, Vec<u16>> = std::collections::BTreeMap::new();
    for (index, &id) in grid.iter().enumerate() {
        if id != 0 {
            by_id.entry(id).or_default().push(index as u16);
        }
    }
    by_id
        .into_iter()
        .map(|(organism_id, cell_indices)| OrganismData {
            organism_id,
            cell_indices,
        })
        .collect()
}

/// Project a world snapshot into one subscriber's frame.
pub fn pack_render_message(
    world: &WorldData,
    organism_grid: &[OrganismId],
    format: RenderFormat,
    fps_server: f64,
) -> RenderMessage {
    let payload = match format {
        RenderFormat::Basic => pack_basic_payload(&world.cells),
        RenderFormat::Debug => pack_debug_payload(&world.cells),
    };

    RenderMessage {
        format,
        width: world.width as i16,
        height: world.height as i16,
        timestep: world.timestep,
        fps_server,
        payload,
        organisms: sparse_organisms(organism_grid),
        bones: world.bones.clone(),
        tree_vision: world.tree_vision.clone(),
        entities: world.entities.clone(),
        scenario_video_frame: world.scenario_video_frame.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtproto::render::quant;
    use dirtproto::world::Vec2;
    use pretty_assertions::assert_eq;

    fn sample_world() -> WorldData {
        WorldData {
            width: 2,
            height: 2,
            timestep: 7,
            cells: vec![
                Cell::default(),
                Cell::of_material(Material::Dirt, 1.0),
                Cell {
                    material: Material::Water,
                    fill_ratio: 0.5,
                    com: Vec2::new(0.25, -0.5),
                    velocity: Vec2::new(1.0, -2.0),
                    pressure: 500.0,
                    pressure_gradient: Vec2::new(0.0, 1.0),
                },
                Cell::of_material(Material::Stone, 1.0),
            ],
            entities: Vec::new(),
            bones: Vec::new(),
            tree_vision: None,
            scenario_video_frame: None,
        }
    }

    #[test]
    fn basic_payload_is_dense_row_major() {
        let world = sample_world();
        let message = pack_render_message(&world, &[0, 0, 0, 0], RenderFormat::Basic, 60.0);
        assert_eq!(message.payload.len(), 4 * BasicCell::WIRE_SIZE);

        let second = BasicCell::read_from(&message.payload[BasicCell::WIRE_SIZE..]).unwrap();
        assert_eq!(second.material, Material::Dirt.index());
        assert_eq!(second.fill, 255);
        // Alpha (low byte) follows fill; red sits in the top byte.
        assert_eq!(second.color >> 24, 0x8B);
        assert_eq!(second.color & 0xFF, 0xFF);
    }

    #[test]
    fn debug_payload_quantizes_physics() {
        let world = sample_world();
        let message = pack_render_message(&world, &[0, 0, 0, 0], RenderFormat::Debug, 60.0);
        assert_eq!(message.payload.len(), 4 * DebugCell::WIRE_SIZE);

        let water = DebugCell::read_from(&message.payload[2 * DebugCell::WIRE_SIZE..]).unwrap();
        let com_x = quant::unpack_signed(water.com_x, quant::COM_RANGE);
        assert!((com_x - 0.25).abs() <= 0.01);
        let pressure = quant::unpack_unsigned(water.pressure_hydro, quant::PRESSURE_RANGE);
        assert!((pressure - 500.0).abs() <= 1.0);
    }

    #[test]
    fn organisms_are_sparse_and_sorted() {
        let grid: Vec<OrganismId> = vec![0, 2, 0, 2, 1, 0];
        let organisms = sparse_organisms(&grid);
        assert_eq!(organisms.len(), 2);
        assert_eq!(organisms[0].organism_id, 1);
        assert_eq!(organisms[0].cell_indices, vec![4]);
        assert_eq!(organisms[1].organism_id, 2);
        assert_eq!(organisms[1].cell_indices, vec![1, 3]);
    }

    #[test]
    fn video_frame_passes_through() {
        let mut world = sample_world();
        world.scenario_video_frame = Some(dirtproto::render::ScenarioVideoFrame {
            width: 4,
            height: 2,
            frame_id: 3,
            pixels: vec![0; 16],
        });
        let message = pack_render_message(&world, &[], RenderFormat::Basic, 30.0);
        assert_eq!(message.scenario_video_frame.as_ref().unwrap().frame_id, 3);
    }
}
