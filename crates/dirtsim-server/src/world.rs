//! The simulation world: a dense cell grid plus sprite entities,
//! organisms and bones.
//!
//! The full physics solver (Darcy flow, cohesion, pressure projection)
//! lives behind `World::tick`; this implementation carries the
//! deterministic gravity-settle core the scenarios and the render path
//! exercise. Ticks are pure functions of the queued inputs: no wall-clock
//! reads happen inside.

use dirtproto::world::{BoneData, Cell, Entity, Material, TreeSensoryData, Vec2, WorldData};

/// Identifies an organism in the per-cell organism grid; 0 = none.
pub type OrganismId = u8;

#[derive(Debug, Clone)]
pub struct World {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
    organism_grid: Vec<OrganismId>,
    pub entities: Vec<Entity>,
    pub bones: Vec<BoneData>,
    pub tree_vision: Option<TreeSensoryData>,
    timestep: i32,
    sim_time: f64,
}

impl World {
    /// Default grid sized for the reference display (45x30 cells at
    /// roughly 16 px/cell).
    pub const DEFAULT_WIDTH: u32 = 45;
    pub const DEFAULT_HEIGHT: u32 = 30;
    /// Target cell size in pixels when deriving dimensions from a
    /// display container.
    pub const TARGET_PIXELS_PER_CELL: u32 = 16;
    pub const MIN_DIMENSION: u32 = 10;

    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let count = (width * height) as usize;
        Self {
            width,
            height,
            cells: vec![Cell::default(); count],
            organism_grid: vec![0; count],
            entities: Vec::new(),
            bones: Vec::new(),
            tree_vision: None,
            timestep: 0,
            sim_time: 0.0,
        }
    }

    /// Derive grid dimensions from a pixel container, clamped to the
    /// minimum world size.
    pub fn dimensions_for_container(container_w: u32, container_h: u32) -> (u32, u32) {
        let width = (container_w / Self::TARGET_PIXELS_PER_CELL).max(Self::MIN_DIMENSION);
        let height = (container_h / Self::TARGET_PIXELS_PER_CELL).max(Self::MIN_DIMENSION);
        (width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn timestep(&self) -> i32 {
        self.timestep
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn cell(&self, x: u32, y: u32) -> &Cell {
        &self.cells[self.index(x, y)]
    }

    pub fn cell_mut(&mut self, x: u32, y: u32) -> &mut Cell {
        let index = self.index(x, y);
        &mut self.cells[index]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn organism_grid(&self) -> &[OrganismId] {
        &self.organism_grid
    }

    pub fn set_organism(&mut self, x: u32, y: u32, id: OrganismId) {
        let index = self.index(x, y);
        self.organism_grid[index] = id;
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    /// Place material, replacing whatever is there.
    pub fn place(&mut self, x: u32, y: u32, material: Material, fill_ratio: f64) {
        let cell = self.cell_mut(x, y);
        *cell = Cell::of_material(material, fill_ratio);
    }

    /// Clear everything back to air and forget all overlays.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::default();
        }
        self.organism_grid.fill(0);
        self.entities.clear();
        self.bones.clear();
        self.tree_vision = None;
        self.timestep = 0;
        self.sim_time = 0.0;
    }

    /// Fraction of the grid carrying any material.
    pub fn fill_fraction(&self) -> f64 {
        let filled = self.cells.iter().filter(|c| !c.is_empty()).count();
        filled as f64 / self.cells.len() as f64
    }

    /// Advance one tick of `dt` seconds.
    ///
    /// Granular materials settle downward, preferring straight down, then
    /// the diagonals; water additionally spreads sideways. The sweep runs
    /// bottom-up so a particle moves at most one cell per tick.
    pub fn tick(&mut self, dt: f64) {
        let gravity = 9.8;

        for y in (0..self.height).rev() {
            for x in 0..self.width {
                let index = self.index(x, y);
                let material = self.cells[index].material;
                if !material.is_granular() || self.cells[index].fill_ratio <= 0.0 {
                    continue;
                }

                // Parity alternation keeps piles symmetric.
                let first_left = (x + y + self.timestep as u32) % 2 == 0;
                let diagonals: [i64; 2] = if first_left { [-1, 1] } else { [1, -1] };

                if y + 1 < self.height {
                    self.cells[index].velocity.y =
                        (self.cells[index].velocity.y + gravity * dt).min(10.0);

                    let below = self.index(x, y + 1);
                    if self.try_flow(index, below) {
                        continue;
                    }

                    let mut moved = false;
                    for dx in diagonals {
                        let nx = x as i64 + dx;
                        if self.in_bounds(nx, (y + 1) as i64) {
                            let diagonal = self.index(nx as u32, y + 1);
                            if self.try_flow(index, diagonal) {
                                moved = true;
                                break;
                            }
                        }
                    }
                    if moved {
                        continue;
                    }
                }

                if material == Material::Water {
                    for dx in diagonals {
                        let nx = x as i64 + dx;
                        if self.in_bounds(nx, y as i64) {
                            let side = self.index(nx as u32, y);
                            if self.try_equalize(index, side) {
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.update_pressure();

        self.timestep += 1;
        self.sim_time += dt;
    }

    /// Move material from `from` into `to` when `to` can accept it.
    fn try_flow(&mut self, from: usize, to: usize) -> bool {
        let from_material = self.cells[from].material;
        let to_material = self.cells[to].material;

        if to_material == Material::Air || self.cells[to].fill_ratio <= 0.0 {
            let velocity = self.cells[from].velocity;
            let fill = self.cells[from].fill_ratio;
            self.cells[to] = Cell {
                material: from_material,
                fill_ratio: fill,
                com: Vec2::default(),
                velocity,
                pressure: 0.0,
                pressure_gradient: Vec2::default(),
            };
            self.cells[from] = Cell::default();
            return true;
        }

        if to_material == from_material && self.cells[to].fill_ratio < 1.0 {
            let space = 1.0 - self.cells[to].fill_ratio;
            let moved = space.min(self.cells[from].fill_ratio);
            self.cells[to].fill_ratio += moved;
            self.cells[from].fill_ratio -= moved;
            if self.cells[from].fill_ratio <= f64::EPSILON {
                self.cells[from] = Cell::default();
            }
            return self.cells[from].is_empty();
        }

        false
    }

    /// Water spreading: split fill with an emptier same-material or air
    /// neighbor.
    fn try_equalize(&mut self, from: usize, to: usize) -> bool {
        let accepts = self.cells[to].material == Material::Air
            || (self.cells[to].material == Material::Water && self.cells[to].fill_ratio < 1.0);
        if !accepts {
            return false;
        }
        let to_fill = if self.cells[to].material == Material::Air {
            0.0
        } else {
            self.cells[to].fill_ratio
        };
        let from_fill = self.cells[from].fill_ratio;
        if from_fill - to_fill < 0.05 {
            return false;
        }
        let level = (from_fill + to_fill) / 2.0;
        self.cells[from].fill_ratio = level;
        self.cells[to] = Cell::of_material(Material::Water, level);
        true
    }

    /// Hydrostatic pressure: material column weight above each cell.
    fn update_pressure(&mut self) {
        for x in 0..self.width {
            let mut column_weight: f64 = 0.0;
            for y in 0..self.height {
                let index = self.index(x, y);
                let cell = &mut self.cells[index];
                if cell.is_empty() {
                    cell.pressure = 0.0;
                    cell.pressure_gradient = Vec2::default();
                    column_weight = 0.0;
                } else {
                    cell.pressure = (column_weight * 10.0).min(1000.0);
                    cell.pressure_gradient = Vec2::new(0.0, column_weight.min(100.0));
                    column_weight += cell.fill_ratio;
                }
            }
        }
    }

    /// Dense snapshot for the render path and training broadcasts.
    pub fn snapshot(&self) -> WorldData {
        WorldData {
            width: self.width,
            height: self.height,
            timestep: self.timestep,
            cells: self.cells.clone(),
            entities: self.entities.clone(),
            bones: self.bones.clone(),
            tree_vision: self.tree_vision.clone(),
            scenario_video_frame: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dirt_falls_straight_down() {
        let mut world = World::new(3, 3);
        world.place(1, 0, Material::Dirt, 1.0);
        world.tick(0.016);
        assert!(world.cell(1, 0).is_empty());
        assert_eq!(world.cell(1, 1).material, Material::Dirt);
        world.tick(0.016);
        assert_eq!(world.cell(1, 2).material, Material::Dirt);
    }

    #[test]
    fn dirt_piles_spill_to_diagonals() {
        let mut world = World::new(3, 3);
        // Fill the center column; the next grain must settle diagonally.
        world.place(1, 2, Material::Dirt, 1.0);
        world.place(1, 1, Material::Dirt, 1.0);
        world.place(1, 0, Material::Dirt, 1.0);
        world.tick(0.016);
        let spilled = !world.cell(0, 1).is_empty()
            || !world.cell(2, 1).is_empty()
            || world.cell(1, 0).is_empty();
        assert!(spilled);
    }

    #[test]
    fn stone_never_moves() {
        let mut world = World::new(3, 3);
        world.place(1, 0, Material::Stone, 1.0);
        for _ in 0..10 {
            world.tick(0.016);
        }
        assert_eq!(world.cell(1, 0).material, Material::Stone);
    }

    #[test]
    fn water_spreads_sideways() {
        let mut world = World::new(5, 2);
        // Water sitting on the floor with empty neighbors.
        world.place(2, 1, Material::Water, 1.0);
        for _ in 0..20 {
            world.tick(0.016);
        }
        let spread = (0..5).filter(|&x| world.cell(x, 1).material == Material::Water).count();
        assert!(spread >= 2, "water never spread: {spread}");
    }

    #[test]
    fn tick_is_deterministic() {
        let build = || {
            let mut world = World::new(8, 8);
            world.place(3, 0, Material::Sand, 1.0);
            world.place(4, 0, Material::Water, 0.8);
            world.place(2, 3, Material::Dirt, 1.0);
            world
        };
        let mut a = build();
        let mut b = build();
        for _ in 0..30 {
            a.tick(0.016);
            b.tick(0.016);
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn fill_ratio_invariant_holds_through_ticks() {
        let mut world = World::new(6, 6);
        world.place(2, 0, Material::Water, 0.7);
        world.place(3, 0, Material::Water, 0.9);
        for _ in 0..50 {
            world.tick(0.016);
            for cell in world.cells() {
                assert!((0.0..=1.0).contains(&cell.fill_ratio));
            }
        }
    }

    #[test]
    fn container_sizing_clamps_to_minimum() {
        assert_eq!(World::dimensions_for_container(724, 480), (45, 30));
        assert_eq!(World::dimensions_for_container(50, 50), (10, 10));
    }

    #[test]
    fn pressure_grows_with_depth() {
        let mut world = World::new(1, 5);
        for y in 0..5 {
            world.place(0, y, Material::Water, 1.0);
        }
        world.tick(0.016);
        assert!(world.cell(0, 4).pressure > world.cell(0, 1).pressure);
    }
}
