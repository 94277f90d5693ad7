//! Embedded-emulator scenarios: ROM validation and the driver that feeds
//! emulator frames into the render stream.
//!
//! The emulator core itself sits behind [`NesRuntime`]; the driver owns
//! ROM resolution, iNES header checks and the 256x240 WorldData shim.

use std::fs;
use std::path::{Path, PathBuf};

use dirtproto::error::ApiError;
use dirtproto::render::ScenarioVideoFrame;
use dirtproto::scenario::{NesConfig, ScenarioId, ScenarioKind, ScenarioMetadata};
use dirtproto::world::WorldData;
use tracing::info;

/// Emulator framebuffer geometry (NTSC NES).
pub const NES_WIDTH: u16 = 256;
pub const NES_HEIGHT: u16 = 240;

/// Mappers the bundled emulator core implements.
pub const SUPPORTED_MAPPERS: [u16; 6] = [0, 1, 2, 3, 4, 7];

/// Environment overrides for the ROM search directory.
pub const ROM_DIR_ENV: &str = "DIRTSIM_NES_TEST_ROM_PATH";
pub const STB_ROM_DIR_ENV: &str = "DIRTSIM_NES_STB_TEST_ROM_PATH";

pub fn flappy_paratroopa_metadata() -> ScenarioMetadata {
    ScenarioMetadata {
        id: ScenarioId::NesFlappyParatroopa,
        name: "Flappy Paratroopa".into(),
        description: "Embedded emulator running Flappy Paratroopa".into(),
        category: "nes".into(),
        kind: ScenarioKind::NesWorld,
        required_width: Some(NES_WIDTH as u32),
        required_height: Some(NES_HEIGHT as u32),
    }
}

pub fn super_tilt_bro_metadata() -> ScenarioMetadata {
    ScenarioMetadata {
        id: ScenarioId::NesSuperTiltBro,
        name: "Super Tilt Bro".into(),
        description: "Embedded emulator running Super Tilt Bro".into(),
        category: "nes".into(),
        kind: ScenarioKind::NesWorld,
        required_width: Some(NES_WIDTH as u32),
        required_height: Some(NES_HEIGHT as u32),
    }
}

/// Parsed iNES header facts the driver cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NesRomInfo {
    pub prg_banks_16k: u8,
    pub chr_banks_8k: u8,
    pub mapper: u16,
    pub has_battery: bool,
    pub has_trainer: bool,
    pub vertical_mirroring: bool,
}

pub fn is_mapper_supported(mapper: u16) -> bool {
    SUPPORTED_MAPPERS.contains(&mapper)
}

/// Read and validate an iNES header.
pub fn inspect_nes_rom(rom_path: &Path) -> Result<NesRomInfo, ApiError> {
    if !rom_path.exists() {
        return Err(ApiError::new("ROM path does not exist."));
    }

    let bytes = fs::read(rom_path).map_err(|_| ApiError::new("Failed to open ROM file."))?;
    if bytes.len() < 16 {
        return Err(ApiError::new("Failed to read iNES header."));
    }

    if bytes[0] != b'N' || bytes[1] != b'E' || bytes[2] != b'S' || bytes[3] != 0x1A {
        return Err(ApiError::new("ROM is missing iNES magic bytes."));
    }

    let flags6 = bytes[6];
    let flags7 = bytes[7];
    let info = NesRomInfo {
        prg_banks_16k: bytes[4],
        chr_banks_8k: bytes[5],
        mapper: ((flags6 >> 4) as u16) | ((flags7 & 0xF0) as u16),
        has_battery: flags6 & 0x02 != 0,
        has_trainer: flags6 & 0x04 != 0,
        vertical_mirroring: flags6 & 0x01 != 0,
    };

    if !is_mapper_supported(info.mapper) {
        return Err(ApiError::new(format!(
            "Mapper {} is unsupported by the emulator core.",
            info.mapper
        )));
    }

    Ok(info)
}

/// Normalize a ROM file name into a catalog id: lowercase alphanumerics
/// with single dashes ("Flappy.Paratroopa" -> "flappy-paratroopa").
pub fn normalize_rom_id(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !normalized.is_empty() && !normalized.ends_with('-') {
                normalized.push('-');
            }
            normalized.push(ch.to_ascii_lowercase());
            pending_separator = false;
        } else {
            pending_separator = true;
        }
    }
    while normalized.ends_with('-') {
        normalized.pop();
    }
    normalized
}

/// Resolve the ROM file for a scenario config, honoring the env overrides.
pub fn resolve_rom_path(scenario_id: ScenarioId, config: &NesConfig) -> PathBuf {
    let env_override = match scenario_id {
        ScenarioId::NesSuperTiltBro => {
            std::env::var_os(STB_ROM_DIR_ENV).or_else(|| std::env::var_os(ROM_DIR_ENV))
        }
        _ => std::env::var_os(ROM_DIR_ENV),
    };

    if let Some(dir) = env_override {
        let dir = PathBuf::from(dir);
        if let Some(file_name) = Path::new(&config.rom_path).file_name() {
            return dir.join(file_name);
        }
        return dir;
    }

    PathBuf::from(&config.rom_path)
}

/// Controller state for one emulator frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NesInput {
    pub a: bool,
    pub b: bool,
    pub select: bool,
    pub start: bool,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// The narrow seam to the emulator core. The production core is loaded
/// externally; tests and headless runs use [`NullNesRuntime`].
pub trait NesRuntime: Send {
    fn load(&mut self, rom_bytes: &[u8]) -> Result<(), ApiError>;
    fn reset(&mut self);
    /// Advance one video frame. The framebuffer is packed RGB565,
    /// row-major, NES_WIDTH * NES_HEIGHT pixels.
    fn run_frame(&mut self, input: NesInput);
    fn framebuffer(&self) -> &[u8];
}

/// Headless runtime: renders a deterministic gradient that advances per
/// frame, enough to exercise the video path without an emulator.
pub struct NullNesRuntime {
    framebuffer: Vec<u8>,
    frame: u64,
}

impl NullNesRuntime {
    pub fn new() -> Self {
        Self {
            framebuffer: vec![0; NES_WIDTH as usize * NES_HEIGHT as usize * 2],
            frame: 0,
        }
    }
}

impl Default for NullNesRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl NesRuntime for NullNesRuntime {
    fn load(&mut self, _rom_bytes: &[u8]) -> Result<(), ApiError> {
        Ok(())
    }

    fn reset(&mut self) {
        self.frame = 0;
        self.framebuffer.fill(0);
    }

    fn run_frame(&mut self, _input: NesInput) {
        self.frame += 1;
        for y in 0..NES_HEIGHT as usize {
            for x in 0..NES_WIDTH as usize {
                let red = ((x as u64 + self.frame) & 0x1F) as u16;
                let green = ((y as u64) & 0x3F) as u16;
                let pixel = (red << 11) | (green << 5);
                let offset = (y * NES_WIDTH as usize + x) * 2;
                self.framebuffer[offset..offset + 2].copy_from_slice(&pixel.to_le_bytes());
            }
        }
    }

    fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }
}

/// Drives one emulator-backed scenario: owns the runtime, the config and
/// the WorldData shim pushed to render subscribers.
pub struct NesDriver {
    scenario_id: ScenarioId,
    config: NesConfig,
    rom_info: NesRomInfo,
    runtime: Box<dyn NesRuntime>,
    frame_id: u64,
    world_data: WorldData,
    input: NesInput,
}

impl std::fmt::Debug for NesDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NesDriver")
            .field("scenario_id", &self.scenario_id)
            .field("config", &self.config)
            .field("rom_info", &self.rom_info)
            .field("frame_id", &self.frame_id)
            .field("world_data", &self.world_data)
            .field("input", &self.input)
            .finish()
    }
}

impl NesDriver {
    /// Validate the ROM and prepare the runtime. Fails without touching
    /// any session state when the ROM is missing or incompatible.
    pub fn start(
        scenario_id: ScenarioId,
        config: NesConfig,
        mut runtime: Box<dyn NesRuntime>,
    ) -> Result<Self, ApiError> {
        let rom_path = resolve_rom_path(scenario_id, &config);
        let rom_info = inspect_nes_rom(&rom_path)?;
        if config.require_supported_mapper && !is_mapper_supported(rom_info.mapper) {
            return Err(ApiError::new(format!(
                "Mapper {} is unsupported by the emulator core.",
                rom_info.mapper
            )));
        }

        let rom_bytes =
            fs::read(&rom_path).map_err(|_| ApiError::new("Failed to open ROM file."))?;
        runtime.load(&rom_bytes)?;
        runtime.reset();

        info!(
            target: "scenario",
            rom = %rom_path.display(),
            mapper = rom_info.mapper,
            "NES scenario started"
        );

        Ok(Self {
            scenario_id,
            config,
            rom_info,
            runtime,
            frame_id: 0,
            world_data: WorldData {
                width: NES_WIDTH as u32,
                height: NES_HEIGHT as u32,
                ..Default::default()
            },
            input: NesInput::default(),
        })
    }

    pub fn scenario_id(&self) -> ScenarioId {
        self.scenario_id
    }

    pub fn config(&self) -> &NesConfig {
        &self.config
    }

    pub fn rom_info(&self) -> &NesRomInfo {
        &self.rom_info
    }

    pub fn set_input(&mut self, input: NesInput) {
        self.input = input;
    }

    pub fn world_data(&self) -> &WorldData {
        &self.world_data
    }

    /// Run one emulator frame and refresh the shim's video frame.
    pub fn tick(&mut self) {
        self.runtime.run_frame(self.input);
        self.frame_id += 1;
        self.world_data.timestep = self.frame_id as i32;
        self.world_data.scenario_video_frame = Some(ScenarioVideoFrame {
            width: NES_WIDTH,
            height: NES_HEIGHT,
            frame_id: self.frame_id,
            pixels: self.runtime.framebuffer().to_vec(),
        });
    }

    pub fn reset(&mut self) {
        self.runtime.reset();
        self.frame_id = 0;
        self.world_data.timestep = 0;
        self.world_data.scenario_video_frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_rom(dir: &Path, name: &str, mapper: u8) -> PathBuf {
        let mut bytes = vec![0u8; 16 + 16384];
        bytes[0] = b'N';
        bytes[1] = b'E';
        bytes[2] = b'S';
        bytes[3] = 0x1A;
        bytes[4] = 1; // PRG banks
        bytes[5] = 1; // CHR banks
        bytes[6] = (mapper & 0x0F) << 4;
        bytes[7] = mapper & 0xF0;
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn valid_header_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rom(dir.path(), "ok.nes", 0);
        let info = inspect_nes_rom(&path).unwrap();
        assert_eq!(info.mapper, 0);
        assert_eq!(info.prg_banks_16k, 1);
    }

    #[test]
    fn missing_rom_is_an_error() {
        let err = inspect_nes_rom(Path::new("/nonexistent/rom.nes")).unwrap_err();
        assert_eq!(err.message, "ROM path does not exist.");
    }

    #[test]
    fn bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.nes");
        fs::write(&path, vec![0u8; 64]).unwrap();
        let err = inspect_nes_rom(&path).unwrap_err();
        assert!(err.message.contains("iNES magic"));
    }

    #[test]
    fn unsupported_mapper_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rom(dir.path(), "weird.nes", 66);
        let err = inspect_nes_rom(&path).unwrap_err();
        assert!(err.message.contains("unsupported"));
    }

    #[test]
    fn mapper_allowlist_matches_the_core() {
        for mapper in SUPPORTED_MAPPERS {
            assert!(is_mapper_supported(mapper));
        }
        assert!(!is_mapper_supported(5));
        assert!(!is_mapper_supported(66));
    }

    #[test]
    fn rom_id_normalization() {
        assert_eq!(
            normalize_rom_id("Flappy.Paratroopa.World.Unl"),
            "flappy-paratroopa-world-unl"
        );
        assert_eq!(normalize_rom_id("Super_Tilt_Bro"), "super-tilt-bro");
        assert_eq!(normalize_rom_id("--weird--"), "weird");
    }

    #[test]
    fn driver_start_fails_cleanly_on_missing_rom() {
        let config = NesConfig {
            rom_path: "/nonexistent/never.nes".into(),
            ..NesConfig::flappy_paratroopa()
        };
        let err = NesDriver::start(
            ScenarioId::NesFlappyParatroopa,
            config,
            Box::new(NullNesRuntime::new()),
        )
        .unwrap_err();
        assert_eq!(err.message, "ROM path does not exist.");
    }

    #[test]
    fn driver_produces_video_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rom(dir.path(), "game.nes", 0);
        let config = NesConfig {
            rom_path: path.to_string_lossy().into_owned(),
            ..NesConfig::flappy_paratroopa()
        };
        let mut driver = NesDriver::start(
            ScenarioId::NesFlappyParatroopa,
            config,
            Box::new(NullNesRuntime::new()),
        )
        .unwrap();

        driver.tick();
        let frame = driver
            .world_data()
            .scenario_video_frame
            .as_ref()
            .expect("frame");
        assert_eq!(frame.width, NES_WIDTH);
        assert_eq!(frame.height, NES_HEIGHT);
        assert_eq!(frame.frame_id, 1);
        assert_eq!(
            frame.pixels.len(),
            NES_WIDTH as usize * NES_HEIGHT as usize * 2
        );

        driver.tick();
        assert_eq!(
            driver
                .world_data()
                .scenario_video_frame
                .as_ref()
                .unwrap()
                .frame_id,
            2
        );
    }
}
