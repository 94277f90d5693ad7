//! Scenario identity, metadata and per-scenario configuration.
//!
//! `ScenarioConfig` is the tagged variant carried by `SimRun` and
//! `ScenarioConfigSet`; the active arm selects the implementation the
//! server instantiates from its registry.

use serde::{Deserialize, Serialize};

use crate::{impl_wire, impl_wire_enum};

/// Stable scenario identifiers. String forms are the JSON/CLI names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    Benchmark,
    Clock,
    DamBreak,
    Empty,
    FallingDirt,
    Raining,
    Sandbox,
    TreeGermination,
    WaterEqualization,
    NesFlappyParatroopa,
    NesSuperTiltBro,
}

impl_wire_enum!(ScenarioId {
    0 => Benchmark,
    1 => Clock,
    2 => DamBreak,
    3 => Empty,
    4 => FallingDirt,
    5 => Raining,
    6 => Sandbox,
    7 => TreeGermination,
    8 => WaterEqualization,
    9 => NesFlappyParatroopa,
    10 => NesSuperTiltBro,
});

impl ScenarioId {
    pub const ALL: [ScenarioId; 11] = [
        Self::Benchmark,
        Self::Clock,
        Self::DamBreak,
        Self::Empty,
        Self::FallingDirt,
        Self::Raining,
        Self::Sandbox,
        Self::TreeGermination,
        Self::WaterEqualization,
        Self::NesFlappyParatroopa,
        Self::NesSuperTiltBro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Benchmark => "benchmark",
            Self::Clock => "clock",
            Self::DamBreak => "dam_break",
            Self::Empty => "empty",
            Self::FallingDirt => "falling_dirt",
            Self::Raining => "raining",
            Self::Sandbox => "sandbox",
            Self::TreeGermination => "tree_germination",
            Self::WaterEqualization => "water_equalization",
            Self::NesFlappyParatroopa => "nes_flappy_paratroopa",
            Self::NesSuperTiltBro => "nes_super_tilt_bro",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.as_str() == value)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which world shape a scenario drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    GridWorld,
    NesWorld,
}

impl_wire_enum!(ScenarioKind {
    0 => GridWorld,
    1 => NesWorld,
});

/// Registry metadata describing a scenario before it is instantiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub id: ScenarioId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub kind: ScenarioKind,
    pub required_width: Option<u32>,
    pub required_height: Option<u32>,
}

impl_wire!(ScenarioMetadata {
    id,
    name,
    description,
    category,
    kind,
    required_width,
    required_height
});

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub steps: u32,
}

impl_wire!(BenchmarkConfig { steps });

/// Clock scenario: renders the system time in falling-dirt digits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub show_seconds: bool,
    pub timezone_offset_minutes: i32,
    pub event_frequency: f64,
}

impl_wire!(ClockConfig {
    show_seconds,
    timezone_offset_minutes,
    event_frequency
});

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            show_seconds: true,
            timezone_offset_minutes: 0,
            event_frequency: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamBreakConfig {
    pub water_fraction: f64,
}

impl_wire!(DamBreakConfig { water_fraction });

impl Default for DamBreakConfig {
    fn default() -> Self {
        Self {
            water_fraction: 0.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmptyConfig {}

impl_wire!(EmptyConfig {});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallingDirtConfig {
    pub spawn_rate: f64,
}

impl_wire!(FallingDirtConfig { spawn_rate });

impl Default for FallingDirtConfig {
    fn default() -> Self {
        Self { spawn_rate: 3.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainingConfig {
    /// Drops per second.
    pub rain_rate: f64,
    /// Drain opening width in cells; 0 means a solid floor.
    pub drain_size: f64,
    /// Evaporate when the world is fuller than this percentage; 0 disables.
    pub max_fill_percent: f64,
}

impl_wire!(RainingConfig {
    rain_rate,
    drain_size,
    max_fill_percent
});

impl Default for RainingConfig {
    fn default() -> Self {
        Self {
            rain_rate: 5.0,
            drain_size: 0.0,
            max_fill_percent: 0.0,
        }
    }
}

/// Sandbox: interactive playground with optional generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub quadrant_enabled: bool,
    pub water_column_enabled: bool,
    pub right_throw_enabled: bool,
    pub rain_rate: f64,
}

impl_wire!(SandboxConfig {
    quadrant_enabled,
    water_column_enabled,
    right_throw_enabled,
    rain_rate
});

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            quadrant_enabled: true,
            water_column_enabled: true,
            right_throw_enabled: true,
            rain_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeBrainType {
    RuleBased,
    NeuralNet,
}

impl_wire_enum!(TreeBrainType {
    0 => RuleBased,
    1 => NeuralNet,
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeGerminationConfig {
    pub brain_type: TreeBrainType,
    pub neural_seed: u32,
    /// Load this genome from the repository when non-empty.
    pub genome_id: String,
}

impl_wire!(TreeGerminationConfig {
    brain_type,
    neural_seed,
    genome_id
});

impl Default for TreeGerminationConfig {
    fn default() -> Self {
        Self {
            brain_type: TreeBrainType::RuleBased,
            neural_seed: 42,
            genome_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterEqualizationConfig {
    pub left_column_height: u32,
    pub right_column_height: u32,
}

impl_wire!(WaterEqualizationConfig {
    left_column_height,
    right_column_height
});

impl Default for WaterEqualizationConfig {
    fn default() -> Self {
        Self {
            left_column_height: 20,
            right_column_height: 4,
        }
    }
}

/// Config shared by the embedded-emulator scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NesConfig {
    pub rom_id: String,
    pub rom_directory: String,
    pub rom_path: String,
    pub max_episode_frames: u32,
    pub require_supported_mapper: bool,
}

impl_wire!(NesConfig {
    rom_id,
    rom_directory,
    rom_path,
    max_episode_frames,
    require_supported_mapper
});

impl NesConfig {
    pub fn flappy_paratroopa() -> Self {
        Self {
            rom_id: "flappy-paratroopa-world-unl".into(),
            rom_directory: "testdata/roms".into(),
            rom_path: "testdata/roms/Flappy.Paratroopa.World.Unl.nes".into(),
            max_episode_frames: 108_000,
            require_supported_mapper: true,
        }
    }

    pub fn super_tilt_bro() -> Self {
        Self {
            rom_id: "super-tilt-bro".into(),
            rom_directory: "testdata/roms".into(),
            rom_path: "testdata/roms/Super_Tilt_Bro.nes".into(),
            max_episode_frames: 108_000,
            require_supported_mapper: true,
        }
    }
}

/// The tagged variant across every registered scenario. The JSON form
/// embeds the discriminator as a `"type"` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioConfig {
    Benchmark(BenchmarkConfig),
    Clock(ClockConfig),
    DamBreak(DamBreakConfig),
    Empty(EmptyConfig),
    FallingDirt(FallingDirtConfig),
    Raining(RainingConfig),
    Sandbox(SandboxConfig),
    TreeGermination(TreeGerminationConfig),
    WaterEqualization(WaterEqualizationConfig),
    NesFlappyParatroopa(NesConfig),
    NesSuperTiltBro(NesConfig),
}

// Newtype variants carry one field; the macro only handles struct-style
// arms, so this layout is written out by hand.
impl crate::wire::Wire for ScenarioConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        use crate::wire::Wire;
        match self {
            Self::Benchmark(c) => {
                0u32.encode(out);
                c.encode(out);
            }
            Self::Clock(c) => {
                1u32.encode(out);
                c.encode(out);
            }
            Self::DamBreak(c) => {
                2u32.encode(out);
                c.encode(out);
            }
            Self::Empty(c) => {
                3u32.encode(out);
                c.encode(out);
            }
            Self::FallingDirt(c) => {
                4u32.encode(out);
                c.encode(out);
            }
            Self::Raining(c) => {
                5u32.encode(out);
                c.encode(out);
            }
            Self::Sandbox(c) => {
                6u32.encode(out);
                c.encode(out);
            }
            Self::TreeGermination(c) => {
                7u32.encode(out);
                c.encode(out);
            }
            Self::WaterEqualization(c) => {
                8u32.encode(out);
                c.encode(out);
            }
            Self::NesFlappyParatroopa(c) => {
                9u32.encode(out);
                c.encode(out);
            }
            Self::NesSuperTiltBro(c) => {
                10u32.encode(out);
                c.encode(out);
            }
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, crate::wire::WireError> {
        use crate::wire::Wire;
        let discriminant = u32::decode(buf)?;
        Ok(match discriminant {
            0 => Self::Benchmark(BenchmarkConfig::decode(buf)?),
            1 => Self::Clock(ClockConfig::decode(buf)?),
            2 => Self::DamBreak(DamBreakConfig::decode(buf)?),
            3 => Self::Empty(EmptyConfig::decode(buf)?),
            4 => Self::FallingDirt(FallingDirtConfig::decode(buf)?),
            5 => Self::Raining(RainingConfig::decode(buf)?),
            6 => Self::Sandbox(SandboxConfig::decode(buf)?),
            7 => Self::TreeGermination(TreeGerminationConfig::decode(buf)?),
            8 => Self::WaterEqualization(WaterEqualizationConfig::decode(buf)?),
            9 => Self::NesFlappyParatroopa(NesConfig::decode(buf)?),
            10 => Self::NesSuperTiltBro(NesConfig::decode(buf)?),
            other => {
                return Err(crate::wire::WireError::UnknownDiscriminant {
                    type_name: "ScenarioConfig",
                    value: other,
                })
            }
        })
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::Empty(EmptyConfig::default())
    }
}

impl ScenarioConfig {
    /// Which scenario this config's active arm belongs to.
    pub fn scenario_id(&self) -> ScenarioId {
        match self {
            Self::Benchmark(_) => ScenarioId::Benchmark,
            Self::Clock(_) => ScenarioId::Clock,
            Self::DamBreak(_) => ScenarioId::DamBreak,
            Self::Empty(_) => ScenarioId::Empty,
            Self::FallingDirt(_) => ScenarioId::FallingDirt,
            Self::Raining(_) => ScenarioId::Raining,
            Self::Sandbox(_) => ScenarioId::Sandbox,
            Self::TreeGermination(_) => ScenarioId::TreeGermination,
            Self::WaterEqualization(_) => ScenarioId::WaterEqualization,
            Self::NesFlappyParatroopa(_) => ScenarioId::NesFlappyParatroopa,
            Self::NesSuperTiltBro(_) => ScenarioId::NesSuperTiltBro,
        }
    }

    /// Default config instance for a scenario id.
    pub fn default_for(id: ScenarioId) -> Self {
        match id {
            ScenarioId::Benchmark => Self::Benchmark(BenchmarkConfig::default()),
            ScenarioId::Clock => Self::Clock(ClockConfig::default()),
            ScenarioId::DamBreak => Self::DamBreak(DamBreakConfig::default()),
            ScenarioId::Empty => Self::Empty(EmptyConfig::default()),
            ScenarioId::FallingDirt => Self::FallingDirt(FallingDirtConfig::default()),
            ScenarioId::Raining => Self::Raining(RainingConfig::default()),
            ScenarioId::Sandbox => Self::Sandbox(SandboxConfig::default()),
            ScenarioId::TreeGermination => Self::TreeGermination(TreeGerminationConfig::default()),
            ScenarioId::WaterEqualization => {
                Self::WaterEqualization(WaterEqualizationConfig::default())
            }
            ScenarioId::NesFlappyParatroopa => {
                Self::NesFlappyParatroopa(NesConfig::flappy_paratroopa())
            }
            ScenarioId::NesSuperTiltBro => Self::NesSuperTiltBro(NesConfig::super_tilt_bro()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Wire;
    use pretty_assertions::assert_eq;

    #[test]
    fn scenario_id_string_forms() {
        assert_eq!(ScenarioId::DamBreak.as_str(), "dam_break");
        assert_eq!(ScenarioId::parse("sandbox"), Some(ScenarioId::Sandbox));
        assert_eq!(ScenarioId::parse("bogus"), None);
    }

    #[test]
    fn config_variant_matches_scenario_id() {
        for id in ScenarioId::ALL {
            assert_eq!(ScenarioConfig::default_for(id).scenario_id(), id);
        }
    }

    #[test]
    fn config_wire_roundtrip() {
        let config = ScenarioConfig::Raining(RainingConfig {
            rain_rate: 9.5,
            drain_size: 2.0,
            max_fill_percent: 80.0,
        });
        assert_eq!(
            ScenarioConfig::from_wire_bytes(&config.to_wire_bytes()).unwrap(),
            config
        );
    }

    #[test]
    fn config_json_embeds_type_discriminator() {
        let config = ScenarioConfig::Sandbox(SandboxConfig::default());
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "sandbox");
        let back: ScenarioConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn metadata_roundtrip() {
        let meta = ScenarioMetadata {
            id: ScenarioId::NesFlappyParatroopa,
            name: "Flappy Paratroopa".into(),
            description: "Embedded emulator scenario".into(),
            category: "nes".into(),
            kind: ScenarioKind::NesWorld,
            required_width: Some(256),
            required_height: Some(240),
        };
        assert_eq!(
            ScenarioMetadata::from_wire_bytes(&meta.to_wire_bytes()).unwrap(),
            meta
        );
    }
}
