//! Network description — the declarative model a network is built from.
//!
//! The description names global synapse parameters, the external input
//! spaces, and the regions with their pooler parameters and input
//! bindings. It is serialized as JSON via serde. Validation happens
//! before any engine object is constructed; a rejected description never
//! produces a partially built network.

use serde::{Deserialize, Serialize};

use crate::error::{CorticalError, Result};
use crate::region::{Inhibition, LearningPeriod, RegionParams};
use crate::synapse::SynapseParams;

/// Largest allowed input space edge.
pub const INPUT_SPACE_MAX_SIZE: usize = 1_000_000;
/// Largest allowed number of values per input position.
pub const INPUT_SPACE_MAX_NUM_VALUES: usize = 1000;

fn default_seed() -> u64 {
    0
}

fn default_one() -> usize {
    1
}

fn default_neg_one() -> i64 {
    -1
}

fn default_true() -> bool {
    true
}

fn default_boost_rate() -> f32 {
    0.01
}

fn default_max_boost() -> f32 {
    -1.0
}

/// Synapse parameter block (global, or per-region override).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SynapseParamsConfig {
    pub connected_permanence: f32,
    pub initial_permanence: f32,
    pub permanence_increase: f32,
    pub permanence_decrease: f32,
}

impl SynapseParamsConfig {
    fn validate(&self, context: &str) -> Result<()> {
        for (name, value) in [
            ("connectedPermanence", self.connected_permanence),
            ("initialPermanence", self.initial_permanence),
            ("permanenceIncrease", self.permanence_increase),
            ("permanenceDecrease", self.permanence_decrease),
        ] {
            if value <= 0.0 || value > 1.0 {
                return Err(CorticalError::Config(format!(
                    "{}: {} must be in (0, 1], got {}",
                    context, name, value
                )));
            }
        }
        Ok(())
    }

    pub fn to_params(self) -> SynapseParams {
        SynapseParams {
            connected_perm: self.connected_permanence,
            initial_perm: self.initial_permanence,
            perm_inc: self.permanence_increase,
            perm_dec: self.permanence_decrease,
        }
    }
}

impl Default for SynapseParamsConfig {
    fn default() -> Self {
        let params = SynapseParams::default();
        Self {
            connected_permanence: params.connected_perm,
            initial_permanence: params.initial_perm,
            permanence_increase: params.perm_inc,
            permanence_decrease: params.perm_dec,
        }
    }
}

/// An external binary input source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSpaceConfig {
    pub id: String,
    pub size_x: usize,
    pub size_y: usize,
    #[serde(default = "default_one")]
    pub num_values: usize,
}

/// How a region determines its inhibition radius.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum InhibitionConfig {
    Automatic,
    Radius { radius: f32 },
}

impl InhibitionConfig {
    fn to_inhibition(self) -> Inhibition {
        match self {
            InhibitionConfig::Automatic => Inhibition::Automatic,
            InhibitionConfig::Radius { radius } => Inhibition::Radius(radius),
        }
    }
}

/// Inclusive range a per-column value is drawn from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RangeConfig {
    pub min: usize,
    pub max: usize,
}

/// Boosting parameters; `max` of −1 means unlimited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoostConfig {
    #[serde(default = "default_max_boost")]
    pub max: f32,
    #[serde(default = "default_boost_rate")]
    pub rate: f32,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            max: default_max_boost(),
            rate: default_boost_rate(),
        }
    }
}

/// A learning window; −1 for start means from the beginning, −1 for end
/// means through the end. An end of 0 disables the behavior (the clock
/// starts at 1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PeriodConfig {
    #[serde(default = "default_neg_one")]
    pub start: i64,
    #[serde(default = "default_neg_one")]
    pub end: i64,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self { start: -1, end: -1 }
    }
}

impl PeriodConfig {
    fn to_period(self) -> LearningPeriod {
        LearningPeriod {
            start: self.start,
            end: self.end,
        }
    }
}

/// One input binding of a region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputBindingConfig {
    /// Id of an input space or an earlier-declared region.
    pub id: String,
    /// Furthest hypercolumn distance for proximal connections from this
    /// input; −1 for no restriction.
    #[serde(default = "default_neg_one")]
    pub radius: i64,
}

/// A learning layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionConfig {
    pub id: String,
    pub size_x: usize,
    pub size_y: usize,
    pub cells_per_column: usize,
    #[serde(default = "default_one")]
    pub hypercolumn_diameter: usize,
    #[serde(default = "default_neg_one")]
    pub prediction_radius: i64,
    pub segment_activate_threshold: usize,
    pub inhibition: InhibitionConfig,
    pub min_overlap_to_reuse_segment: RangeConfig,
    pub new_number_synapses: usize,

    /// Percentages in (0, 100].
    pub percentage_input_per_column: f32,
    pub percentage_min_overlap: f32,
    pub percentage_local_activity: f32,

    #[serde(default)]
    pub boost: BoostConfig,

    #[serde(default)]
    pub spatial_learning_period: PeriodConfig,
    #[serde(default)]
    pub temporal_learning_period: PeriodConfig,
    #[serde(default)]
    pub boosting_period: PeriodConfig,

    /// Per-region overrides of the global synapse parameter blocks.
    #[serde(default)]
    pub proximal_synapse_params: Option<SynapseParamsConfig>,
    #[serde(default)]
    pub distal_synapse_params: Option<SynapseParamsConfig>,

    #[serde(default)]
    pub hardcoded_spatial: bool,
    #[serde(default)]
    pub output_column_activity: bool,
    #[serde(default = "default_true")]
    pub output_cell_activity: bool,

    pub inputs: Vec<InputBindingConfig>,
}

impl RegionConfig {
    pub fn to_params(&self) -> RegionParams {
        RegionParams {
            width: self.size_x,
            height: self.size_y,
            cells_per_col: self.cells_per_column,
            hypercolumn_diameter: self.hypercolumn_diameter,
            seg_active_threshold: self.segment_activate_threshold,
            prediction_radius: self.prediction_radius,
            new_synapse_count: self.new_number_synapses,
            min_overlap_to_reuse_segment: (
                self.min_overlap_to_reuse_segment.min,
                self.min_overlap_to_reuse_segment.max,
            ),
            pct_input_per_column: self.percentage_input_per_column / 100.0,
            pct_min_overlap: self.percentage_min_overlap / 100.0,
            pct_local_activity: self.percentage_local_activity / 100.0,
            max_boost: if self.boost.max == -1.0 {
                None
            } else {
                Some(self.boost.max)
            },
            boost_rate: self.boost.rate,
            spatial_learning: self.spatial_learning_period.to_period(),
            temporal_learning: self.temporal_learning_period.to_period(),
            boosting: self.boosting_period.to_period(),
            inhibition: self.inhibition.to_inhibition(),
            hardcoded_spatial: self.hardcoded_spatial,
            output_column_activity: self.output_column_activity,
            output_cell_activity: self.output_cell_activity,
        }
    }
}

/// The complete network description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub proximal_synapse_params: SynapseParamsConfig,
    #[serde(default)]
    pub distal_synapse_params: SynapseParamsConfig,

    #[serde(default)]
    pub input_spaces: Vec<InputSpaceConfig>,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

impl NetworkConfig {
    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: NetworkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every parameter range and cross-reference before the engine
    /// builds anything.
    pub fn validate(&self) -> Result<()> {
        self.proximal_synapse_params
            .validate("proximalSynapseParams")?;
        self.distal_synapse_params.validate("distalSynapseParams")?;

        let mut ids: Vec<&str> = Vec::new();

        for space in &self.input_spaces {
            if space.id.is_empty() {
                return Err(CorticalError::Config("input space id is empty".into()));
            }
            if ids.contains(&space.id.as_str()) {
                return Err(CorticalError::Config(format!(
                    "duplicate data space id {}",
                    space.id
                )));
            }
            ids.push(&space.id);

            if space.size_x == 0 || space.size_x > INPUT_SPACE_MAX_SIZE {
                return Err(CorticalError::Config(format!(
                    "input space {} has invalid sizeX {}",
                    space.id, space.size_x
                )));
            }
            if space.size_y == 0 || space.size_y > INPUT_SPACE_MAX_SIZE {
                return Err(CorticalError::Config(format!(
                    "input space {} has invalid sizeY {}",
                    space.id, space.size_y
                )));
            }
            if space.num_values == 0 || space.num_values > INPUT_SPACE_MAX_NUM_VALUES {
                return Err(CorticalError::Config(format!(
                    "input space {} has invalid numValues {}",
                    space.id, space.num_values
                )));
            }
        }

        for region in &self.regions {
            let ctx = format!("region {}", region.id);

            if region.id.is_empty() {
                return Err(CorticalError::Config("region id is empty".into()));
            }
            if ids.contains(&region.id.as_str()) {
                return Err(CorticalError::Config(format!(
                    "duplicate data space id {}",
                    region.id
                )));
            }

            if region.size_x == 0 || region.size_y == 0 {
                return Err(CorticalError::Config(format!(
                    "{}: sizeX and sizeY must be positive",
                    ctx
                )));
            }
            if region.cells_per_column == 0 {
                return Err(CorticalError::Config(format!(
                    "{}: cellsPerColumn must be positive",
                    ctx
                )));
            }
            if region.hypercolumn_diameter == 0 {
                return Err(CorticalError::Config(format!(
                    "{}: hypercolumnDiameter must be positive",
                    ctx
                )));
            }
            if region.size_x % region.hypercolumn_diameter != 0
                || region.size_y % region.hypercolumn_diameter != 0
            {
                return Err(CorticalError::Config(format!(
                    "{}: dimensions {}x{} must be divisible by hypercolumnDiameter {}",
                    ctx, region.size_x, region.size_y, region.hypercolumn_diameter
                )));
            }
            if region.prediction_radius < -1 {
                return Err(CorticalError::Config(format!(
                    "{}: predictionRadius must be >= -1",
                    ctx
                )));
            }

            for (name, value) in [
                ("percentageInputPerColumn", region.percentage_input_per_column),
                ("percentageMinOverlap", region.percentage_min_overlap),
                ("percentageLocalActivity", region.percentage_local_activity),
            ] {
                if value <= 0.0 || value > 100.0 {
                    return Err(CorticalError::Config(format!(
                        "{}: {} must be in (0, 100], got {}",
                        ctx, name, value
                    )));
                }
            }

            if region.min_overlap_to_reuse_segment.min > region.min_overlap_to_reuse_segment.max {
                return Err(CorticalError::Config(format!(
                    "{}: minOverlapToReuseSegment min {} exceeds max {}",
                    ctx,
                    region.min_overlap_to_reuse_segment.min,
                    region.min_overlap_to_reuse_segment.max
                )));
            }
            if region.min_overlap_to_reuse_segment.min == 0 {
                return Err(CorticalError::Config(format!(
                    "{}: minOverlapToReuseSegment min must be positive",
                    ctx
                )));
            }

            if region.boost.max != -1.0 && region.boost.max < 1.0 {
                return Err(CorticalError::Config(format!(
                    "{}: boost max must be -1 (unlimited) or >= 1, got {}",
                    ctx, region.boost.max
                )));
            }
            if region.boost.rate <= 0.0 {
                return Err(CorticalError::Config(format!(
                    "{}: boost rate must be positive",
                    ctx
                )));
            }

            if let Some(override_params) = &region.proximal_synapse_params {
                override_params.validate(&format!("{} proximalSynapseParams", ctx))?;
            }
            if let Some(override_params) = &region.distal_synapse_params {
                override_params.validate(&format!("{} distalSynapseParams", ctx))?;
            }

            if !region.output_column_activity && !region.output_cell_activity {
                return Err(CorticalError::Config(format!(
                    "{}: at least one of outputColumnActivity / outputCellActivity must be set",
                    ctx
                )));
            }

            if region.inputs.is_empty() {
                return Err(CorticalError::Config(format!(
                    "{}: at least one input is required",
                    ctx
                )));
            }
            if region.hardcoded_spatial && region.inputs.len() != 1 {
                return Err(CorticalError::Config(format!(
                    "{}: hardcodedSpatial requires exactly one input",
                    ctx
                )));
            }
            for binding in &region.inputs {
                if binding.radius < -1 {
                    return Err(CorticalError::Config(format!(
                        "{}: input {} radius must be >= -1",
                        ctx, binding.id
                    )));
                }
                // Inputs must resolve to an earlier-declared data space;
                // stepping order makes upstream activity visible downstream.
                if !ids.contains(&binding.id.as_str()) {
                    return Err(CorticalError::UnknownInput {
                        id: binding.id.clone(),
                    });
                }
            }

            ids.push(&region.id);
        }

        Ok(())
    }
}
