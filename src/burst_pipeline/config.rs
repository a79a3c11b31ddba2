//! Pipeline configuration

use crate::burst_pipeline::common::error::{PipelineError, Result};
use crate::burst_pipeline::finish::FinishOptions;

/// Everything the pipeline needs to process a burst.
///
/// Validation happens once, up front, in [`PipelineConfig::validate`]; a
/// bad value never surfaces mid-run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Merge tile edge length in mosaic pixels; power of two. The
    /// alignment tile on the half-resolution plane uses the same value.
    pub tile_size: usize,
    pub num_pyramid_levels: usize,
    /// Search window half-width per pyramid level, coarsest to finest.
    pub search_radius_per_level: Vec<i32>,
    /// Shot noise coefficient of the sensor noise model, raw DN per DN of
    /// signal.
    pub noise_shot: f32,
    /// Read noise floor of the sensor noise model, raw DN squared.
    pub noise_read: f32,
    /// Which burst frame is the alignment reference.
    pub reference_frame_index: usize,
    pub finish: FinishOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_size: 16,
            num_pyramid_levels: 4,
            search_radius_per_level: vec![8, 4, 2, 1],
            noise_shot: 2.0,
            noise_read: 64.0,
            reference_frame_index: 0,
            finish: FinishOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tile_size.is_power_of_two() || !(8..=128).contains(&self.tile_size) {
            return Err(PipelineError::Configuration(format!(
                "tile_size {} must be a power of two between 8 and 128",
                self.tile_size
            )));
        }
        if self.num_pyramid_levels == 0 {
            return Err(PipelineError::Configuration(
                "num_pyramid_levels must be at least 1".to_string(),
            ));
        }
        if self.search_radius_per_level.len() != self.num_pyramid_levels {
            return Err(PipelineError::Configuration(format!(
                "search_radius_per_level has {} entries for {} pyramid levels",
                self.search_radius_per_level.len(),
                self.num_pyramid_levels
            )));
        }
        if let Some(&r) = self.search_radius_per_level.iter().find(|&&r| r < 0) {
            return Err(PipelineError::Configuration(format!(
                "search radius {r} must be non-negative"
            )));
        }
        if !self.noise_shot.is_finite() || self.noise_shot < 0.0 {
            return Err(PipelineError::Configuration(format!(
                "noise_shot {} must be finite and non-negative",
                self.noise_shot
            )));
        }
        if !self.noise_read.is_finite() || self.noise_read < 0.0 {
            return Err(PipelineError::Configuration(format!(
                "noise_read {} must be finite and non-negative",
                self.noise_read
            )));
        }
        self.finish.validate()
    }
}

/// Builder for PipelineConfig
#[derive(Default)]
pub struct PipelineConfigBuilder {
    tile_size: Option<usize>,
    num_pyramid_levels: Option<usize>,
    search_radius_per_level: Option<Vec<i32>>,
    noise_shot: Option<f32>,
    noise_read: Option<f32>,
    reference_frame_index: Option<usize>,
    tone_mapping_strength: Option<f32>,
    gain: Option<f32>,
    contrast: Option<f32>,
}

impl PipelineConfigBuilder {
    pub fn tile_size(mut self, tile_size: usize) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    pub fn num_pyramid_levels(mut self, levels: usize) -> Self {
        self.num_pyramid_levels = Some(levels);
        self
    }

    pub fn search_radius_per_level(mut self, radii: Vec<i32>) -> Self {
        self.search_radius_per_level = Some(radii);
        self
    }

    pub fn noise_params(mut self, shot: f32, read: f32) -> Self {
        self.noise_shot = Some(shot);
        self.noise_read = Some(read);
        self
    }

    pub fn reference_frame_index(mut self, index: usize) -> Self {
        self.reference_frame_index = Some(index);
        self
    }

    pub fn tone_mapping_strength(mut self, strength: f32) -> Self {
        self.tone_mapping_strength = Some(strength);
        self
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = Some(gain);
        self
    }

    pub fn contrast(mut self, contrast: f32) -> Self {
        self.contrast = Some(contrast);
        self
    }

    pub fn build(self) -> PipelineConfig {
        let default = PipelineConfig::default();
        let finish_default = default.finish.clone();
        PipelineConfig {
            tile_size: self.tile_size.unwrap_or(default.tile_size),
            num_pyramid_levels: self.num_pyramid_levels.unwrap_or(default.num_pyramid_levels),
            search_radius_per_level: self
                .search_radius_per_level
                .unwrap_or(default.search_radius_per_level),
            noise_shot: self.noise_shot.unwrap_or(default.noise_shot),
            noise_read: self.noise_read.unwrap_or(default.noise_read),
            reference_frame_index: self
                .reference_frame_index
                .unwrap_or(default.reference_frame_index),
            finish: FinishOptions {
                tone_mapping_strength: self
                    .tone_mapping_strength
                    .unwrap_or(finish_default.tone_mapping_strength),
                gain: self.gain.unwrap_or(finish_default.gain),
                contrast: self.contrast.unwrap_or(finish_default.contrast),
            },
        }
    }
}
