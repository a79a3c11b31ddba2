//! Pipeline orchestration: pyramid -> align -> merge -> finish.
//!
//! `BurstPipeline` owns the validated configuration, a progress sink, and
//! a cancellation token; `process_burst` is otherwise stateless, so every
//! call is an independent, side-effect-free transform of the input burst.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{info, instrument};

use crate::burst_pipeline::align::{self, AlignmentParams, TileMotionField};
use crate::burst_pipeline::common::error::{PipelineError, Result};
use crate::burst_pipeline::config::PipelineConfig;
use crate::burst_pipeline::finish::{self, FinishedImage};
use crate::burst_pipeline::merge::{self, MergeParams, MergedMosaic, NoiseModel};
use crate::burst_pipeline::progress::{CancelToken, NullProgress, ProgressSink};
use crate::burst_pipeline::pyramid::{self, Pyramid};
use crate::burst_pipeline::raw::RawFrame;

pub struct BurstPipeline {
    config: PipelineConfig,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl BurstPipeline {
    /// Create a pipeline, validating the configuration eagerly.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            progress: Arc::new(NullProgress),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_progress<S: ProgressSink + 'static>(mut self, sink: S) -> Self {
        self.progress = Arc::new(sink);
        self
    }

    /// Token callers may use to cancel a running `process_burst`.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Process a burst into one finished image.
    ///
    /// The first error of any stage propagates immediately; nothing
    /// partial is ever returned. A single-frame burst skips alignment and
    /// merging entirely.
    #[instrument(skip(self, frames), fields(burst_size = frames.len()))]
    pub fn process_burst(&self, frames: &[RawFrame]) -> Result<FinishedImage> {
        let reference = self.validate_burst(frames)?;
        info!(
            "Processing burst of {} frames, reference frame {}",
            frames.len(),
            reference.index
        );

        let mosaic = if frames.len() == 1 {
            MergedMosaic::from_frame(reference)
        } else {
            self.align_and_merge(frames, reference)?
        };

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let image = {
            let _span = tracing::info_span!("finish").entered();
            finish::finish(&mosaic, &reference.metadata, &self.config.finish)?
        };
        self.progress.on_progress("finish", 1.0);

        info!("Burst complete: {}x{}", image.width, image.height);
        Ok(image)
    }

    fn validate_burst<'a>(&self, frames: &'a [RawFrame]) -> Result<&'a RawFrame> {
        if frames.is_empty() {
            return Err(PipelineError::EmptyBurst);
        }
        let ref_index = self.config.reference_frame_index;
        if ref_index >= frames.len() {
            return Err(PipelineError::Configuration(format!(
                "reference_frame_index {} is out of range for a burst of {}",
                ref_index,
                frames.len()
            )));
        }
        let reference = &frames[ref_index];
        if reference.width == 0 || reference.height == 0 {
            return Err(PipelineError::InvalidDimensions(
                reference.width,
                reference.height,
            ));
        }
        for (i, frame) in frames.iter().enumerate() {
            if frame.width != reference.width || frame.height != reference.height {
                return Err(PipelineError::DimensionMismatch {
                    frame_index: i,
                    expected_width: reference.width,
                    expected_height: reference.height,
                    got_width: frame.width,
                    got_height: frame.height,
                });
            }
        }
        Ok(reference)
    }

    fn align_and_merge(&self, frames: &[RawFrame], reference: &RawFrame) -> Result<MergedMosaic> {
        let ref_index = self.config.reference_frame_index;
        if self.config.tile_size > reference.width || self.config.tile_size > reference.height {
            return Err(PipelineError::Configuration(format!(
                "tile_size {} exceeds the {}x{} frame",
                self.config.tile_size, reference.width, reference.height
            )));
        }

        let pyramids: Vec<Pyramid> = {
            let _span = tracing::info_span!("pyramid").entered();
            frames
                .par_iter()
                .map(|frame| pyramid::build_pyramid(frame, self.config.num_pyramid_levels))
                .collect::<Result<_>>()?
        };
        self.progress.on_progress("pyramid", 1.0);
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // tile size halves on the alignment plane so alignment and merge
        // tiles cover the same mosaic footprint
        let align_params = AlignmentParams {
            tile_size: (self.config.tile_size / 2).max(4),
            search_radius_per_level: self.config.search_radius_per_level.clone(),
        };

        let alternate_indices: Vec<usize> =
            (0..frames.len()).filter(|&i| i != ref_index).collect();

        let motion_fields: Vec<TileMotionField> = {
            let _span = tracing::info_span!("align").entered();
            let done = AtomicUsize::new(0);
            let total = alternate_indices.len();
            alternate_indices
                .par_iter()
                .map(|&i| {
                    let field = align::align_frames(
                        &pyramids[ref_index],
                        &pyramids[i],
                        i,
                        &align_params,
                        &self.cancel,
                    )?;
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.progress
                        .on_progress("align", finished as f32 / total as f32);
                    Ok(field)
                })
                .collect::<Result<_>>()?
        };
        drop(pyramids);
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let alternates: Vec<&RawFrame> =
            alternate_indices.iter().map(|&i| &frames[i]).collect();
        let noise = NoiseModel::new(
            self.config.noise_shot,
            self.config.noise_read,
            reference.metadata.iso_gain,
            reference.metadata.black_level as f32,
        );

        let mosaic = {
            let _span = tracing::info_span!("merge").entered();
            merge::merge_burst(
                reference,
                &alternates,
                &motion_fields,
                &noise,
                &MergeParams {
                    tile_size: self.config.tile_size,
                },
                &self.cancel,
            )?
        };
        self.progress.on_progress("merge", 1.0);

        Ok(mosaic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burst_pipeline::finish::ColorSpace;
    use crate::burst_pipeline::raw::CameraMetadata;
    use std::sync::Mutex;

    fn metadata() -> CameraMetadata {
        CameraMetadata {
            black_level: 64,
            white_level: 4095,
            ..CameraMetadata::default()
        }
    }

    fn frame(width: usize, height: usize, data: Vec<u16>, index: usize) -> RawFrame {
        RawFrame {
            width,
            height,
            data,
            metadata: metadata(),
            index,
        }
    }

    /// Deterministic pseudo-noise in [-amplitude, amplitude].
    fn noise_stream(seed: u64, amplitude: i32) -> impl FnMut() -> i32 {
        let mut state = seed.wrapping_mul(0x9E3779B97F4A7C15).max(1);
        move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % (2 * amplitude as u64 + 1)) as i32 - amplitude
        }
    }

    fn textured_data(width: usize, height: usize) -> Vec<u16> {
        let mut data = vec![0u16; width * height];
        for y in 0..height {
            for x in 0..width {
                data[y * width + x] = (1000 + (x * x / 8 + 5 * y + x * y / 16) % 2000) as u16;
            }
        }
        data
    }

    fn add_noise(data: &mut [u16], seed: u64, amplitude: i32) {
        let mut next = noise_stream(seed, amplitude);
        for v in data.iter_mut() {
            *v = (*v as i32 + next()).clamp(0, u16::MAX as i32) as u16;
        }
    }

    fn shift_even(data: &[u16], width: usize, height: usize, dx: isize, dy: isize) -> Vec<u16> {
        let mut out = vec![0u16; width * height];
        for y in 0..height {
            for x in 0..width {
                let sx = (x as isize - dx).clamp(0, width as isize - 1) as usize;
                let sy = (y as isize - dy).clamp(0, height as isize - 1) as usize;
                out[y * width + x] = data[sy * width + sx];
            }
        }
        out
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig::builder()
            .num_pyramid_levels(3)
            .search_radius_per_level(vec![4, 2, 1])
            .build()
    }

    #[test]
    fn empty_burst_is_rejected() {
        let pipeline = BurstPipeline::new(small_config()).unwrap();
        assert!(matches!(
            pipeline.process_burst(&[]),
            Err(PipelineError::EmptyBurst)
        ));
    }

    #[test]
    fn out_of_range_reference_is_configuration_error() {
        let config = PipelineConfig::builder()
            .num_pyramid_levels(3)
            .search_radius_per_level(vec![4, 2, 1])
            .reference_frame_index(5)
            .build();
        let pipeline = BurstPipeline::new(config).unwrap();
        let burst = vec![frame(64, 64, textured_data(64, 64), 0)];
        assert!(matches!(
            pipeline.process_burst(&burst),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let config = PipelineConfig::builder().tile_size(17).build();
        assert!(matches!(
            BurstPipeline::new(config),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn mismatched_frame_reports_its_index() {
        let pipeline = BurstPipeline::new(small_config()).unwrap();
        let burst = vec![
            frame(64, 64, textured_data(64, 64), 0),
            frame(32, 64, vec![0; 32 * 64], 1),
        ];
        match pipeline.process_burst(&burst) {
            Err(PipelineError::DimensionMismatch { frame_index, .. }) => {
                assert_eq!(frame_index, 1)
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn single_frame_burst_equals_direct_finish() {
        let single = frame(64, 64, textured_data(64, 64), 0);
        let pipeline = BurstPipeline::new(small_config()).unwrap();
        let from_burst = pipeline.process_burst(std::slice::from_ref(&single)).unwrap();

        let mosaic = MergedMosaic::from_frame(&single);
        let direct =
            finish::finish(&mosaic, &single.metadata, &pipeline.config().finish).unwrap();

        assert_eq!(from_burst.data, direct.data);
    }

    #[test]
    fn zero_motion_burst_is_stable() {
        // identical frames: merged mosaic must equal the reference, so the
        // output equals the single-frame rendition exactly
        let data = textured_data(64, 64);
        let burst: Vec<RawFrame> = (0..3).map(|i| frame(64, 64, data.clone(), i)).collect();
        let pipeline = BurstPipeline::new(small_config()).unwrap();
        let merged_run = pipeline.process_burst(&burst).unwrap();
        let single_run = pipeline.process_burst(&burst[..1]).unwrap();
        assert_eq!(merged_run.data, single_run.data);
    }

    #[test]
    fn process_burst_is_deterministic() {
        let mut burst = Vec::new();
        for i in 0..3 {
            let mut data = textured_data(64, 64);
            add_noise(&mut data, i as u64 + 1, 15);
            burst.push(frame(64, 64, data, i));
        }
        let pipeline = BurstPipeline::new(small_config()).unwrap();
        let a = pipeline.process_burst(&burst).unwrap();
        let b = pipeline.process_burst(&burst).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn progress_events_cover_all_stages() {
        let events: Arc<Mutex<Vec<(String, f32)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let pipeline = BurstPipeline::new(small_config()).unwrap().with_progress(
            move |stage: &str, fraction: f32| {
                sink_events.lock().unwrap().push((stage.to_string(), fraction));
            },
        );

        let data = textured_data(64, 64);
        let burst: Vec<RawFrame> = (0..2).map(|i| frame(64, 64, data.clone(), i)).collect();
        pipeline.process_burst(&burst).unwrap();

        let events = events.lock().unwrap();
        for stage in ["pyramid", "align", "merge", "finish"] {
            assert!(
                events.iter().any(|(s, f)| s == stage && *f >= 1.0),
                "missing completion event for {stage}"
            );
        }
        assert!(events.iter().all(|(_, f)| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn cancelled_pipeline_returns_no_output() {
        let pipeline = BurstPipeline::new(small_config()).unwrap();
        pipeline.cancel_token().cancel();
        let data = textured_data(64, 64);
        let burst: Vec<RawFrame> = (0..2).map(|i| frame(64, 64, data.clone(), i)).collect();
        assert!(matches!(
            pipeline.process_burst(&burst),
            Err(PipelineError::Cancelled)
        ));
    }

    #[test]
    fn shifted_noisy_burst_recovers_toward_clean_image() {
        let width = 128;
        let height = 128;
        let clean = textured_data(width, height);

        // reference: clean scene + noise
        let mut ref_data = clean.clone();
        add_noise(&mut ref_data, 11, 20);
        let mut burst = vec![frame(width, height, ref_data, 0)];

        // alternates: known even shifts + independent noise
        for (i, (dx, dy)) in [(2isize, 0isize), (-2, 2), (4, -2)].iter().enumerate() {
            let mut data = shift_even(&clean, width, height, *dx, *dy);
            add_noise(&mut data, 23 + i as u64, 20);
            burst.push(frame(width, height, data, i + 1));
        }

        let pipeline = BurstPipeline::new(small_config()).unwrap();
        let merged_image = pipeline.process_burst(&burst).unwrap();
        assert_eq!(merged_image.width, width);
        assert_eq!(merged_image.height, height);
        assert_eq!(merged_image.color_space, ColorSpace::Srgb);

        let noisy_single = pipeline.process_burst(&burst[..1]).unwrap();
        let clean_image = pipeline
            .process_burst(&[frame(width, height, clean, 0)])
            .unwrap();

        // central crop: border tiles see replicated content and merge
        // reference-only there
        let rmse = |img: &FinishedImage| {
            let margin = 16;
            let mut sum = 0.0f64;
            let mut count = 0usize;
            for y in margin..height - margin {
                for x in margin..width - margin {
                    let i = (y * width + x) * 3;
                    for c in 0..3 {
                        let d = img.data[i + c] as f64 - clean_image.data[i + c] as f64;
                        sum += d * d;
                        count += 1;
                    }
                }
            }
            (sum / count as f64).sqrt()
        };

        let merged_err = rmse(&merged_image);
        let single_err = rmse(&noisy_single);
        assert!(
            merged_err < single_err * 0.8,
            "merge should denoise: rmse {merged_err:.2} vs single {single_err:.2}"
        );
    }
}
