//! Burst photography pipeline module
//!
//! Aligns, merges, and finishes a burst of raw frames into a single
//! denoised sRGB image, with separate modules for raw decoding, the core
//! pipeline stages, orchestration, and TIFF output.

pub mod align;
pub mod common;
pub mod config;
pub mod finish;
pub mod merge;
pub mod orchestrator;
pub mod progress;
pub mod pyramid;
pub mod raw;
pub mod tiff;

pub use common::{PipelineError, Result};

pub use config::{PipelineConfig, PipelineConfigBuilder};

pub use raw::{CameraMetadata, CfaPattern, RawFrame, RawFrameReader, RawLoaderReader, load_burst};

pub use align::{MotionVector, TileMotionField};

pub use merge::{MergedMosaic, NoiseModel};

pub use finish::{ColorSpace, FinishOptions, FinishedImage};

pub use orchestrator::BurstPipeline;

pub use progress::{CancelToken, NullProgress, ProgressSink};

pub use tiff::{ImageWriter, OutputConfig, StandardTiffWriter, TiffCompression};
