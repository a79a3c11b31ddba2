use hdrburst::burst_pipeline::{
    BurstPipeline, ImageWriter, OutputConfig, PipelineConfig, RawLoaderReader,
    StandardTiffWriter, load_burst,
};
use hdrburst::logger;

use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logger::init();

    let mut args = std::env::args().skip(1);
    let burst_dir = args.next().unwrap_or_else(|| "burst".to_string());
    let output_path = args.next().unwrap_or_else(|| "output.tiff".to_string());

    info!("Starting hdrburst...");

    let config = PipelineConfig::builder().build();
    let pipeline = BurstPipeline::new(config)?.with_progress(|stage: &str, fraction: f32| {
        info!("{}: {:.0}%", stage, fraction * 100.0);
    });

    info!("Burst pipeline initialized");
    info!("Tile size: {}", pipeline.config().tile_size);
    info!("Pyramid levels: {}", pipeline.config().num_pyramid_levels);

    let frames = load_burst(&RawLoaderReader, &burst_dir)?;

    match pipeline.process_burst(&frames) {
        Ok(image) => {
            let mut output = std::fs::File::create(&output_path)?;
            StandardTiffWriter.write_image(&image, &mut output, &OutputConfig::default())?;
            info!(
                "Wrote {}x{} image to {}",
                image.width, image.height, output_path
            );
        }
        Err(e) => error!("Burst processing failed: {}", e),
    }

    Ok(())
}
