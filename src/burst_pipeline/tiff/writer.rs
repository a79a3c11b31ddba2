use std::io::Write;

use crate::burst_pipeline::common::error::Result;
use crate::burst_pipeline::finish::FinishedImage;
use crate::burst_pipeline::tiff::types::OutputConfig;

pub trait ImageWriter {
    fn write_image(
        &self,
        image: &FinishedImage,
        output: &mut dyn Write,
        config: &OutputConfig,
    ) -> Result<()>;
}
