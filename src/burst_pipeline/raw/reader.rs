use crate::burst_pipeline::common::error::Result;
use crate::burst_pipeline::raw::types::RawFrame;

pub trait RawFrameReader {
    fn read_frame(&self, data: &[u8], index: usize) -> Result<RawFrame>;
}
