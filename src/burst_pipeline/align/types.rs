//! Motion field types

/// Integer displacement of one tile, in pixels of the level it was
/// estimated at. Level-0 vectors are in alignment-plane pixels (half
/// mosaic resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionVector {
    pub dx: i32,
    pub dy: i32,
}

impl MotionVector {
    pub const ZERO: MotionVector = MotionVector { dx: 0, dy: 0 };

    #[inline]
    pub fn mag2(&self) -> i64 {
        self.dx as i64 * self.dx as i64 + self.dy as i64 * self.dy as i64
    }
}

/// Per-tile motion vectors of one alternate frame against the reference,
/// covering the full level-0 alignment plane, row-major.
#[derive(Debug, Clone)]
pub struct TileMotionField {
    /// Tile edge length in level-0 pixels.
    pub tile_size: usize,
    /// Level-0 plane dimensions the field was estimated on.
    pub width: usize,
    pub height: usize,
    pub tiles_x: usize,
    pub tiles_y: usize,
    pub vectors: Vec<MotionVector>,
}

impl TileMotionField {
    /// Tile grid covering a `width` x `height` plane; edge tiles are
    /// clamped inward so every tile lies inside the plane.
    pub fn grid_for(width: usize, height: usize, tile_size: usize) -> (usize, usize) {
        (width.div_ceil(tile_size).max(1), height.div_ceil(tile_size).max(1))
    }

    /// Top-left corner of tile `t` along a dimension of extent `dim`.
    #[inline]
    pub fn tile_origin(t: usize, tile_size: usize, dim: usize) -> usize {
        (t * tile_size).min(dim.saturating_sub(tile_size))
    }

    #[inline]
    pub fn vector_at(&self, tx: usize, ty: usize) -> MotionVector {
        let tx = tx.min(self.tiles_x - 1);
        let ty = ty.min(self.tiles_y - 1);
        self.vectors[ty * self.tiles_x + tx]
    }

    /// Vector of the tile containing level-0 position `(x, y)`.
    #[inline]
    pub fn vector_for_pos(&self, x: usize, y: usize) -> MotionVector {
        self.vector_at(x / self.tile_size, y / self.tile_size)
    }
}
