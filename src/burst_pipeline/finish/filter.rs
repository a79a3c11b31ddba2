//! Separable box filtering shared by the spatial finishing stages.

/// Box blur a plane in place with a `(2*radius + 1)` kernel, replicating
/// borders. Two separable passes.
pub(crate) fn box_blur(plane: &mut [f32], width: usize, height: usize, radius: usize) {
    if radius == 0 || width == 0 || height == 0 {
        return;
    }
    let norm = 1.0 / (2 * radius + 1) as f32;
    let mut tmp = vec![0.0f32; width * height];

    // horizontal
    for y in 0..height {
        let row = &plane[y * width..(y + 1) * width];
        for x in 0..width {
            let mut sum = 0.0;
            for k in -(radius as isize)..=(radius as isize) {
                let xi = (x as isize + k).clamp(0, width as isize - 1) as usize;
                sum += row[xi];
            }
            tmp[y * width + x] = sum * norm;
        }
    }

    // vertical
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0;
            for k in -(radius as isize)..=(radius as isize) {
                let yi = (y as isize + k).clamp(0, height as isize - 1) as usize;
                sum += tmp[yi * width + x];
            }
            plane[y * width + x] = sum * norm;
        }
    }
}
