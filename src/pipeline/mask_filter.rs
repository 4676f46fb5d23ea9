use image::{GrayImage, Luma};

// 7×7 structuring element for the opening, 11×11 box for the blur
const OPEN_RADIUS: i64 = 3;
const BLUR_RADIUS: i64 = 5;

/// Morphological opening followed by a box blur: drops speckle noise the
/// depth-to-color mapping leaves behind and softens the silhouette edge.
/// A replaceable post-filter; the raw mask is already correct without it.
pub fn refine(pixels: &mut Vec<u8>, width: u32, height: u32) {
    if pixels.len() != width as usize * height as usize {
        return;
    }
    let Some(mask) = GrayImage::from_raw(width, height, std::mem::take(pixels)) else {
        return;
    };

    let opened = dilate(&erode(&mask, OPEN_RADIUS), OPEN_RADIUS);
    let softened = box_blur(&opened, BLUR_RADIUS);
    *pixels = softened.into_raw();
}

fn erode(mask: &GrayImage, radius: i64) -> GrayImage {
    separable_extremum(mask, radius, u8::min, u8::MAX)
}

fn dilate(mask: &GrayImage, radius: i64) -> GrayImage {
    separable_extremum(mask, radius, u8::max, u8::MIN)
}

/// Min/max filter with a square kernel, run as two 1-D passes. Edges clamp.
fn separable_extremum(
    mask: &GrayImage,
    radius: i64,
    fold: fn(u8, u8) -> u8,
    init: u8,
) -> GrayImage {
    let (width, height) = mask.dimensions();
    let horizontal = GrayImage::from_fn(width, height, |x, y| {
        let mut extremum = init;
        for k in -radius..=radius {
            let sample_x = (x as i64 + k).clamp(0, width as i64 - 1) as u32;
            extremum = fold(extremum, mask.get_pixel(sample_x, y)[0]);
        }
        Luma([extremum])
    });
    GrayImage::from_fn(width, height, |x, y| {
        let mut extremum = init;
        for k in -radius..=radius {
            let sample_y = (y as i64 + k).clamp(0, height as i64 - 1) as u32;
            extremum = fold(extremum, horizontal.get_pixel(x, sample_y)[0]);
        }
        Luma([extremum])
    })
}

fn box_blur(mask: &GrayImage, radius: i64) -> GrayImage {
    let (width, height) = mask.dimensions();
    let kernel = (2 * radius + 1) as u32;
    let horizontal = GrayImage::from_fn(width, height, |x, y| {
        let mut sum = 0u32;
        for k in -radius..=radius {
            let sample_x = (x as i64 + k).clamp(0, width as i64 - 1) as u32;
            sum += mask.get_pixel(sample_x, y)[0] as u32;
        }
        Luma([(sum / kernel) as u8])
    });
    GrayImage::from_fn(width, height, |x, y| {
        let mut sum = 0u32;
        for k in -radius..=radius {
            let sample_y = (y as i64 + k).clamp(0, height as i64 - 1) as u32;
            sum += horizontal.get_pixel(x, sample_y)[0] as u32;
        }
        Luma([(sum / kernel) as u8])
    })
}
