//! Pixel-layout normalization for raw GDI bitmap data.
//!
//! `GetDIBits` hands back 32bpp BGRX rows stored bottom-up. The archive
//! format wants a top-down RGB image, so every capture passes through the
//! normalizer below before encoding.

use image::RgbImage;

/// Converts a bottom-up 32bpp BGRX buffer into a top-down RGB image.
///
/// `stride` is the byte length of one source row (at least `width * 4`).
/// Returns `None` when the buffer is too small for the described layout.
pub fn bgrx_bottom_up_to_rgb(raw: &[u8], width: u32, height: u32, stride: usize) -> Option<RgbImage> {
    if width == 0 || height == 0 || stride < width as usize * 4 {
        return None;
    }
    if raw.len() < stride * height as usize {
        return None;
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        // Bottom-up: the first stored row is the bottom of the image.
        let src_y = (height - 1 - y) as usize;
        let row = &raw[src_y * stride..src_y * stride + width as usize * 4];
        for px in row.chunks_exact(4) {
            rgb.push(px[2]); // R
            rgb.push(px[1]); // G
            rgb.push(px[0]); // B
        }
    }

    RgbImage::from_raw(width, height, rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_flipped_and_channels_reordered() {
        // 2x2 bottom-up BGRX: stored row 0 is the image's bottom row.
        // Bottom row: blue, green. Top row: red, white.
        let raw: Vec<u8> = vec![
            255, 0, 0, 0, /* blue */ 0, 255, 0, 0, /* green */
            0, 0, 255, 0, /* red */ 255, 255, 255, 0, /* white */
        ];
        let img = bgrx_bottom_up_to_rgb(&raw, 2, 2, 8).expect("valid buffer");

        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0], "top-left should be red");
        assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(0, 1).0, [0, 0, 255], "bottom-left should be blue");
        assert_eq!(img.get_pixel(1, 1).0, [0, 255, 0]);
    }

    #[test]
    fn test_padded_stride_is_skipped() {
        // One visible pixel per row plus 4 padding bytes of garbage.
        let raw: Vec<u8> = vec![
            10, 20, 30, 0, 99, 99, 99, 99, // bottom row
            40, 50, 60, 0, 99, 99, 99, 99, // top row
        ];
        let img = bgrx_bottom_up_to_rgb(&raw, 1, 2, 8).expect("valid buffer");
        assert_eq!(img.get_pixel(0, 0).0, [60, 50, 40]);
        assert_eq!(img.get_pixel(0, 1).0, [30, 20, 10]);
    }

    #[test]
    fn test_undersized_buffer_rejected() {
        let raw = vec![0u8; 15];
        assert!(bgrx_bottom_up_to_rgb(&raw, 2, 2, 8).is_none());
    }

    #[test]
    fn test_degenerate_dimensions_rejected() {
        assert!(bgrx_bottom_up_to_rgb(&[], 0, 2, 8).is_none());
        assert!(bgrx_bottom_up_to_rgb(&[], 2, 0, 8).is_none());
        // Stride narrower than a row.
        assert!(bgrx_bottom_up_to_rgb(&[0; 64], 4, 2, 8).is_none());
    }
}
