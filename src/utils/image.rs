use image::RgbaImage;

use crate::error::{FeatPlotError, FeatPlotResult};

pub fn vec_to_rgba_image(width: u32, height: u32, buf: Vec<u8>) -> FeatPlotResult<RgbaImage> {
    RgbaImage::from_vec(width, height, buf)
        .ok_or_else(|| FeatPlotError::new("buffer not big enough"))
}

/// Paints a `size x size` block whose top-left pixel is `(x, y)` into an RGBA
/// buffer that is `width` pixels wide.
pub fn fill_block(buf: &mut [u8], width: usize, x: usize, y: usize, size: usize, pixel: [u8; 4]) {
    for row in y..y + size {
        let start = (row * width + x) * 4;
        for dst in buf[start..start + size * 4].chunks_exact_mut(4) {
            dst.copy_from_slice(&pixel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_buffer() {
        assert!(vec_to_rgba_image(2, 2, vec![0; 15]).is_err());
        assert!(vec_to_rgba_image(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn block() {
        let mut buf = vec![0u8; 3 * 2 * 4];
        fill_block(&mut buf, 3, 1, 0, 2, [9, 8, 7, 6]);

        let image = vec_to_rgba_image(3, 2, buf).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(image.get_pixel(0, 1).0, [0, 0, 0, 0]);
        for (x, y) in [(1, 0), (2, 0), (1, 1), (2, 1)] {
            assert_eq!(image.get_pixel(x, y).0, [9, 8, 7, 6]);
        }
    }
}
