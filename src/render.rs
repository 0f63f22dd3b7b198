use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

use image::{ImageFormat, RgbaImage};
use scopeguard::guard;

use crate::{
    colormap::viridis,
    error::{FeatPlotError, FeatPlotResult},
    feature::FeatureMatrix,
    utils::image::{fill_block, vec_to_rgba_image},
};

/// Drawn for NaN and infinite cells.
const BAD_PIXEL: [u8; 4] = [0, 0, 0, 0];

/// Largest raster `render` will allocate, 1 GiB of RGBA.
pub const MAX_PIXELS: u64 = 1 << 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Side length in pixels of the square drawn for one matrix cell.
    pub scale: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions { scale: 1 }
    }
}

/// Linear mapping of `[min, max]` onto `[0, 1]`.
///
/// Works on halved values so that `max - min` stays finite for any pair of
/// finite bounds.
#[derive(Debug, Clone, Copy)]
struct Normalize {
    half_min: f64,
    half_span: f64,
}

impl Normalize {
    fn new(min: f64, max: f64) -> Self {
        Normalize {
            half_min: min / 2.0,
            half_span: max / 2.0 - min / 2.0,
        }
    }

    fn apply(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        if self.half_span <= 0.0 {
            return Some(0.0);
        }

        Some(((value / 2.0 - self.half_min) / self.half_span).clamp(0.0, 1.0))
    }
}

/// Renders the matrix as a heat map. Frames run left to right, feature
/// dimensions bottom to top.
pub fn render(matrix: &FeatureMatrix, options: &RenderOptions) -> FeatPlotResult<RgbaImage> {
    if options.scale == 0 {
        return Err(FeatPlotError::InvalidScale(options.scale));
    }
    if matrix.is_empty() {
        return Err(FeatPlotError::EmptyMatrix {
            num_frames: matrix.num_frames(),
            feature_dim: matrix.feature_dim(),
        });
    }

    let width = matrix
        .num_frames()
        .checked_mul(options.scale)
        .ok_or(FeatPlotError::InvalidScale(options.scale))?;
    let height = matrix
        .feature_dim()
        .checked_mul(options.scale)
        .ok_or(FeatPlotError::InvalidScale(options.scale))?;
    if width as u64 * height as u64 > MAX_PIXELS {
        return Err(FeatPlotError::InvalidScale(options.scale));
    }

    let range = matrix.value_range();
    let norm = range.map(|(min, max)| Normalize::new(min, max));
    log::debug!("rendering {}x{} image, value range {:?}", width, height, range);

    let scale = options.scale as usize;
    let feature_dim = matrix.feature_dim() as usize;
    let mut buf = vec![0u8; width as usize * height as usize * 4];

    for (frame, row) in matrix.rows().enumerate() {
        for (dim, &value) in row.iter().enumerate() {
            let pixel = match norm.and_then(|norm| norm.apply(value)) {
                Some(t) => {
                    let [r, g, b] = viridis(t);
                    [r, g, b, 255]
                }
                None => BAD_PIXEL,
            };

            let x = frame * scale;
            let y = (feature_dim - 1 - dim) * scale;
            fill_block(&mut buf, width as usize, x, y, scale, pixel);
        }
    }

    vec_to_rgba_image(width, height, buf)
}

/// Renders the matrix and writes it to `path` as PNG. If encoding or writing
/// fails after the file was created, the incomplete file is removed.
pub fn save_heatmap<P: AsRef<Path>>(
    matrix: &FeatureMatrix,
    options: &RenderOptions,
    path: P,
) -> FeatPlotResult<()> {
    let path = path.as_ref();
    let image = render(matrix, options)?;

    let file = File::create(path)?;
    let mut written = guard(false, |written| {
        if !written {
            log::warn!("removing incomplete output {}", path.display());
            if let Err(err) = fs::remove_file(path) {
                log::warn!("failed to remove {}: {}", path.display(), err);
            }
        }
    });

    let mut writer = BufWriter::new(file);
    image.write_to(&mut writer, ImageFormat::Png)?;
    writer.into_inner().map_err(|err| err.into_error())?;
    *written = true;

    log::debug!(
        "wrote {}x{} heat map to {}",
        image.width(),
        image.height(),
        path.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::feature::ElementSize;

    use super::*;

    fn rgb(image: &RgbaImage, x: u32, y: u32) -> [u8; 4] {
        image.get_pixel(x, y).0
    }

    fn opaque(t: f64) -> [u8; 4] {
        let [r, g, b] = viridis(t);
        [r, g, b, 255]
    }

    #[test]
    fn transposed_with_lower_origin() {
        let mut matrix =
            FeatureMatrix::from_rows(ElementSize::F32, &[[9.0, 1.0, 2.0], [9.0, 3.0, 4.0]])
                .unwrap();
        matrix.zero_first_column();

        let image = render(&matrix, &RenderOptions::default()).unwrap();
        assert_eq!((image.width(), image.height()), (2, 3));

        // dimension 0 is the bottom row and was zeroed
        assert_eq!(rgb(&image, 0, 2), opaque(0.0));
        assert_eq!(rgb(&image, 1, 2), opaque(0.0));
        // dimension 2 is the top row
        assert_eq!(rgb(&image, 0, 0), opaque(0.5));
        assert_eq!(rgb(&image, 1, 0), opaque(1.0));
        assert_eq!(rgb(&image, 0, 1), opaque(0.25));
        assert_eq!(rgb(&image, 1, 1), opaque(0.75));
    }

    #[test]
    fn scaled_cells() {
        let matrix = FeatureMatrix::from_rows(ElementSize::F64, &[[0.0, 1.0]]).unwrap();
        let image = render(&matrix, &RenderOptions { scale: 3 }).unwrap();

        assert_eq!((image.width(), image.height()), (3, 6));
        for x in 0..3 {
            for y in 0..3 {
                assert_eq!(rgb(&image, x, y), opaque(1.0));
                assert_eq!(rgb(&image, x, y + 3), opaque(0.0));
            }
        }
    }

    #[test]
    fn constant_matrix() {
        let matrix = FeatureMatrix::from_rows(ElementSize::F64, &[[5.0, 5.0], [5.0, 5.0]]).unwrap();
        let image = render(&matrix, &RenderOptions::default()).unwrap();
        assert!(image.pixels().all(|pixel| pixel.0 == opaque(0.0)));
    }

    #[test]
    fn non_finite_cells_are_transparent() {
        let matrix =
            FeatureMatrix::from_rows(ElementSize::F64, &[[f64::NAN, 1.0], [2.0, f64::INFINITY]])
                .unwrap();
        let image = render(&matrix, &RenderOptions::default()).unwrap();

        assert_eq!(rgb(&image, 0, 1), BAD_PIXEL);
        assert_eq!(rgb(&image, 1, 0), BAD_PIXEL);
        assert_eq!(rgb(&image, 0, 0), opaque(0.0));
        assert_eq!(rgb(&image, 1, 1), opaque(1.0));
    }

    #[test]
    fn rejects_empty_and_zero_scale() {
        let empty = FeatureMatrix::new(3, 0, ElementSize::F32, Vec::new()).unwrap();
        assert!(matches!(
            render(&empty, &RenderOptions::default()),
            Err(FeatPlotError::EmptyMatrix {
                num_frames: 3,
                feature_dim: 0
            })
        ));

        let matrix = FeatureMatrix::from_rows(ElementSize::F32, &[[1.0]]).unwrap();
        assert!(matches!(
            render(&matrix, &RenderOptions { scale: 0 }),
            Err(FeatPlotError::InvalidScale(0))
        ));
    }

    #[test]
    fn oversized_scale_rejected() {
        let matrix = FeatureMatrix::from_rows(ElementSize::F32, &[[1.0, 2.0]]).unwrap();
        assert!(matches!(
            render(&matrix, &RenderOptions { scale: 100_000 }),
            Err(FeatPlotError::InvalidScale(100_000))
        ));
        assert!(matches!(
            render(&matrix, &RenderOptions { scale: u32::MAX }),
            Err(FeatPlotError::InvalidScale(u32::MAX))
        ));
        assert!(render(&matrix, &RenderOptions { scale: 1000 }).is_ok());
    }

    #[test]
    fn extreme_finite_range() {
        let matrix =
            FeatureMatrix::from_rows(ElementSize::F64, &[[-f64::MAX, 0.0, f64::MAX]]).unwrap();
        let image = render(&matrix, &RenderOptions::default()).unwrap();

        assert_eq!(rgb(&image, 0, 2), opaque(0.0));
        assert_eq!(rgb(&image, 0, 1), opaque(0.5));
        assert_eq!(rgb(&image, 0, 0), opaque(1.0));
    }

    #[test]
    fn save_png() {
        let path =
            std::env::temp_dir().join(format!("featplot-render-{}.png", std::process::id()));
        let matrix =
            FeatureMatrix::from_rows(ElementSize::F32, &[[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]])
                .unwrap();

        save_heatmap(&matrix, &RenderOptions { scale: 2 }, &path).unwrap();
        let decoded = image::open(&path).map(|image| image.to_rgba8());
        fs::remove_file(&path).unwrap();

        let decoded = decoded.unwrap();
        assert_eq!(decoded, render(&matrix, &RenderOptions { scale: 2 }).unwrap());
    }

    #[test]
    fn failed_save_leaves_no_file() {
        let path = std::env::temp_dir()
            .join(format!("featplot-missing-{}", std::process::id()))
            .join("out.png");
        let matrix = FeatureMatrix::from_rows(ElementSize::F32, &[[1.0]]).unwrap();

        assert!(save_heatmap(&matrix, &RenderOptions::default(), &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn failed_save_keeps_existing_file() {
        let path =
            std::env::temp_dir().join(format!("featplot-readonly-{}.png", std::process::id()));
        fs::write(&path, b"old image").unwrap();
        let mut permissions = fs::metadata(&path).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&path, permissions.clone()).unwrap();

        // privileged users can write through read-only permissions
        let denied = fs::OpenOptions::new().write(true).open(&path).is_err();
        let matrix = FeatureMatrix::from_rows(ElementSize::F32, &[[1.0]]).unwrap();
        let result = save_heatmap(&matrix, &RenderOptions::default(), &path);
        let contents = fs::read(&path);

        permissions.set_readonly(false);
        let _ = fs::set_permissions(&path, permissions);
        let _ = fs::remove_file(&path);

        if denied {
            assert!(result.is_err());
            assert_eq!(contents.unwrap(), b"old image");
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn write_errors_are_reported() {
        let link = std::env::temp_dir().join(format!("featplot-full-{}.png", std::process::id()));
        let _ = fs::remove_file(&link);
        std::os::unix::fs::symlink("/dev/full", &link).unwrap();

        let matrix =
            FeatureMatrix::from_rows(ElementSize::F32, &[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let result = save_heatmap(&matrix, &RenderOptions::default(), &link);
        let _ = fs::remove_file(&link);

        assert!(result.is_err());
    }
}
