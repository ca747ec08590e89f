use std::path::{Path, PathBuf};

use image::RgbImage;
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to load image {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {} has zero area", path.display())]
    Empty { path: PathBuf },
    #[error("texture is {width}x{height}, the device allows at most {max}x{max}")]
    TooLarge { width: u32, height: u32, max: u32 },
}

/// Decodes `path` into tightly packed 8-bit RGB.
pub fn load_rgb_image<P: AsRef<Path>>(path: P) -> Result<RgbImage, AssetError> {
    let path = path.as_ref();
    let image = image::open(path)
        .map_err(|source| AssetError::Load {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(AssetError::Empty {
            path: path.to_path_buf(),
        });
    }
    info!(
        "loaded texture {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Rejects images with a side longer than `max_dimension` texels.
pub fn check_texture_size(image: &RgbImage, max_dimension: u32) -> Result<(), AssetError> {
    let (width, height) = image.dimensions();
    if width > max_dimension || height > max_dimension {
        return Err(AssetError::TooLarge {
            width,
            height,
            max: max_dimension,
        });
    }
    Ok(())
}

/// Expands RGB pixels to RGBA with an opaque alpha channel.
pub fn rgb_to_rgba(image: &RgbImage) -> Vec<u8> {
    image
        .pixels()
        .flat_map(|pixel| [pixel[0], pixel[1], pixel[2], u8::MAX])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_rgb_image("/no/such/wood.jpg").unwrap_err();
        assert!(matches!(err, AssetError::Load { .. }));
        assert!(err.to_string().contains("wood.jpg"));
    }

    #[test]
    fn decodes_png_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grain.png");
        let mut source = RgbImage::new(2, 1);
        source.put_pixel(0, 0, Rgb([200, 120, 40]));
        source.put_pixel(1, 0, Rgb([10, 20, 30]));
        source.save(&path).unwrap();

        let image = load_rgb_image(&path).unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0), &Rgb([200, 120, 40]));
        assert_eq!(
            rgb_to_rgba(&image),
            vec![200, 120, 40, 255, 10, 20, 30, 255]
        );
    }

    #[test]
    fn texture_size_is_checked_against_the_device_limit() {
        let image = RgbImage::new(4096, 16);
        assert!(check_texture_size(&image, 4096).is_ok());
        let err = check_texture_size(&image, 2048).unwrap_err();
        assert!(matches!(
            err,
            AssetError::TooLarge {
                width: 4096,
                height: 16,
                max: 2048
            }
        ));
        assert!(err.to_string().contains("4096x16"));
    }

    #[test]
    fn undecodable_file_is_a_load_error() {
        let file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        std::fs::write(file.path(), b"not a jpeg").unwrap();
        assert!(matches!(
            load_rgb_image(file.path()),
            Err(AssetError::Load { .. })
        ));
    }
}
