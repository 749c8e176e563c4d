//! Raster decode and JPEG encode, thin wrappers over the `image` crate.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageError};
use tracing::debug;

use crate::error::{Error, Result};
use crate::Raster;

/// JPEG quality used for every encode. Maximum, so the debug image and the
/// graph backend input lose as little as possible.
pub const JPEG_QUALITY: u8 = 100;

/// Decode the image at `path` into an RGB raster.
pub fn decode(path: &Path) -> Result<Raster> {
    if !path.is_file() {
        return Err(Error::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let image = image::open(path).map_err(|source| match source {
        ImageError::IoError(ref e) if e.kind() == ErrorKind::NotFound => Error::InputNotFound {
            path: path.to_path_buf(),
        },
        source => Error::Decode {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let raster = image.to_rgb8();
    debug!(
        path = %path.display(),
        width = raster.width(),
        height = raster.height(),
        "decoded captcha image"
    );
    Ok(raster)
}

/// Encode a raster as a maximum-quality JPEG.
pub fn encode_jpeg(raster: &Raster) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode(
        raster.as_raw(),
        raster.width(),
        raster.height(),
        ColorType::Rgb8,
    )?;
    Ok(buf)
}

/// Encode `raster` as JPEG and write it to `path`, overwriting any previous file.
pub fn write_jpeg(raster: &Raster, path: &Path) -> Result<()> {
    let to_error = |detail: String| Error::DebugImageWrite {
        path: path.to_path_buf(),
        detail,
    };
    let bytes = encode_jpeg(raster).map_err(|e| to_error(e.to_string()))?;
    fs::write(path, bytes).map_err(|e| to_error(e.to_string()))
}
