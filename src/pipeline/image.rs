//! Image preparation for image → PDF: decode, flatten, shrink, JPEG-encode.
//!
//! PDF viewers render DCT (JPEG) streams natively, so the prepared image can
//! be embedded without re-compression. Transparency has no meaning in a
//! DeviceRGB XObject and is flattened onto white first.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use tracing::debug;

use super::pdf::JpegImage;

const JPEG_QUALITY: u8 = 90;

/// Errors preparing an image for embedding.
#[derive(Debug, thiserror::Error)]
pub enum ImagePrepError {
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("unrecognised or unsupported image data: {0}")]
    Decode(String),

    #[error("image has zero width or height")]
    Empty,

    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

/// Decode `bytes`, flatten alpha onto white, shrink to `max_width`, and encode
/// as baseline JPEG.
pub fn prepare_image(bytes: &[u8], max_width: u32, max_bytes: usize) -> Result<JpegImage, ImagePrepError> {
    if bytes.len() > max_bytes {
        return Err(ImagePrepError::TooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let format = image::guess_format(bytes).ok();
    let img = image::load_from_memory(bytes).map_err(|e| ImagePrepError::Decode(e.to_string()))?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ImagePrepError::Empty);
    }

    let flat = flatten_on_white(&img);
    let flat = if w > max_width {
        let new_h = ((h as f64) * (max_width as f64) / (w as f64)).round().max(1.0) as u32;
        image::imageops::resize(&flat, max_width, new_h, FilterType::Lanczos3)
    } else {
        flat
    };

    let (width, height) = flat.dimensions();
    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY)
        .encode_image(&DynamicImage::ImageRgb8(flat))
        .map_err(|e| ImagePrepError::Encode(e.to_string()))?;

    debug!(
        ?format,
        src_width = w,
        src_height = h,
        width,
        height,
        jpeg_bytes = data.len(),
        "Prepared image for embedding"
    );
    Ok(JpegImage { data, width, height })
}

/// Composite every pixel over an opaque white background.
fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Whether the bytes look like one of the accepted raster formats.
pub fn is_supported_image(bytes: &[u8]) -> bool {
    matches!(
        image::guess_format(bytes),
        Ok(ImageFormat::Jpeg
            | ImageFormat::Png
            | ImageFormat::Gif
            | ImageFormat::Bmp
            | ImageFormat::Tiff
            | ImageFormat::WebP)
    )
}
