//! Image normalization: decode any supported upload, coerce it to RGBA8 and
//! re-encode it as PNG.
//!
//! Decoding and pixel coercion are separate gates with separate errors. A
//! decoder can succeed and still hand back a layout we refuse to store.

use image::{
    ColorType, DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, RgbaImage,
    codecs::png::PngEncoder,
};
use std::io::Cursor;
use thiserror::Error;

/// Source encodings accepted for upload.
pub const SUPPORTED_FORMATS: [ImageFormat; 3] =
    [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("error decoding image: {0}")]
    Decode(String),
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),
    #[error("error encoding image: {0}")]
    Encode(String),
}

/// An upload after normalization: the RGBA8 pixels and their PNG encoding.
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    pub pixels: RgbaImage,
    pub encoded: Vec<u8>,
}

/// Run the full decode, coerce and encode sequence over raw upload bytes.
pub fn normalize(bytes: &[u8]) -> Result<CanonicalImage, NormalizeError> {
    let decoded = decode(bytes)?;
    let pixels = canonicalize(decoded)?;
    let encoded = encode_png(&pixels)?;
    Ok(CanonicalImage { pixels, encoded })
}

/// Decode bytes in one of [`SUPPORTED_FORMATS`], sniffed from magic bytes.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, NormalizeError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| NormalizeError::Decode(err.to_string()))?;

    match reader.format() {
        Some(format) if SUPPORTED_FORMATS.contains(&format) => {}
        Some(format) => {
            return Err(NormalizeError::Decode(format!(
                "unsupported image format {:?}",
                format
            )));
        }
        None => return Err(NormalizeError::Decode("unknown image format".into())),
    }

    reader
        .decode()
        .map_err(|err| NormalizeError::Decode(err.to_string()))
}

/// Coerce a decoded image into 32-bit non-premultiplied RGBA.
///
/// Integer layouts convert losslessly in channel count (16-bit samples are
/// narrowed). Anything else is refused rather than guessed at.
pub fn canonicalize(image: DynamicImage) -> Result<RgbaImage, NormalizeError> {
    match image.color() {
        ColorType::L8
        | ColorType::La8
        | ColorType::Rgb8
        | ColorType::Rgba8
        | ColorType::L16
        | ColorType::La16
        | ColorType::Rgb16
        | ColorType::Rgba16 => Ok(image.into_rgba8()),
        other => Err(NormalizeError::UnsupportedPixelFormat(format!("{:?}", other))),
    }
}

/// Encode RGBA8 pixels as PNG with fixed encoder settings.
///
/// Only pixel data is written, so any metadata the upload carried is gone.
pub fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>, NormalizeError> {
    let mut out = Vec::with_capacity(pixels.as_raw().len() / 2);
    PngEncoder::new(&mut out)
        .write_image(
            pixels.as_raw(),
            pixels.width(),
            pixels.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|err| NormalizeError::Encode(err.to_string()))?;
    Ok(out)
}
