//! Embedded-data image tokens and the helpers that produce them.
//!
//! A token is the conventional `data:<mime>;base64,<payload>` URI. Uploads
//! and camera captures are normalized into this shape before they reach the
//! analyzer, and generated "after" images leave it in the same shape.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

/// Upload ceiling applied by the normalizer.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Formats the upload form accepts.
pub const UPLOAD_FORMATS: [ImageFormat; 2] = [ImageFormat::Png, ImageFormat::Jpeg];

const SWATCH_SIZE: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageToken {
    mime_type: String,
    payload: String,
}

impl ImageToken {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let rest = raw
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| "image token must start with 'data:'".to_string())?;
        let (header, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| "image token must be base64 encoded".to_string())?;
        let mime_type = header.split(';').next().unwrap_or_default().trim();
        if mime_type.is_empty() {
            return Err("image token has no MIME type".to_string());
        }
        let payload = payload.trim();
        if payload.is_empty() {
            return Err("image token has an empty payload".to_string());
        }
        Ok(Self {
            mime_type: mime_type.to_ascii_lowercase(),
            payload: payload.to_string(),
        })
    }

    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            payload: BASE64.encode(bytes),
        }
    }

    /// Wraps an already-encoded payload, e.g. one returned by a model API.
    pub fn from_base64(mime_type: &str, payload: &str) -> Result<Self, String> {
        Self::parse(&format!("data:{mime_type};base64,{payload}"))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn decode_bytes(&self) -> Result<Vec<u8>, String> {
        BASE64
            .decode(self.payload.as_bytes())
            .map_err(|err| format!("image token payload is not valid base64: {err}"))
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.payload)
    }

    pub fn file_extension(&self) -> &'static str {
        ImageFormat::from_mime_type(&self.mime_type)
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub max_bytes: u64,
    /// Camera captures are mirrored to match the live preview.
    pub mirror: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            mirror: false,
        }
    }
}

pub fn encode_image_file(path: &Path, options: &NormalizeOptions) -> Result<ImageToken> {
    let size = fs::metadata(path)
        .with_context(|| format!("failed reading {}", path.display()))?
        .len();
    if size > options.max_bytes {
        bail!(
            "{} is {} bytes, above the {} byte upload limit",
            path.display(),
            size,
            options.max_bytes
        );
    }
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    encode_image_bytes(&bytes, Some(path), options)
}

pub fn encode_image_bytes(
    bytes: &[u8],
    source: Option<&Path>,
    options: &NormalizeOptions,
) -> Result<ImageToken> {
    if bytes.len() as u64 > options.max_bytes {
        bail!("image is above the {} byte upload limit", options.max_bytes);
    }
    let Some(format) = image::guess_format(bytes)
        .ok()
        .or_else(|| source.and_then(|path| ImageFormat::from_path(path).ok()))
    else {
        bail!("input is not a recognized image format");
    };
    if !UPLOAD_FORMATS.contains(&format) {
        bail!(
            "{} uploads are not supported; use PNG or JPEG",
            format.to_mime_type()
        );
    }

    if options.mirror {
        let decoded = image::load_from_memory_with_format(bytes, format)
            .context("failed decoding camera capture")?;
        let mirrored = DynamicImage::ImageRgb8(decoded.fliph().to_rgb8());
        let encoded = encode_dynamic(&mirrored, ImageFormat::Jpeg)?;
        return Ok(ImageToken::from_bytes("image/jpeg", &encoded));
    }

    Ok(ImageToken::from_bytes(format.to_mime_type(), bytes))
}

fn encode_dynamic(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, format)
        .with_context(|| format!("failed encoding image as {format:?}"))?;
    Ok(out.into_inner())
}

/// Splits a stacked before/after collage at `height / 2`.
pub fn split_collage(image: &DynamicImage) -> Result<(DynamicImage, DynamicImage)> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height < 2 {
        bail!("collage is {width}x{height}; need at least two rows to split");
    }
    let mid = height / 2;
    let before = image.crop_imm(0, 0, width, mid);
    let after = image.crop_imm(0, mid, width, height - mid);
    Ok((before, after))
}

/// Writes `before.<ext>` and `after.<ext>` next to each other in `out_dir`.
pub fn write_collage_halves(collage: &Path, out_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let image =
        image::open(collage).with_context(|| format!("failed opening {}", collage.display()))?;
    let (before, after) = split_collage(&image)?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed creating {}", out_dir.display()))?;
    let ext = collage
        .extension()
        .and_then(|value| value.to_str())
        .filter(|value| ImageFormat::from_extension(value).is_some())
        .unwrap_or("png")
        .to_ascii_lowercase();
    let before_path = out_dir.join(format!("before.{ext}"));
    let after_path = out_dir.join(format!("after.{ext}"));
    save_flattened(&before, &before_path)?;
    save_flattened(&after, &after_path)?;
    Ok((before_path, after_path))
}

fn save_flattened(image: &DynamicImage, path: &Path) -> Result<()> {
    // JPEG has no alpha channel.
    let flattened = DynamicImage::ImageRgb8(image.to_rgb8());
    flattened
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))
}

/// Solid placeholder image whose colour is derived from `seed`.
pub fn render_swatch(seed: &str) -> Result<ImageToken> {
    let (r, g, b) = color_from_seed(seed);
    let image = RgbImage::from_pixel(SWATCH_SIZE, SWATCH_SIZE, Rgb([r, g, b]));
    let encoded = encode_dynamic(&DynamicImage::ImageRgb8(image), ImageFormat::Png)?;
    Ok(ImageToken::from_bytes("image/png", &encoded))
}

fn color_from_seed(seed: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(seed.as_bytes());
    (digest[0], digest[1], digest[2])
}

/// Short stable identifier for a photo token, safe to log.
pub fn fingerprint(photo_data: &str) -> String {
    let digest = Sha256::digest(photo_data.as_bytes());
    hex::encode(&digest[..6])
}
