use crate::error::{Result, VeracamError};
use serde::{Deserialize, Serialize};

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const RIFF_MAGIC: [u8; 4] = *b"RIFF";
const WEBP_TAG: [u8; 4] = *b"WEBP";
const FTYP_TAG: [u8; 4] = *b"ftyp";
// ISO BMFF brands produced by mobile capture stacks
const HEIC_BRANDS: [[u8; 4]; 4] = [*b"heic", *b"heix", *b"hevc", *b"mif1"];

// shortest prefix that covers every magic check above
const MIN_SNIFF_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Heic,
}

impl ImageFormat {
    /// Identify the container by magic bytes alone. No decode, no re-encode —
    /// the bytes are certified exactly as the sensor pipeline emitted them.
    pub fn sniff(data: &[u8]) -> Result<ImageFormat> {
        if data.is_empty() {
            return Err(VeracamError::Encoding("empty image input".into()));
        }
        if data.len() < MIN_SNIFF_LEN {
            return Err(VeracamError::Encoding(format!(
                "image too short to identify: {} bytes",
                data.len()
            )));
        }
        if data[..3] == JPEG_MAGIC {
            return Ok(ImageFormat::Jpeg);
        }
        if data[..8] == PNG_MAGIC {
            return Ok(ImageFormat::Png);
        }
        if data[..4] == RIFF_MAGIC && data[8..12] == WEBP_TAG {
            return Ok(ImageFormat::Webp);
        }
        if data[4..8] == FTYP_TAG && HEIC_BRANDS.iter().any(|b| data[8..12] == *b) {
            return Ok(ImageFormat::Heic);
        }
        Err(VeracamError::UnrecognizedFormat {
            leading: data[..MIN_SNIFF_LEN.min(data.len())].to_vec(),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Heic => "heic",
        }
    }
}

/// The exact byte sequence fixed at capture time.
///
/// Every downstream hash is computed over this buffer and nothing else.
/// The buffer is owned and only ever exposed as a shared slice, so no later
/// stage can recompress or otherwise rewrite what was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenImage {
    bytes: Box<[u8]>,
    format: ImageFormat,
}

impl FrozenImage {
    /// Take ownership of raw captured bytes, validating only that they carry
    /// a recognizable image container.
    pub fn freeze(raw: Vec<u8>) -> Result<FrozenImage> {
        let format = ImageFormat::sniff(&raw)?;
        Ok(FrozenImage {
            bytes: raw.into_boxed_slice(),
            format,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn jpeg_bytes(total_len: usize) -> Vec<u8> {
        let mut data = vec![0u8; total_len];
        data[..3].copy_from_slice(&JPEG_MAGIC);
        data[3] = 0xE0;
        for (i, b) in data.iter_mut().enumerate().skip(4) {
            *b = (i % 251) as u8;
        }
        data
    }

    #[test]
    fn freeze_keeps_bytes_verbatim() {
        let raw = jpeg_bytes(1024);
        let frozen = FrozenImage::freeze(raw.clone()).unwrap();
        assert_eq!(frozen.as_bytes(), raw.as_slice());
        assert_eq!(frozen.len(), 1024);
        assert_eq!(frozen.format(), ImageFormat::Jpeg);
    }

    #[test]
    fn sniff_png_and_webp() {
        let mut png = vec![0u8; 64];
        png[..8].copy_from_slice(&PNG_MAGIC);
        assert_eq!(ImageFormat::sniff(&png).unwrap(), ImageFormat::Png);

        let mut webp = vec![0u8; 64];
        webp[..4].copy_from_slice(b"RIFF");
        webp[8..12].copy_from_slice(b"WEBP");
        assert_eq!(ImageFormat::sniff(&webp).unwrap(), ImageFormat::Webp);
    }

    #[test]
    fn sniff_heic_brand() {
        let mut heic = vec![0u8; 64];
        heic[4..8].copy_from_slice(b"ftyp");
        heic[8..12].copy_from_slice(b"heic");
        assert_eq!(ImageFormat::sniff(&heic).unwrap(), ImageFormat::Heic);
    }

    #[test]
    fn unknown_magic_is_an_encoding_error() {
        let garbage = vec![0xAAu8; 64];
        assert!(FrozenImage::freeze(garbage).is_err());
    }

    #[test]
    fn empty_and_tiny_inputs_rejected() {
        assert!(FrozenImage::freeze(vec![]).is_err());
        assert!(FrozenImage::freeze(vec![0xFF, 0xD8, 0xFF]).is_err());
    }
}
