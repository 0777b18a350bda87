//! Embedded raster images.

use serde::{Deserialize, Serialize};

/// Native encoding of an extracted image, which decides its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    /// Baseline or progressive JPEG (`DCTDecode`)
    Jpeg,
    /// JPEG 2000 codestream (`JPXDecode`)
    Jpx,
    /// JBIG2 embedded stream (`JBIG2Decode`)
    Jbig2,
    /// CCITT Group 3/4 fax data (`CCITTFaxDecode`)
    Ccitt,
    /// Raw 8-bit gray or RGB samples wrapped into PNG
    Png,
    /// Decoded samples in a layout PNG cannot carry directly
    Raw,
}

impl ImageEncoding {
    /// File extension used on disk.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "jpg",
            ImageEncoding::Jpx => "jpx",
            ImageEncoding::Jbig2 => "jb2",
            ImageEncoding::Ccitt => "ccitt",
            ImageEncoding::Png => "png",
            ImageEncoding::Raw => "raw",
        }
    }

    /// Map a PDF image codec filter name to its encoding.
    ///
    /// Returns `None` for general-purpose filters (Flate, LZW, ...), which
    /// carry raw samples rather than an image codec.
    pub fn from_filter(filter: &str) -> Option<Self> {
        match filter {
            "DCTDecode" | "DCT" => Some(ImageEncoding::Jpeg),
            "JPXDecode" => Some(ImageEncoding::Jpx),
            "JBIG2Decode" => Some(ImageEncoding::Jbig2),
            "CCITTFaxDecode" | "CCF" => Some(ImageEncoding::Ccitt),
            _ => None,
        }
    }

    /// Detect an encoding from magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageEncoding::Jpeg);
        }
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ImageEncoding::Png);
        }
        // JP2 signature box, or a bare J2K codestream
        if data.starts_with(&[0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20])
            || data.starts_with(&[0xFF, 0x4F, 0xFF, 0x51])
        {
            return Some(ImageEncoding::Jpx);
        }
        None
    }
}

impl std::fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// An image pulled out of a page, ready to be written verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedImage {
    /// Encoded bytes
    #[serde(skip_serializing)]
    pub data: Vec<u8>,

    /// Native encoding
    pub encoding: ImageEncoding,

    /// Width in pixels
    pub width: Option<u32>,

    /// Height in pixels
    pub height: Option<u32>,

    /// Color space (e.g., "DeviceRGB", "ICCBased")
    pub color_space: Option<String>,

    /// Bits per component (e.g., 8)
    pub bits_per_component: Option<u8>,
}

impl ExtractedImage {
    /// Create a new image.
    pub fn new(data: Vec<u8>, encoding: ImageEncoding) -> Self {
        Self {
            data,
            encoding,
            width: None,
            height: None,
            color_space: None,
            bits_per_component: None,
        }
    }

    /// Set image dimensions.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set color space.
    pub fn with_color_space(mut self, color_space: impl Into<String>) -> Self {
        self.color_space = Some(color_space.into());
        self
    }

    /// Set bits per component.
    pub fn with_bits_per_component(mut self, bits: u8) -> Self {
        self.bits_per_component = Some(bits);
        self
    }

    /// File extension for this image.
    pub fn extension(&self) -> &'static str {
        self.encoding.extension()
    }

    /// Size of the encoded data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
