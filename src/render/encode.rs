//! Quantized PNG encoding for e-ink panels.
//!
//! A panel displays `2^depth` discrete gray levels, so a rendered frame is
//! quantized to exactly that palette before encoding. Simple per-pixel
//! rounding bands badly on hardware; we use ordered (Bayer 8×8) dithering
//! instead. The whole path is pure integer arithmetic, so identical input
//! always yields byte-identical PNG output.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::error::CoreError;

/// Payloads under this many bytes are comfortably within budget.
pub const GREEN_LIMIT: usize = 75 * 1024;
/// Payloads under this many bytes still fit; above is over budget.
pub const YELLOW_LIMIT: usize = 100 * 1024;

/// Classic Bayer 8×8 threshold matrix (values 0..=63).
const BAYER_8X8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

// =============================================================================
// Payload budget
// =============================================================================

/// Size classification of an encoded payload, as shown in the preview UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadBudget {
    Green,
    Yellow,
    Red,
}

impl PayloadBudget {
    /// Pure function of the encoded byte count.
    pub fn classify(bytes: usize) -> Self {
        if bytes < GREEN_LIMIT {
            Self::Green
        } else if bytes < YELLOW_LIMIT {
            Self::Yellow
        } else {
            Self::Red
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

// =============================================================================
// Encoded frame
// =============================================================================

/// A quantized, PNG-encoded frame plus its size classification.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub budget: PayloadBudget,
}

impl EncodedFrame {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

// =============================================================================
// Quantization
// =============================================================================

/// Quantize a grayscale frame to `2^depth` evenly spaced gray levels using
/// ordered dithering.
///
/// Deterministic: identical input frame and depth always produce an
/// identical output frame.
pub fn quantize(frame: &GrayImage, depth: u8) -> Result<GrayImage, CoreError> {
    if !(1..=8).contains(&depth) {
        return Err(CoreError::Validation(format!(
            "color depth must be between 1 and 8, got {depth}"
        )));
    }

    let steps = (1u32 << depth) - 1;
    let mut out = GrayImage::new(frame.width(), frame.height());

    for (x, y, px) in frame.enumerate_pixels() {
        let v = u32::from(px[0]);
        // Position within the level ladder: base level plus rem/255 of a step.
        let scaled = v * steps;
        let base = scaled / 255;
        let rem = scaled % 255;
        // Ordered dither: bump to the next level when the fractional part
        // exceeds the cell threshold (t + 0.5)/64, in integer form.
        let t = u32::from(BAYER_8X8[(y & 7) as usize][(x & 7) as usize]);
        let idx = base + u32::from(rem * 128 > (2 * t + 1) * 255);
        out.put_pixel(x, y, Luma([level_value(idx, steps)]));
    }

    Ok(out)
}

/// Gray value of level `idx` on a ladder of `steps + 1` evenly spaced
/// levels over 0..=255 (rounded integer division).
fn level_value(idx: u32, steps: u32) -> u8 {
    debug_assert!(idx <= steps);
    ((idx * 255 * 2 + steps) / (2 * steps)) as u8
}

// =============================================================================
// PNG encoding
// =============================================================================

/// Encode a grayscale frame as PNG, reporting the byte size via the buffer
/// length (no re-decode needed by callers).
pub fn encode_png(frame: &GrayImage) -> Result<Vec<u8>, CoreError> {
    let mut buffer = Cursor::new(Vec::new());
    frame
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| CoreError::RenderEngine(format!("png encoding failed: {e}")))?;
    Ok(buffer.into_inner())
}

/// Full encoder path: grayscale conversion, quantization, PNG encoding,
/// budget classification.
pub fn quantize_and_encode(frame: &DynamicImage, depth: u8) -> Result<EncodedFrame, CoreError> {
    let gray = frame.to_luma8();
    let quantized = quantize(&gray, depth)?;
    let bytes = encode_png(&quantized)?;
    let budget = PayloadBudget::classify(bytes.len());
    Ok(EncodedFrame { bytes, budget })
}

// =============================================================================
// Tests
// =============================================================================
