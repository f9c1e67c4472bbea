//! Pixel format conversion
//!
//! Pure-Rust BT.601 conversions for the two hops the streaming path
//! needs: YUYV (V4L2 capture) → RGB24, and RGB24 → YUV420 planar (the
//! layout the video tracks hand to the transport).

use crate::error::{AppError, Result};

use super::format::{PixelFormat, Resolution};

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert packed YUYV 4:2:2 to RGB24
pub fn yuyv_to_rgb24(yuyv: &[u8], resolution: Resolution) -> Result<Vec<u8>> {
    let expected = PixelFormat::Yuyv.frame_size(resolution);
    if yuyv.len() < expected {
        return Err(AppError::Camera(format!(
            "YUYV buffer too small: {} < {} for {}",
            yuyv.len(),
            expected,
            resolution
        )));
    }

    let mut rgb = vec![0u8; PixelFormat::Rgb24.frame_size(resolution)];
    for (chunk, out) in yuyv[..expected].chunks_exact(4).zip(rgb.chunks_exact_mut(6)) {
        let y0 = chunk[0] as i32;
        let u = chunk[1] as i32 - 128;
        let y1 = chunk[2] as i32;
        let v = chunk[3] as i32 - 128;

        for (y, px) in [(y0, 0), (y1, 3)] {
            let c = (y - 16).max(0) * 298;
            out[px] = clamp_u8((c + 409 * v + 128) >> 8);
            out[px + 1] = clamp_u8((c - 100 * u - 208 * v + 128) >> 8);
            out[px + 2] = clamp_u8((c + 516 * u + 128) >> 8);
        }
    }

    Ok(rgb)
}

/// Convert RGB24 to YUV420 planar (I420)
///
/// Chroma is subsampled one sample per 2x2 block. Odd dimensions are
/// rejected; capture resolutions are always even.
pub fn rgb24_to_yuv420(rgb: &[u8], resolution: Resolution) -> Result<Vec<u8>> {
    let width = resolution.width as usize;
    let height = resolution.height as usize;
    if width % 2 != 0 || height % 2 != 0 {
        return Err(AppError::Camera(format!(
            "YUV420 requires even dimensions, got {}",
            resolution
        )));
    }

    let expected = PixelFormat::Rgb24.frame_size(resolution);
    if rgb.len() < expected {
        return Err(AppError::Camera(format!(
            "RGB24 buffer too small: {} < {} for {}",
            rgb.len(),
            expected,
            resolution
        )));
    }

    let y_size = width * height;
    let uv_size = y_size / 4;
    let mut out = vec![0u8; y_size + uv_size * 2];
    let (y_plane, chroma) = out.split_at_mut(y_size);
    let (u_plane, v_plane) = chroma.split_at_mut(uv_size);

    for row in 0..height {
        for col in 0..width {
            let px = (row * width + col) * 3;
            let r = rgb[px] as i32;
            let g = rgb[px + 1] as i32;
            let b = rgb[px + 2] as i32;

            y_plane[row * width + col] = clamp_u8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16);

            // One chroma sample per 2x2 block, taken at the top-left pixel
            if row % 2 == 0 && col % 2 == 0 {
                let idx = (row / 2) * (width / 2) + col / 2;
                u_plane[idx] = clamp_u8(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128);
                v_plane[idx] = clamp_u8(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128);
            }
        }
    }

    Ok(out)
}
