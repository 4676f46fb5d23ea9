use anyhow::{Result, anyhow};
use yuv::{YuvPackedImage, YuvRange, YuvStandardMatrix, yuyv422_to_bgra};

use crate::device::{ColorData, ColorFormat};

/// Writes the frame into the persistent BGRA buffer, converting when the
/// device did not deliver BGRA natively.
pub fn write_bgra(color: &ColorData, out: &mut [u8]) -> Result<()> {
    let area = color.width as usize * color.height as usize;
    if out.len() != area * 4 {
        return Err(anyhow!(
            "BGRA target size mismatch: got {}, expected {}",
            out.len(),
            area * 4
        ));
    }

    match color.format {
        ColorFormat::Bgra => {
            if color.bytes.len() < area * 4 {
                return Err(anyhow!(
                    "BGRA frame too small: got {}, expected {}",
                    color.bytes.len(),
                    area * 4
                ));
            }
            out.copy_from_slice(&color.bytes[..area * 4]);
            Ok(())
        }
        ColorFormat::Yuy2 => yuy2_to_bgra(&color.bytes, color.width, color.height, out),
    }
}

fn yuy2_to_bgra(data: &[u8], width: u32, height: u32, out: &mut [u8]) -> Result<()> {
    let expected_len = width as usize * height as usize * 2;
    if data.len() < expected_len {
        return Err(anyhow!(
            "YUY2 buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let packed = YuvPackedImage {
        yuy: &data[..expected_len],
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_bgra(
        &packed,
        out,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUY2→BGRA failed: {err:?}"))?;

    Ok(())
}
