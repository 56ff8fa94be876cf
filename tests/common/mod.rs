#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use tracing_subscriber::EnvFilter;

/// Opt-in log output: `RUST_LOG=lumagrade=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Colour ramp with a bright patch so local-contrast steps have edges to
/// work on.
pub fn test_frame(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let patch = x > width / 3 && x < width / 2 && y > height / 3 && y < height / 2;
        if patch {
            Rgba([235, 230, 220, 255])
        } else {
            Rgba([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) * 3 % 256) as u8,
                255,
            ])
        }
    })
}

pub fn max_channel_diff(a: &RgbaImage, b: &RgbaImage) -> u8 {
    a.as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| x.abs_diff(*y))
        .max()
        .unwrap_or(0)
}
