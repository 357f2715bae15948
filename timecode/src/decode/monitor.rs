//! The x-y scope raster.
//!
//! An optional square byte raster of the post-calibrated incoming signal
//! (shown as the "scope" in a deck interface). The decoder plots one
//! point per sample, scaled by the tracked reference level, and old
//! points fade out over time. Rendering is the host's business; the
//! raster is plain row-major bytes.

use crate::utils::errors::MonitorError;

/// Samples between decay passes over the raster.
pub const MONITOR_DECAY_EVERY: u32 = 512;

pub struct Monitor {
    pixels: Vec<u8>,
    size: usize,
    counter: u32,
}

impl Monitor {
    pub(crate) fn new(size: usize) -> Result<Self, MonitorError> {
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(size * size)
            .map_err(|_| MonitorError::OutOfMemory)?;
        pixels.resize(size * size, 0);

        Ok(Self {
            pixels,
            size,
            counter: 0,
        })
    }

    /// Raster side length in pixels.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Row-major pixel bytes, `size * size` long.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Plot one sample pair, ageing out earlier points as time passes.
    /// `ref_level` is the tracked envelope at half the signal scale.
    pub(crate) fn update(&mut self, x: i32, y: i32, ref_level: i32) {
        self.counter = self.counter.wrapping_add(1);
        if self.counter.is_multiple_of(MONITOR_DECAY_EVERY) {
            for px in &mut self.pixels {
                *px = (u32::from(*px) * 7 / 8) as u8;
            }
        }

        debug_assert!(ref_level > 0);

        let size = self.size as i64;
        let px = size / 2 + i64::from(x) * size / i64::from(ref_level) / 8;
        let py = size / 2 + i64::from(y) * size / i64::from(ref_level) / 8;

        if px < 0 || px >= size || py < 0 || py >= size {
            return;
        }

        self.pixels[(py * size + px) as usize] = 0xff;
    }
}
