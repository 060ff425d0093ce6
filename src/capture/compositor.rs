//! Masks captured pixels against the active monitor layout so areas of the virtual screen
//! that no monitor covers come out black instead of as undefined framebuffer content.

use crate::geometry::Rect;

pub const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Per-pixel coverage of a capture region by the active monitors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageMask {
    width: u32,
    height: u32,
    included: Vec<bool>,
}

impl CoverageMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            included: vec![false; width as usize * height as usize],
        }
    }

    /// Mask for `bounds` (in screen coordinates) covering every monitor part inside it.
    pub fn for_monitors(bounds: Rect, monitors: &[Rect]) -> Self {
        let mut mask = Self::new(bounds.width, bounds.height);
        for monitor in monitors {
            if let Some(visible) = monitor.intersect(bounds) {
                mask.include(visible.offset(-bounds.x, -bounds.y));
            }
        }
        mask
    }

    /// Marks `area` (in mask coordinates) as included. Parts outside the mask are ignored.
    pub fn include(&mut self, area: Rect) {
        let Some(area) = area.intersect(Rect::new(0, 0, self.width, self.height)) else {
            return;
        };
        let stride = self.width as usize;
        let left = area.x as usize;
        let right = area.right() as usize;
        for row in area.y as usize..area.bottom() as usize {
            self.included[row * stride + left..row * stride + right].fill(true);
        }
    }

    pub fn is_included(&self, x: u32, y: u32) -> bool {
        x < self.width
            && y < self.height
            && self.included[y as usize * self.width as usize + x as usize]
    }

    pub fn covers_everything(&self) -> bool {
        self.included.iter().all(|included| *included)
    }
}

/// Replaces every excluded pixel of a tightly packed RGBA buffer with `background`.
pub fn composite(rgba: &mut [u8], mask: &CoverageMask, background: [u8; 4]) {
    for (pixel, included) in rgba.chunks_exact_mut(4).zip(mask.included.iter()) {
        if !included {
            pixel.copy_from_slice(&background);
        }
    }
}

/// Whether the capture needs masking at all: a single monitor always covers what it
/// shows, and window captures are never masked.
pub fn needs_masking(monitors: &[Rect], window_capture: bool) -> bool {
    !window_capture && monitors.len() > 1
}

/// Swaps the first and third byte of every 4-byte pixel (BGRA <-> RGBA).
pub fn swap_red_blue(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
}

/// Sets every alpha byte to fully opaque; used for layouts whose fourth byte is padding.
pub fn force_opaque(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel[3] = u8::MAX;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|index| {
                let value = (index % 251) as u8;
                [value, value.wrapping_add(1), value.wrapping_add(2), 255]
            })
            .collect()
    }

    #[test]
    fn single_full_monitor_mask_leaves_pixels_unchanged() {
        let bounds = Rect::new(0, 0, 16, 9);
        let original = gradient(16, 9);
        let mut pixels = original.clone();
        let mask = CoverageMask::for_monitors(bounds, &[bounds]);
        assert!(mask.covers_everything());

        composite(&mut pixels, &mask, BACKGROUND);
        assert_eq!(pixels, original);
    }

    #[test]
    fn uncovered_area_becomes_black() {
        // Two monitors of different heights side by side: 4x4 and 4x2.
        let bounds = Rect::new(0, 0, 8, 4);
        let monitors = [Rect::new(0, 0, 4, 4), Rect::new(4, 0, 4, 2)];
        let mut pixels = vec![200u8; 8 * 4 * 4];
        let mask = CoverageMask::for_monitors(bounds, &monitors);

        composite(&mut pixels, &mask, BACKGROUND);

        for y in 0..4u32 {
            for x in 0..8u32 {
                let offset = ((y * 8 + x) * 4) as usize;
                let expected = if x >= 4 && y >= 2 {
                    BACKGROUND
                } else {
                    [200; 4]
                };
                assert_eq!(pixels[offset..offset + 4], expected, "pixel {x},{y}");
            }
        }
    }

    #[test]
    fn mask_is_relative_to_capture_origin() {
        let bounds = Rect::new(1910, 10, 20, 4);
        let monitors = [Rect::new(0, 0, 1920, 1080), Rect::new(1920, 200, 1280, 1024)];
        let mask = CoverageMask::for_monitors(bounds, &monitors);

        assert!(mask.is_included(9, 0));
        assert!(!mask.is_included(10, 0));
        assert!(!mask.is_included(19, 3));
        assert!(!mask.is_included(20, 0));
    }

    #[test]
    fn include_ignores_area_outside_mask() {
        let mut mask = CoverageMask::new(4, 4);
        mask.include(Rect::new(-10, -10, 5, 5));
        assert!(!mask.covers_everything());
        mask.include(Rect::new(-10, -10, 100, 100));
        assert!(mask.covers_everything());
    }

    #[test]
    fn swap_red_blue_is_self_inverse() {
        let original = gradient(7, 3);
        let mut pixels = original.clone();
        swap_red_blue(&mut pixels);
        assert_ne!(pixels, original);
        assert_eq!(&pixels[0..4], &[2, 1, 0, 255]);
        swap_red_blue(&mut pixels);
        assert_eq!(pixels, original);
    }

    #[test]
    fn masking_is_skipped_for_single_monitor_and_windows() {
        let one = [Rect::new(0, 0, 10, 10)];
        let two = [Rect::new(0, 0, 10, 10), Rect::new(10, 0, 10, 10)];
        assert!(!needs_masking(&one, false));
        assert!(!needs_masking(&two, true));
        assert!(needs_masking(&two, false));
    }

    #[test]
    fn force_opaque_sets_alpha_only() {
        let mut pixels = vec![1, 2, 3, 0, 4, 5, 6, 7];
        force_opaque(&mut pixels);
        assert_eq!(pixels, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }
}
