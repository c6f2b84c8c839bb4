//! Constants shared by the locator, kernel and transfer engine.
//!
//! ## Kernel presets
//!
//! The exponential-of-semicircle kernel is tabulated for a handful of
//! nominal widths. Each preset pairs a width `w` with the shape factor
//! `beta`; the effective exponent is `beta * w` and the support radius is
//! `w * h / 2`.

/// Linked-list sentinel for "no particle" / "end of column".
pub const EMPTY: i32 = -1;

/// Extra ghost layer added beyond half the widest stencil on each padded axis.
pub const GHOST_MARGIN: usize = 1;

/// Number of Simpson intervals used to integrate a kernel profile.
/// Must be even.
pub const NORM_QUADRATURE_INTERVALS: usize = 4096;

/// A tabulated exponential-of-semicircle kernel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EsPreset {
    /// Nominal kernel width in grid cells.
    pub width: u16,
    /// Shape factor (multiplied by `width` inside the exponent).
    pub beta: f64,
}

impl EsPreset {
    /// Support radius for a particle of this kernel on spacing `h`.
    pub fn alpha(&self, h: f64) -> f64 {
        0.5 * self.width as f64 * h
    }
}

/// 4-point kernel.
pub const ES_W4: EsPreset = EsPreset {
    width: 4,
    beta: 1.785,
};

/// 5-point kernel.
pub const ES_W5: EsPreset = EsPreset {
    width: 5,
    beta: 1.886,
};

/// 6-point kernel.
pub const ES_W6: EsPreset = EsPreset {
    width: 6,
    beta: 1.714,
};

/// All presets, narrowest first.
pub const ES_PRESETS: [EsPreset; 3] = [ES_W4, ES_W5, ES_W6];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_span_their_width() {
        let mut last = 0;
        for preset in ES_PRESETS {
            assert!(preset.width > last);
            last = preset.width;
            // The stencil width recovered from the radius is the nominal one
            let h = 0.125;
            assert_eq!((2.0 * preset.alpha(h) / h).round() as u16, preset.width);
        }
    }
}
