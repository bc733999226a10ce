//! Region support and scalar computation.
//!
//! A region is a rectangular sub-volume of normalized design space: one
//! `(start, peak, end)` tent per axis. Its scalar at a normalized point is
//! the product of the per-axis tent heights, in `[0, 1]`.

/// Per-axis `(start, peak, end)` support in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTent {
    pub start: f64,
    pub peak: f64,
    pub end: f64,
}

impl AxisTent {
    pub fn new(start: f64, peak: f64, end: f64) -> Self {
        Self { start, peak, end }
    }

    /// The implied tent for a peak with no intermediate region:
    /// `(min(peak, 0), peak, max(peak, 0))`.
    pub fn from_peak(peak: f64) -> Self {
        Self {
            start: peak.min(0.0),
            peak,
            end: peak.max(0.0),
        }
    }

    /// Full neutral support; contributes scalar 1 everywhere.
    pub fn neutral() -> Self {
        Self {
            start: -1.0,
            peak: 0.0,
            end: 1.0,
        }
    }

    fn scalar(&self, f: f64) -> f64 {
        // A zero peak means the region does not vary on this axis.
        if self.peak == 0.0 {
            return 1.0;
        }
        if f < self.start || f > self.end {
            return 0.0;
        }
        if f == self.peak {
            return 1.0;
        }
        if f < self.peak {
            let range = self.peak - self.start;
            if range == 0.0 {
                1.0
            } else {
                (f - self.start) / range
            }
        } else {
            let range = self.end - self.peak;
            if range == 0.0 {
                1.0
            } else {
                (self.end - f) / range
            }
        }
    }
}

/// A region of normalized design space carrying a delta set.
///
/// Axes are in fvar order; a region defined over fewer axes than the font
/// treats the rest as neutral.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Region {
    axes: Vec<AxisTent>,
}

impl Region {
    pub fn new(axes: Vec<AxisTent>) -> Self {
        Self { axes }
    }

    /// Builds a region from peak coordinates alone (gvar tuples without an
    /// intermediate start/end record).
    pub fn from_peaks(peaks: &[f64]) -> Self {
        Self {
            axes: peaks.iter().map(|p| AxisTent::from_peak(*p)).collect(),
        }
    }

    /// Builds a region from explicit start/peak/end coordinate arrays.
    pub fn from_tuples(starts: &[f64], peaks: &[f64], ends: &[f64]) -> Self {
        Self {
            axes: peaks
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    AxisTent::new(
                        starts.get(i).copied().unwrap_or(p.min(0.0)),
                        *p,
                        ends.get(i).copied().unwrap_or(p.max(0.0)),
                    )
                })
                .collect(),
        }
    }

    pub fn axes(&self) -> &[AxisTent] {
        &self.axes
    }

    /// True when every peak sits at zero, i.e. the region only describes the
    /// default instance.
    pub fn is_neutral(&self) -> bool {
        self.axes.iter().all(|a| a.peak == 0.0)
    }

    /// Computes the scalar contribution of this region at a normalized
    /// point. Axes beyond the region's own list are neutral; a zero on any
    /// axis short-circuits to zero.
    pub fn scalar_at(&self, coords: &[f64]) -> f64 {
        let mut scalar = 1.0;
        for (i, tent) in self.axes.iter().enumerate() {
            let f = coords.get(i).copied().unwrap_or(0.0);
            let axis_scalar = tent.scalar(f);
            if axis_scalar == 0.0 {
                return 0.0;
            }
            scalar *= axis_scalar;
        }
        scalar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_at_peak_is_one() {
        let region = Region::from_peaks(&[1.0, 0.0]);
        assert_eq!(region.scalar_at(&[1.0, 0.0]), 1.0);
    }

    #[test]
    fn scalar_interpolates_toward_peak() {
        let region = Region::from_peaks(&[1.0]);
        assert_eq!(region.scalar_at(&[0.5]), 0.5);
        assert_eq!(region.scalar_at(&[0.25]), 0.25);
    }

    #[test]
    fn scalar_outside_support_is_zero() {
        let region = Region::from_peaks(&[1.0]);
        assert_eq!(region.scalar_at(&[-0.5]), 0.0);

        let region = Region::new(vec![AxisTent::new(0.25, 0.5, 0.75)]);
        assert_eq!(region.scalar_at(&[0.1]), 0.0);
        assert_eq!(region.scalar_at(&[0.9]), 0.0);
    }

    #[test]
    fn scalar_descends_past_peak() {
        let region = Region::new(vec![AxisTent::new(0.0, 0.5, 1.0)]);
        assert_eq!(region.scalar_at(&[0.75]), 0.5);
        assert_eq!(region.scalar_at(&[0.5]), 1.0);
    }

    #[test]
    fn degenerate_slopes_count_as_one() {
        // start == peak: the rising slope collapses
        let region = Region::new(vec![AxisTent::new(0.5, 0.5, 1.0)]);
        assert_eq!(region.scalar_at(&[0.5]), 1.0);
        // end == peak: the falling slope collapses
        let region = Region::new(vec![AxisTent::new(0.0, 0.5, 0.5)]);
        assert_eq!(region.scalar_at(&[0.5]), 1.0);
        assert_eq!(region.scalar_at(&[0.75]), 0.0);
    }

    #[test]
    fn neutral_axis_contributes_one() {
        let region = Region::new(vec![AxisTent::neutral(), AxisTent::from_peak(1.0)]);
        assert_eq!(region.scalar_at(&[0.9, 1.0]), 1.0);
        assert_eq!(region.scalar_at(&[-0.9, 0.5]), 0.5);
    }

    #[test]
    fn multi_axis_product() {
        let region = Region::from_peaks(&[1.0, 1.0]);
        assert_eq!(region.scalar_at(&[0.5, 0.5]), 0.25);
    }

    #[test]
    fn missing_axes_default_to_neutral() {
        let region = Region::from_peaks(&[1.0]);
        // second axis is absent from the region: no effect
        assert_eq!(region.scalar_at(&[1.0, -1.0]), 1.0);
        // region axis beyond the supplied coords reads as zero
        let region = Region::from_peaks(&[0.0, 1.0]);
        assert_eq!(region.scalar_at(&[0.0]), 0.0);
    }

    #[test]
    fn scalar_bounds_hold() {
        let region = Region::new(vec![AxisTent::new(-1.0, -0.25, 0.0), AxisTent::new(0.0, 0.75, 1.0)]);
        for x in [-1.0, -0.75, -0.25, -0.1, 0.0, 0.3, 0.75, 1.0] {
            for y in [-1.0, 0.0, 0.4, 0.75, 1.0] {
                let s = region.scalar_at(&[x, y]);
                assert!((0.0..=1.0).contains(&s), "scalar_at([{x}, {y}]) = {s}");
            }
        }
    }

    #[test]
    fn neutral_region_detection() {
        assert!(Region::from_peaks(&[0.0, 0.0]).is_neutral());
        assert!(!Region::from_peaks(&[0.0, 0.5]).is_neutral());
    }
}
