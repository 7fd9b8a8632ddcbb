//! Support normalization.
//!
//! Raw support is heavily right-skewed, so a single linear scale would push
//! almost every node towards zero. The scale is anchored at the median
//! instead: raw values up to the median map linearly onto `[0, 0.5]`, values
//! above it map linearly from `0.5` to `1.0` with `max - median` as the span.

use once_cell::sync::OnceCell;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportScale {
    median: f64,
    maximum: f64,
}

impl SupportScale {
    pub fn new(median: f64, maximum: f64) -> Self {
        Self { median, maximum }
    }

    /// Median (mean of the two middle values for even counts) and maximum
    pub fn from_raw(values: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = values
            .into_iter()
            .map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 })
            .collect();
        if values.is_empty() {
            return Self::new(0.0, 0.0);
        }
        values.sort_by(f64::total_cmp);
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };
        Self::new(median, values[values.len() - 1])
    }

    pub fn median(&self) -> f64 {
        self.median
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn normalize(&self, raw: f64) -> f64 {
        if !raw.is_finite() || raw <= 0.0 {
            return 0.0;
        }
        let value = if raw <= self.median {
            0.5 * raw / self.median
        } else if self.maximum > self.median {
            0.5 + 0.5 * (raw - self.median) / (self.maximum - self.median)
        } else {
            1.0
        };
        value.clamp(0.0, 1.0)
    }
}

/// Lazily computed [`SupportScale`], owned by one graph instance
#[derive(Debug, Default)]
pub struct SupportCache {
    scale: OnceCell<SupportScale>,
}

impl SupportCache {
    pub fn get_or_init(&self, compute: impl FnOnce() -> SupportScale) -> SupportScale {
        *self.scale.get_or_init(compute)
    }

    /// Must be called whenever the node universe or raw supports change
    pub fn invalidate(&mut self) {
        self.scale = OnceCell::new();
    }

    pub fn is_computed(&self) -> bool {
        self.scale.get().is_some()
    }
}

impl Clone for SupportCache {
    fn clone(&self) -> Self {
        let cache = Self::default();
        if let Some(scale) = self.scale.get() {
            let _ = cache.scale.set(*scale);
        }
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_median_maps_to_half() {
        let raw = [1.0, 2.0, 2.0, 2.0, 5.0, 100.0];
        let scale = SupportScale::from_raw(raw);
        assert_eq!(scale.median(), 2.0);
        assert_eq!(scale.maximum(), 100.0);
        assert_eq!(scale.normalize(2.0), 0.5);
        assert_eq!(scale.normalize(1.0), 0.25);
        assert_eq!(scale.normalize(100.0), 1.0);
        assert!((scale.normalize(5.0) - (0.5 + 0.5 * 3.0 / 98.0)).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_on_sample() {
        let raw = [1.0, 2.0, 2.0, 2.0, 5.0, 100.0];
        let scale = SupportScale::from_raw(raw);
        let normalized: Vec<f64> = raw.iter().map(|&r| scale.normalize(r)).collect();
        assert!(normalized.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_degenerate_scales() {
        let empty = SupportScale::from_raw(Vec::<f64>::new());
        assert_eq!(empty.normalize(3.0), 1.0);
        let flat = SupportScale::from_raw([4.0, 4.0, 4.0]);
        assert_eq!(flat.normalize(4.0), 0.5);
        assert_eq!(flat.normalize(0.0), 0.0);
        assert_eq!(flat.normalize(-1.0), 0.0);
        assert_eq!(flat.normalize(f64::NAN), 0.0);
    }

    #[test]
    fn test_cache_invalidation() {
        let mut cache = SupportCache::default();
        let first = cache.get_or_init(|| SupportScale::new(1.0, 2.0));
        let again = cache.get_or_init(|| SupportScale::new(9.0, 9.0));
        assert_eq!(first, again);
        cache.invalidate();
        assert!(!cache.is_computed());
        assert_eq!(
            cache.get_or_init(|| SupportScale::new(9.0, 9.0)),
            SupportScale::new(9.0, 9.0)
        );
    }

    proptest! {
        #[test]
        fn prop_normalized_support_in_unit_range(
            raw in prop::collection::vec(0.0f64..1e6, 1..200),
            probe in -10.0f64..2e6,
        ) {
            let scale = SupportScale::from_raw(raw.iter().copied());
            let v = scale.normalize(probe);
            prop_assert!((0.0..=1.0).contains(&v));
        }

        #[test]
        fn prop_normalization_is_monotonic(
            raw in prop::collection::vec(0.0f64..1e4, 1..100),
            a in 0.0f64..1e4,
            b in 0.0f64..1e4,
        ) {
            let scale = SupportScale::from_raw(raw.iter().copied());
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(scale.normalize(lo) <= scale.normalize(hi));
        }
    }
}
