//! Incremental statistics over observation streams

/// Incremental arithmetic mean.
///
/// `count` is the length of the observation sequence *after* appending
/// `value`. A count of zero returns 0 and is only meaningful as a guard.
pub fn running_average(prev_avg: f64, value: f64, count: usize) -> f64 {
    match count {
        0 => 0.0,
        1 => value,
        _ => prev_avg + (value - prev_avg) / count as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_value_is_average() {
        assert_eq!(running_average(0.0, 42.0, 1), 42.0);
    }

    #[test]
    fn test_zero_count_guard() {
        assert_eq!(running_average(10.0, 42.0, 0), 0.0);
    }

    #[test]
    fn test_matches_arithmetic_mean() {
        let values = [12.0, 7.5, 30.0, 0.0, 99.25];
        let mut avg = 0.0;
        for (i, v) in values.iter().enumerate() {
            avg = running_average(avg, *v, i + 1);
        }
        let expected: f64 = values.iter().sum::<f64>() / values.len() as f64;
        assert!((avg - expected).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_tracks_mean(values in proptest::collection::vec(0.0f64..10_000.0, 1..200)) {
            let mut avg = 0.0;
            for (i, v) in values.iter().enumerate() {
                avg = running_average(avg, *v, i + 1);
            }
            let expected: f64 = values.iter().sum::<f64>() / values.len() as f64;
            prop_assert!((avg - expected).abs() < 1e-6);
        }
    }
}
