/// A simple statistics module with some utility functions such as calculation of percentiles.
use statrs::statistics::{Data, OrderStatistics};

pub fn percentile(numbers: &[f64], percentile: usize) -> f64 {
    let mut data = Data::new(numbers.to_vec());

    data.percentile(percentile)
}

/// 10th, 50th and 90th percentiles, or `None` for an empty sample.
pub fn spread(numbers: &[f64]) -> Option<(f64, f64, f64)> {
    if numbers.is_empty() {
        return None;
    }
    Some((
        percentile(numbers, 10),
        percentile(numbers, 50),
        percentile(numbers, 90),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::*;

    #[fixture]
    fn numbers() -> [f64; 10] {
        [9.0, 3.0, 3.0, 4.0, 5.0, 4.9, 8.0, 3.3, 2.0, 0.1]
    }

    #[rstest]
    fn test_percentile(numbers: [f64; 10]) {
        assert_abs_diff_eq!(percentile(&numbers, 70), 4.95, epsilon = 1e-2);
        assert_abs_diff_eq!(percentile(&numbers, 50), 3.65, epsilon = 1e-2);
    }

    #[rstest]
    fn test_spread(numbers: [f64; 10]) {
        let (low, median, high) = spread(&numbers).unwrap();
        assert!(low <= median && median <= high);
        assert_abs_diff_eq!(median, 3.65, epsilon = 1e-2);
        assert_eq!(spread(&[]), None);
    }
}
