/// Arithmetic mean, `None` for an empty slice.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation, `None` for an empty slice.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    let avg = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = avg - *value;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;

    Some(variance.sqrt())
}

/// `100 * part / total`, or 0 when there is nothing to divide by.
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_response_times() {
        assert_eq!(mean(&[100.0, 300.0]), Some(200.0));
        assert!((mean(&[500.0, 2000.0, 1200.0]).unwrap() - 3700.0 / 3.0).abs() < 1e-9);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn std_dev_is_population() {
        assert_eq!(std_dev(&[100.0, 300.0]), Some(100.0));
        assert_eq!(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Some(2.0));
        assert_eq!(std_dev(&[750.0]), Some(0.0));
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn percentage_of_nothing_is_zero() {
        assert_eq!(percentage(1, 2), 50.0);
        assert_eq!(percentage(0, 0), 0.0);
        assert!((percentage(1, 3) - 33.333).abs() < 1e-3);
    }
}
