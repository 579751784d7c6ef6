//! Position sizing arithmetic shared by the risk checks and trade planning

/// Stop-implied loss of a trade as a fraction of equity.
///
/// `None` for non-positive size or equity and for non-finite inputs.
pub fn risk_fraction(size: f64, entry: f64, stop: f64, equity: f64) -> Option<f64> {
    if !(size > 0.0) || !(equity > 0.0) {
        return None;
    }
    let fraction = size * (entry - stop).abs() / equity;
    fraction.is_finite().then_some(fraction)
}

/// Size that risks exactly `max_risk` of equity with a stop `multiple` ATRs away
pub fn volatility_size(equity: f64, max_risk: f64, atr: f64, multiple: f64) -> Option<f64> {
    if !(equity > 0.0) || !(atr > 0.0) || !(multiple > 0.0) {
        return None;
    }
    let size = equity * max_risk / (atr * multiple);
    (size.is_finite() && size > 0.0).then_some(size)
}

/// |proposed − reference| / reference
pub fn size_deviation(proposed: f64, reference: f64) -> Option<f64> {
    if !(reference > 0.0) || !proposed.is_finite() {
        return None;
    }
    let deviation = (proposed - reference).abs() / reference;
    deviation.is_finite().then_some(deviation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_fraction() {
        assert_eq!(risk_fraction(100.0, 50.0, 49.0, 10_000.0), Some(0.01));
        assert_eq!(risk_fraction(0.0, 50.0, 49.0, 10_000.0), None);
        assert_eq!(risk_fraction(100.0, 50.0, 49.0, 0.0), None);
        assert_eq!(risk_fraction(100.0, f64::INFINITY, 49.0, 10_000.0), None);
    }

    #[test]
    fn test_volatility_size() {
        // 1% of 100k over a 1.5 x 2.0 stop
        let size = volatility_size(100_000.0, 0.01, 2.0, 1.5).unwrap();
        assert!((size - 1000.0 / 3.0).abs() < 1e-9);
        assert_eq!(volatility_size(100_000.0, 0.01, 0.0, 1.5), None);
        assert_eq!(volatility_size(100_000.0, 0.01, f64::NAN, 1.5), None);
    }

    #[test]
    fn test_size_deviation() {
        assert_eq!(size_deviation(125.0, 100.0), Some(0.25));
        assert_eq!(size_deviation(75.0, 100.0), Some(0.25));
        assert_eq!(size_deviation(75.0, 0.0), None);
    }
}
