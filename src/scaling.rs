//! Scaling and clamping shared by the action executor and the state cache

use thiserror::Error;

/// Numeric range that cannot be mapped from
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ScalingError {
    #[error("degenerate source range [{lo}, {hi}]")]
    DegenerateRange { lo: f64, hi: f64 },
}

/// Bound `value` to `[lo, hi]`
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Linearly map `value` from `[src_lo, src_hi]` onto `[dst_lo, dst_hi]`, then clamp
///
/// Fails instead of producing NaN or infinity when the source range is empty.
pub fn rescale(
    value: f64,
    src_lo: f64,
    src_hi: f64,
    dst_lo: f64,
    dst_hi: f64,
) -> Result<f64, ScalingError> {
    check_source(src_lo, src_hi)?;

    // Exact endpoints, free of rounding error
    if value == src_lo {
        return Ok(dst_lo);
    }
    if value == src_hi {
        return Ok(dst_hi);
    }

    let relative = (value - src_lo) / (src_hi - src_lo);
    let absolute = dst_lo + relative * (dst_hi - dst_lo);

    Ok(clamp(absolute, dst_lo.min(dst_hi), dst_lo.max(dst_hi)))
}

/// Map a relative movement from the source range's scale onto the destination's
pub fn rescale_delta(
    delta: f64,
    src_lo: f64,
    src_hi: f64,
    dst_lo: f64,
    dst_hi: f64,
) -> Result<f64, ScalingError> {
    check_source(src_lo, src_hi)?;
    Ok(delta * (dst_hi - dst_lo) / (src_hi - src_lo))
}

fn check_source(lo: f64, hi: f64) -> Result<(), ScalingError> {
    if lo == hi || !lo.is_finite() || !hi.is_finite() {
        return Err(ScalingError::DegenerateRange { lo, hi });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rescale_midpoint() {
        assert_eq!(rescale(5.0, 0.0, 10.0, 0.0, 100.0).unwrap(), 50.0);
        assert_eq!(rescale(0.5, 0.0, 1.0, 0.0, 100.0).unwrap(), 50.0);
    }

    #[test]
    fn test_rescale_clamps_out_of_range() {
        assert_eq!(rescale(20.0, 0.0, 10.0, 0.0, 100.0).unwrap(), 100.0);
        assert_eq!(rescale(-3.0, 0.0, 10.0, 0.0, 100.0).unwrap(), 0.0);
    }

    #[test]
    fn test_rescale_inverted_destination() {
        assert_eq!(rescale(0.0, 0.0, 10.0, 100.0, 0.0).unwrap(), 100.0);
        assert_eq!(rescale(2.5, 0.0, 10.0, 100.0, 0.0).unwrap(), 75.0);
    }

    #[test]
    fn test_rescale_degenerate_source_fails() {
        assert_eq!(
            rescale(1.0, 3.0, 3.0, 0.0, 100.0),
            Err(ScalingError::DegenerateRange { lo: 3.0, hi: 3.0 })
        );
        assert!(rescale(1.0, 0.0, f64::INFINITY, 0.0, 1.0).is_err());
        assert!(rescale_delta(1.0, 7.0, 7.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_rescale_delta() {
        assert_eq!(rescale_delta(1.0, 0.0, 10.0, 0.0, 100.0).unwrap(), 10.0);
        assert_eq!(rescale_delta(-2.0, 0.0, 10.0, 0.0, 100.0).unwrap(), -20.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5.0, 0.0, 10.0), 5.0);
        assert_eq!(clamp(-5.0, 0.0, 10.0), 0.0);
        assert_eq!(clamp(50.0, 0.0, 10.0), 10.0);
    }

    proptest! {
        #[test]
        fn prop_clamp_is_idempotent(x in -1e9f64..1e9, lo in -1e6f64..0.0, hi in 0.0f64..1e6) {
            let once = clamp(x, lo, hi);
            prop_assert_eq!(clamp(once, lo, hi), once);
        }

        #[test]
        fn prop_rescale_preserves_order(
            a in -1e4f64..1e4,
            b in -1e4f64..1e4,
            src_lo in -1e3f64..0.0,
            span in 1.0f64..1e3,
        ) {
            let src_hi = src_lo + span;
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            let r_lo = rescale(lo, src_lo, src_hi, 0.0, 100.0).unwrap();
            let r_hi = rescale(hi, src_lo, src_hi, 0.0, 100.0).unwrap();
            prop_assert!(r_lo <= r_hi);
        }

        #[test]
        fn prop_rescale_maps_endpoints_exactly(
            src_lo in -1e3f64..0.0,
            span in 0.5f64..1e3,
            dst_lo in -1e3f64..1e3,
            dst_hi in -1e3f64..1e3,
        ) {
            let src_hi = src_lo + span;
            prop_assert_eq!(rescale(src_lo, src_lo, src_hi, dst_lo, dst_hi).unwrap(), dst_lo);
            prop_assert_eq!(rescale(src_hi, src_lo, src_hi, dst_lo, dst_hi).unwrap(), dst_hi);
        }
    }
}
