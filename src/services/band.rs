//! IELTS band arithmetic shared by the store, the scorer parser and the API.

/// Averages the four criteria and rounds half-up to the nearest 0.5 band.
///
/// Criterion bands are multiples of 0.5, so the sum, the quarter and the doubling are
/// all exact in binary floating point and no epsilon is needed.
pub(crate) fn overall_band_score(criteria: [f64; 4]) -> f64 {
    let average = criteria.iter().sum::<f64>() / 4.0;
    (average * 2.0 + 0.5).floor() / 2.0
}

pub(crate) fn average(criteria: [f64; 4]) -> f64 {
    criteria.iter().sum::<f64>() / 4.0
}

/// True for values in 1.0..=9.0 that sit on a half-band step.
pub(crate) fn is_valid_band(value: f64) -> bool {
    value.is_finite() && (1.0..=9.0).contains(&value) && (value * 2.0).fract() == 0.0
}

pub(crate) fn band_description(score: f64) -> &'static str {
    match score {
        s if s >= 9.0 => "Expert User",
        s if s >= 8.0 => "Very Good User",
        s if s >= 7.0 => "Good User",
        s if s >= 6.0 => "Competent User",
        s if s >= 5.0 => "Modest User",
        s if s >= 4.0 => "Limited User",
        s if s >= 3.0 => "Extremely Limited User",
        s if s >= 2.0 => "Intermittent User",
        _ => "Non-User",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_rounds_half_up() {
        let cases = [
            ([7.0, 7.0, 7.0, 7.0], 7.0),
            ([6.0, 6.5, 7.0, 7.5], 7.0),
            ([8.0, 8.0, 9.0, 9.0], 8.5),
            ([7.0, 6.5, 7.0, 6.5], 7.0),
            ([6.0, 6.0, 6.5, 6.5], 6.5),
            ([6.0, 6.0, 6.0, 6.5], 6.0),
            ([1.0, 1.0, 1.0, 1.0], 1.0),
            ([9.0, 9.0, 9.0, 9.0], 9.0),
        ];

        for (criteria, expected) in cases {
            assert_eq!(overall_band_score(criteria), expected, "criteria {criteria:?}");
        }
    }

    #[test]
    fn overall_is_idempotent_on_its_own_output() {
        let overall = overall_band_score([5.5, 6.0, 6.5, 7.0]);
        assert_eq!(overall_band_score([overall; 4]), overall);
    }

    #[test]
    fn band_validation_requires_half_steps_in_range() {
        assert!(is_valid_band(1.0));
        assert!(is_valid_band(6.5));
        assert!(is_valid_band(9.0));
        assert!(!is_valid_band(0.5));
        assert!(!is_valid_band(9.5));
        assert!(!is_valid_band(6.25));
        assert!(!is_valid_band(f64::NAN));
    }

    #[test]
    fn band_descriptions_follow_thresholds() {
        assert_eq!(band_description(9.0), "Expert User");
        assert_eq!(band_description(7.5), "Good User");
        assert_eq!(band_description(6.0), "Competent User");
        assert_eq!(band_description(1.5), "Non-User");
    }
}
