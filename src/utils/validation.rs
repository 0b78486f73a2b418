use rust_decimal::Decimal;
use validator::ValidationError;

/// Decimal places kept by the weight and min_score columns.
const STORED_SCALE: u32 = 2;

fn exceeds_stored_scale(value: &Decimal) -> bool {
    value.normalize().scale() > STORED_SCALE
}

pub fn validate_min_score(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("min_score_range");
        err.message = Some("min_score must be between 0 and 100".into());
        return Err(err);
    }
    if exceeds_stored_scale(value) {
        let mut err = ValidationError::new("min_score_precision");
        err.message = Some("min_score allows at most two decimal places".into());
        return Err(err);
    }
    Ok(())
}

pub fn validate_weight(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("weight_range");
        err.message = Some("weight must be greater than 0 and at most 100".into());
        return Err(err);
    }
    if exceeds_stored_scale(value) {
        let mut err = ValidationError::new("weight_precision");
        err.message = Some("weight allows at most two decimal places".into());
        return Err(err);
    }
    Ok(())
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn weight_is_open_at_zero_and_closed_at_hundred() {
        assert!(validate_weight(&d("0")).is_err());
        assert!(validate_weight(&d("0.01")).is_ok());
        assert!(validate_weight(&d("100")).is_ok());
        assert!(validate_weight(&d("100.01")).is_err());
    }

    #[test]
    fn weight_finer_than_cents_is_rejected() {
        let err = validate_weight(&d("0.004")).unwrap_err();
        assert_eq!(err.code, "weight_precision");
        assert_eq!(validate_weight(&d("3.335")).unwrap_err().code, "weight_precision");
        assert!(validate_weight(&d("3.35")).is_ok());
        assert!(validate_weight(&d("3.3500")).is_ok());
    }

    #[test]
    fn min_score_finer_than_cents_is_rejected() {
        assert_eq!(validate_min_score(&d("59.995")).unwrap_err().code, "min_score_precision");
        assert!(validate_min_score(&d("59.99")).is_ok());
    }

    #[test]
    fn min_score_is_a_percentage() {
        assert!(validate_min_score(&d("0")).is_ok());
        assert!(validate_min_score(&d("100")).is_ok());
        assert!(validate_min_score(&d("-1")).is_err());
        assert!(validate_min_score(&d("100.5")).is_err());
    }

    #[test]
    fn blank_strings_are_rejected() {
        assert!(validate_not_blank("   ").is_err());
        assert!(validate_not_blank("Title").is_ok());
    }
}
