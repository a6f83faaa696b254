use crate::error::ParseError;

/// Extracts the (average, maximum) angular error from the host's validation
/// result message. The first two numbers after the first `:` are taken, in
/// that order.
pub fn parse_validation_error(message: &str) -> Result<(f64, f64), ParseError> {
    let (_, body) = message
        .split_once(':')
        .ok_or_else(|| ParseError::MissingSeparator(message.to_string()))?;

    let mut numbers = body
        .split_whitespace()
        .filter_map(|token| token.parse::<f64>().ok())
        .filter(|v| v.is_finite());

    match (numbers.next(), numbers.next()) {
        (Some(avg), Some(max)) => Ok((avg, max)),
        _ => Err(ParseError::MissingValues(message.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_result_line() {
        assert_eq!(
            parse_validation_error("validation: HV9 GOOD ERROR 0.41 avg. 0.93 max").unwrap(),
            (0.41, 0.93)
        );
    }

    #[test]
    fn trailing_offset_is_ignored() {
        assert_eq!(
            parse_validation_error("validation: 0.35 avg. 0.83 max  OFFSET 0.12 deg. 3.2,-4.1 pix.").unwrap(),
            (0.35, 0.83)
        );
    }

    #[test]
    fn only_the_first_colon_splits() {
        assert_eq!(parse_validation_error("val: 1.5 avg. 2.25 max: 9 9").unwrap(), (1.5, 2.25));
    }

    #[test]
    fn missing_separator() {
        assert_eq!(
            parse_validation_error("0.4 0.9"),
            Err(ParseError::MissingSeparator("0.4 0.9".into()))
        );
    }

    #[test]
    fn single_number_is_not_enough() {
        assert!(matches!(
            parse_validation_error("validation: 0.4 avg."),
            Err(ParseError::MissingValues(_))
        ));
        assert!(matches!(parse_validation_error("validation aborted:"), Err(ParseError::MissingValues(_))));
    }

    #[test]
    fn words_that_parse_as_floats_are_skipped() {
        assert_eq!(parse_validation_error("v: NaN inf 0.5 avg. 0.7 max").unwrap(), (0.5, 0.7));
    }
}
