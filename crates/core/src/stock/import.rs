//! Parsing operator-supplied code batches.
//!
//! Two input shapes are accepted:
//! - mixed denominations: `"325 ABC123 120 DEF456"`, a number starts a new
//!   entry and the following tokens form its code;
//! - a single denomination: a value plus whitespace-separated codes.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;

use super::NewCode;

static VALUE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static CODE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap());

/// Rejected import input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportParseError {
    #[error("no codes found in input")]
    Empty,

    #[error("code token {0:?} appears before any value")]
    CodeWithoutValue(String),

    #[error("value {0} has no code")]
    ValueWithoutCode(u32),

    #[error("invalid value {0:?}: must be a positive integer")]
    InvalidValue(String),

    #[error("invalid code token {0:?}")]
    InvalidCode(String),
}

fn parse_value(token: &str) -> Result<u32, ImportParseError> {
    match token.parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ImportParseError::InvalidValue(token.to_string())),
    }
}

fn check_code(token: &str) -> Result<(), ImportParseError> {
    if CODE_TOKEN.is_match(token) {
        Ok(())
    } else {
        Err(ImportParseError::InvalidCode(token.to_string()))
    }
}

/// Parse `value code [value code ...]` text.
///
/// Codes split over several tokens are joined with a single space.
pub fn parse_code_pairs(input: &str) -> Result<Vec<NewCode>, ImportParseError> {
    let mut codes = Vec::new();
    let mut current: Option<(u32, Vec<&str>)> = None;

    for token in input.split_whitespace() {
        if VALUE_TOKEN.is_match(token) {
            if let Some((value, parts)) = current.take() {
                codes.push(finish_entry(value, parts)?);
            }
            current = Some((parse_value(token)?, Vec::new()));
        } else {
            check_code(token)?;
            match current.as_mut() {
                Some((_, parts)) => parts.push(token),
                None => return Err(ImportParseError::CodeWithoutValue(token.to_string())),
            }
        }
    }

    if let Some((value, parts)) = current {
        codes.push(finish_entry(value, parts)?);
    }

    if codes.is_empty() {
        return Err(ImportParseError::Empty);
    }
    Ok(codes)
}

fn finish_entry(value: u32, parts: Vec<&str>) -> Result<NewCode, ImportParseError> {
    if parts.is_empty() {
        return Err(ImportParseError::ValueWithoutCode(value));
    }
    Ok(NewCode {
        value,
        code: parts.join(" "),
    })
}

/// Build a single-denomination batch from whitespace-separated codes.
pub fn parse_batch(value: u32, input: &str) -> Result<Vec<NewCode>, ImportParseError> {
    if value == 0 {
        return Err(ImportParseError::InvalidValue(value.to_string()));
    }

    let codes = input
        .split_whitespace()
        .map(|token| {
            check_code(token)?;
            Ok(NewCode {
                value,
                code: token.to_string(),
            })
        })
        .collect::<Result<Vec<_>, ImportParseError>>()?;

    if codes.is_empty() {
        return Err(ImportParseError::Empty);
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(value: u32, code: &str) -> NewCode {
        NewCode {
            value,
            code: code.to_string(),
        }
    }

    #[test]
    fn test_pairs_on_one_line() {
        let parsed = parse_code_pairs("325 ABC123 120 DEF456").unwrap();
        assert_eq!(parsed, vec![code(325, "ABC123"), code(120, "DEF456")]);
    }

    #[test]
    fn test_pairs_across_lines() {
        let parsed = parse_code_pairs("325 ABC123\n120 DEF456\n\n60 GHI789").unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[2], code(60, "GHI789"));
    }

    #[test]
    fn test_multi_token_code_is_joined() {
        let parsed = parse_code_pairs("60 ABCD EFGH").unwrap();
        assert_eq!(parsed, vec![code(60, "ABCD EFGH")]);
    }

    #[test]
    fn test_code_before_value() {
        assert_eq!(
            parse_code_pairs("ABC123 325"),
            Err(ImportParseError::CodeWithoutValue("ABC123".to_string()))
        );
    }

    #[test]
    fn test_value_without_code() {
        assert_eq!(
            parse_code_pairs("325 ABC123 120"),
            Err(ImportParseError::ValueWithoutCode(120))
        );
    }

    #[test]
    fn test_zero_value_rejected() {
        assert_eq!(
            parse_code_pairs("0 ABC123"),
            Err(ImportParseError::InvalidValue("0".to_string()))
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_code_pairs("   \n "), Err(ImportParseError::Empty));
        assert_eq!(parse_batch(60, ""), Err(ImportParseError::Empty));
    }

    #[test]
    fn test_invalid_code_token() {
        assert_eq!(
            parse_code_pairs("60 <script>"),
            Err(ImportParseError::InvalidCode("<script>".to_string()))
        );
    }

    #[test]
    fn test_batch() {
        let parsed = parse_batch(660, "CODE1\nCODE2 CODE3").unwrap();
        assert_eq!(
            parsed,
            vec![code(660, "CODE1"), code(660, "CODE2"), code(660, "CODE3")]
        );
        assert!(parse_batch(0, "CODE1").is_err());
    }
}
