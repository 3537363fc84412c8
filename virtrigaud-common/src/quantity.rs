//! Resource-quantity parsing and formatting.
//!
//! API fields carry memory and disk sizes as strings ("4Gi", "512Mi",
//! "100G"). Binary suffixes (Ki/Mi/Gi/Ti/Pi) are powers of 1024, decimal
//! suffixes (K/M/G/T/P) powers of 1000; a bare integer is bytes.

use thiserror::Error;

/// Errors from quantity parsing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity {0:?}")]
    Invalid(String),

    #[error("quantity {0:?} overflows u64 bytes")]
    Overflow(String),
}

/// Parse a quantity string into bytes.
pub fn parse_quantity(input: &str) -> Result<u64, QuantityError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(QuantityError::Empty);
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(QuantityError::Invalid(input.to_string()));
    }

    let value: u64 = digits
        .parse()
        .map_err(|_| QuantityError::Invalid(input.to_string()))?;

    let scale: u64 = match suffix {
        "" => 1,
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        "Pi" => 1 << 50,
        "K" | "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        _ => return Err(QuantityError::Invalid(input.to_string())),
    };

    value
        .checked_mul(scale)
        .ok_or_else(|| QuantityError::Overflow(input.to_string()))
}

/// Format bytes with the largest exact binary suffix.
pub fn format_bytes(bytes: u64) -> String {
    const SUFFIXES: [(&str, u64); 5] = [
        ("Pi", 1 << 50),
        ("Ti", 1 << 40),
        ("Gi", 1 << 30),
        ("Mi", 1 << 20),
        ("Ki", 1 << 10),
    ];
    for (suffix, scale) in SUFFIXES {
        if bytes >= scale && bytes % scale == 0 {
            return format!("{}{}", bytes / scale, suffix);
        }
    }
    bytes.to_string()
}

/// Parse a quantity and require at least `minimum` bytes.
pub fn parse_quantity_at_least(input: &str, minimum: u64) -> Result<u64, QuantityError> {
    let bytes = parse_quantity(input)?;
    if bytes < minimum {
        return Err(QuantityError::Invalid(format!(
            "{} is below the minimum of {}",
            input,
            format_bytes(minimum)
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binary_suffixes() {
        assert_eq!(parse_quantity("1Ki").unwrap(), 1024);
        assert_eq!(parse_quantity("4Gi").unwrap(), 4 * 1024 * 1024 * 1024);
        assert_eq!(parse_quantity("512Mi").unwrap(), 512 * 1024 * 1024);
    }

    #[test]
    fn test_parse_decimal_suffixes() {
        assert_eq!(parse_quantity("100G").unwrap(), 100_000_000_000);
        assert_eq!(parse_quantity("2M").unwrap(), 2_000_000);
    }

    #[test]
    fn test_parse_plain_bytes() {
        assert_eq!(parse_quantity("1048576").unwrap(), 1 << 20);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("Gi").is_err());
        assert!(parse_quantity("4GiB").is_err());
        assert!(parse_quantity("-4Gi").is_err());
    }

    #[test]
    fn test_format_roundtrip() {
        assert_eq!(format_bytes(4 * 1024 * 1024 * 1024), "4Gi");
        assert_eq!(format_bytes(1536), "1536");
        assert_eq!(format_bytes(128 * 1024 * 1024), "128Mi");
    }

    #[test]
    fn test_minimum_bound() {
        assert!(parse_quantity_at_least("128Mi", 128 << 20).is_ok());
        assert!(parse_quantity_at_least("64Mi", 128 << 20).is_err());
    }
}
