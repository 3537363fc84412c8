//! Schema-level validation shared by every kind.
//!
//! These checks mirror the schema constraints registered with the
//! orchestrator: DNS-1123 names, bounded collections, CPU and memory limits.

use thiserror::Error;

use virtrigaud_common::quantity::{parse_quantity, QuantityError};

/// Maximum networks attached to a single VM.
pub const MAX_NETWORKS: usize = 10;
/// Maximum extra disks on a single VM.
pub const MAX_DISKS: usize = 20;
/// Maximum tags on a single VM.
pub const MAX_TAGS: usize = 50;
/// CPU count bounds.
pub const MIN_CPU: u32 = 1;
pub const MAX_CPU: u32 = 128;
/// Minimum memory in bytes (128 MiB).
pub const MIN_MEMORY_BYTES: u64 = 128 << 20;
/// Maximum object name length.
pub const MAX_NAME_LEN: usize = 253;

/// Validation failures surfaced as `InvalidSpec`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid name {0:?}: must match ^[a-z0-9]([-a-z0-9]*[a-z0-9])?$ and be at most 253 characters")]
    InvalidName(String),

    #[error("{field}: at most {max} entries allowed, got {actual}")]
    TooMany {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("cpu count {0} outside the allowed range {MIN_CPU}..={MAX_CPU}")]
    CpuOutOfRange(u32),

    #[error("memory {0:?}: {1}")]
    InvalidMemory(String, QuantityError),

    #[error("memory {0:?} is below the 128Mi minimum")]
    MemoryTooSmall(String),

    #[error("{0}")]
    Other(String),
}

/// Validate a DNS-1123 subdomain-style object name.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidName(name.to_string()))
    }
}

/// Validate a bounded collection length.
pub fn validate_count(
    field: &'static str,
    actual: usize,
    max: usize,
) -> Result<(), ValidationError> {
    if actual > max {
        return Err(ValidationError::TooMany { field, max, actual });
    }
    Ok(())
}

/// Validate a CPU count against the schema bounds.
pub fn validate_cpu(cpu: u32) -> Result<(), ValidationError> {
    if !(MIN_CPU..=MAX_CPU).contains(&cpu) {
        return Err(ValidationError::CpuOutOfRange(cpu));
    }
    Ok(())
}

/// Validate a memory quantity string against the schema minimum.
pub fn validate_memory(memory: &str) -> Result<u64, ValidationError> {
    let bytes = parse_quantity(memory)
        .map_err(|e| ValidationError::InvalidMemory(memory.to_string(), e))?;
    if bytes < MIN_MEMORY_BYTES {
        return Err(ValidationError::MemoryTooSmall(memory.to_string()));
    }
    Ok(bytes)
}

/// Validate an IPv4 address in dotted-quad form.
pub fn validate_ipv4(addr: &str) -> Result<(), ValidationError> {
    let octets: Vec<&str> = addr.split('.').collect();
    let valid = octets.len() == 4
        && octets.iter().all(|o| {
            !o.is_empty() && o.len() <= 3 && o.parse::<u16>().map(|v| v <= 255).unwrap_or(false)
        });
    if valid {
        Ok(())
    } else {
        Err(ValidationError::Other(format!(
            "invalid IPv4 address {addr:?}"
        )))
    }
}

/// Validate an IPv4 CIDR such as "10.0.0.0/24".
pub fn validate_cidr(cidr: &str) -> Result<(), ValidationError> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| ValidationError::Other(format!("invalid CIDR {cidr:?}")))?;
    validate_ipv4(addr)?;
    let valid = prefix
        .parse::<u8>()
        .map(|p| p <= 32)
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ValidationError::Other(format!("invalid CIDR {cidr:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("web-01").is_ok());
        assert!(validate_name("a").is_ok());
        assert!(validate_name("0db").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("-web").is_err());
        assert!(validate_name("web-").is_err());
        assert!(validate_name("Web").is_err());
        assert!(validate_name("web_01").is_err());
        assert!(validate_name(&"a".repeat(254)).is_err());
    }

    #[test]
    fn test_validate_cpu_bounds() {
        assert!(validate_cpu(1).is_ok());
        assert!(validate_cpu(128).is_ok());
        assert!(validate_cpu(0).is_err());
        assert!(validate_cpu(129).is_err());
    }

    #[test]
    fn test_validate_memory() {
        assert_eq!(validate_memory("128Mi").unwrap(), 128 << 20);
        assert!(validate_memory("64Mi").is_err());
        assert!(validate_memory("lots").is_err());
    }

    #[test]
    fn test_validate_ipv4_and_cidr() {
        assert!(validate_ipv4("10.0.0.1").is_ok());
        assert!(validate_ipv4("256.0.0.1").is_err());
        assert!(validate_ipv4("10.0.1").is_err());
        assert!(validate_cidr("10.0.0.0/24").is_ok());
        assert!(validate_cidr("10.0.0.0/33").is_err());
        assert!(validate_cidr("10.0.0.0").is_err());
    }
}
