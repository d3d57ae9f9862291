//! Blob id parsing. Accepts both the canonical `blob_<digits>` form and a
//! bare decimal, so callers that already stripped the prefix (or never had
//! one) don't need a second code path.

use regex::Regex;
use std::str::FromStr;

pub fn parse_blob_id(s: &str) -> Result<u64, String> {
    let raw = s.trim();
    let re = Regex::new(r"^(?:blob_)?(\d+)$").unwrap();
    let caps = re
        .captures(raw)
        .ok_or_else(|| format!("invalid blob id: '{raw}'"))?;
    let digits = caps.get(1).unwrap().as_str();
    u64::from_str(digits).map_err(|_| format!("invalid blob id: '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_formats() {
        assert_eq!(parse_blob_id("blob_123").unwrap(), 123u64);
        assert_eq!(parse_blob_id("123").unwrap(), 123u64);
    }

    #[test]
    fn handles_whitespace() {
        assert_eq!(parse_blob_id("  blob_123  ").unwrap(), 123u64);
    }

    #[test]
    fn rejects_invalid_formats() {
        assert!(parse_blob_id("blob_").is_err());
        assert!(parse_blob_id("blob_abc").is_err());
        assert!(parse_blob_id("blob_blob_123").is_err());
        assert!(parse_blob_id("").is_err());
    }

    #[test]
    fn handles_edge_cases() {
        assert_eq!(parse_blob_id("blob_0").unwrap(), 0u64);
        assert_eq!(
            parse_blob_id("18446744073709551615").unwrap(),
            u64::MAX
        );
    }
}
