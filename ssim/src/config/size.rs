//! Human-readable byte sizes ("20MB", "512k", "1048576").

use thiserror::Error;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// A size string that is not a number with an optional K/M/G unit.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{0}' - expected format like '20MB', '512KB' or a byte count")]
pub struct SizeParseError(String);

/// Parse a size into bytes.
///
/// Units are binary (`1KB` = 1024 bytes), case-insensitive, and the trailing
/// `B` is optional. A bare number is a byte count.
///
/// ```
/// use ssim::config::parse_size;
///
/// assert_eq!(parse_size("20MB").unwrap(), 20 * 1024 * 1024);
/// assert_eq!(parse_size("512 k").unwrap(), 512 * 1024);
/// assert_eq!(parse_size("100").unwrap(), 100);
/// ```
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let trimmed = input.trim();
    let err = || SizeParseError(input.to_string());

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(err());
    }

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => KB,
        "M" | "MB" => MB,
        "G" | "GB" => GB,
        _ => return Err(err()),
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(err)
}

/// Format bytes using the largest unit that divides them exactly.
///
/// ```
/// use ssim::config::format_size;
///
/// assert_eq!(format_size(20 * 1024 * 1024), "20MB");
/// assert_eq!(format_size(1500), "1500");
/// ```
pub fn format_size(bytes: u64) -> String {
    [(GB, "GB"), (MB, "MB"), (KB, "KB")]
        .into_iter()
        .find(|(unit, _)| bytes >= *unit && bytes % unit == 0)
        .map(|(unit, suffix)| format!("{}{}", bytes / unit, suffix))
        .unwrap_or_else(|| bytes.to_string())
}
