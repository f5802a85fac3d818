use crate::error::ProvisionError;

/// Parse a human-readable capacity string into bytes.
///
/// Accepts formats like `"100G"`, `"512M"`, `"20K"`, `"1073741824"`.
/// Uses binary units (1G = 1024³ = 1,073,741,824 bytes).
pub fn parse_size(s: &str) -> Result<u64, ProvisionError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ProvisionError::InvalidCapacity {
            given: s.into(),
            reason: "capacity cannot be empty".into(),
        });
    }

    // Split into numeric part and suffix
    let (num_str, suffix) = match s.find(|c: char| c.is_ascii_alphabetic()) {
        Some(i) => (&s[..i], s[i..].to_ascii_uppercase()),
        None => (s, String::new()),
    };

    let num: u64 = num_str.parse().map_err(|_| ProvisionError::InvalidCapacity {
        given: s.into(),
        reason: format!("invalid number: '{num_str}'"),
    })?;

    let multiplier: u64 = match suffix.as_str() {
        "" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024 * 1024 * 1024 * 1024,
        _ => {
            return Err(ProvisionError::InvalidCapacity {
                given: s.into(),
                reason: format!("unknown suffix: '{suffix}' (use G, M, K, or T)"),
            });
        }
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| ProvisionError::InvalidCapacity {
            given: s.into(),
            reason: "capacity overflows".into(),
        })
}

/// Format a byte count for display, e.g. `107374182400` → `"100.0 GB"`.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
