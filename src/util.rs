//! Shared utility functions
//!
//! Naming and firmware-revision helpers.

use std::cmp::Ordering;

/// Convert snake_case (or kebab-case, or spaced words) to PascalCase
///
/// # Examples
/// ```
/// use rtxspec::util::to_pascal_case;
/// assert_eq!(to_pascal_case("gateway_id"), "GatewayId");
/// assert_eq!(to_pascal_case("pre-shared-key"), "PreSharedKey");
/// ```
pub fn to_pascal_case(s: &str) -> String {
    s.split(['_', '-', ' '])
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Convert PascalCase, camelCase or kebab-case to snake_case
///
/// # Examples
/// ```
/// use rtxspec::util::to_snake_case;
/// assert_eq!(to_snake_case("KeepaliveInterval"), "keepalive_interval");
/// assert_eq!(to_snake_case("local-id"), "local_id");
/// ```
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !result.ends_with('_') {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else if c == '-' || c == ' ' {
            result.push('_');
        } else {
            result.push(c);
        }
    }
    result
}

/// Compare dotted firmware revisions segment by segment
///
/// Numeric segments compare numerically; anything else falls back to text
/// order. Missing trailing segments count as zero.
///
/// # Examples
/// ```
/// use rtxspec::util::compare_firmware;
/// use std::cmp::Ordering;
/// assert_eq!(compare_firmware("14.01.38", "14.1.20"), Ordering::Greater);
/// assert_eq!(compare_firmware("15.02", "15.02.00"), Ordering::Equal);
/// ```
pub fn compare_firmware(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = a.trim().split('.').collect();
    let right: Vec<&str> = b.trim().split('.').collect();

    for i in 0..left.len().max(right.len()) {
        let l = left.get(i).copied().unwrap_or("0");
        let r = right.get(i).copied().unwrap_or("0");
        let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
