//! Small shared helpers.

/// Constant-time byte equality.
///
/// Mismatched lengths return early; the length of a secret is not treated
/// as confidential, only its content.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}
