//! Deterministic probabilistic engagement for unaddressed messages.

use sha2::{Digest, Sha256};

/// Decide whether to engage with an unaddressed message.
///
/// Deterministic pure function of `(user_id, text)`: the same pair always
/// yields the same answer, in this process and any other. That makes tests
/// reproducible and keeps duplicate deliveries of the same message from
/// flapping between engage and ignore. Roughly one in `denominator` pairs
/// returns true; a denominator of 0 is treated as 1 (always engage).
#[must_use]
pub fn should_engage_randomly(user_id: &str, text: &str, denominator: u64) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    // Separator keeps ("ab", "c") and ("a", "bc") distinct.
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % denominator.max(1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_calls_agree() {
        let first = should_engage_randomly("user-42", "gm everyone", 8);
        for _ in 0..1000 {
            assert_eq!(should_engage_randomly("user-42", "gm everyone", 8), first);
        }
    }

    #[test]
    fn denominator_one_always_engages() {
        for i in 0..50 {
            assert!(should_engage_randomly(&format!("u{i}"), "hello", 1));
        }
    }

    #[test]
    fn denominator_zero_is_treated_as_one() {
        assert!(should_engage_randomly("u", "t", 0));
    }

    #[test]
    fn engagement_rate_converges_to_one_in_n() {
        let denominator = 8u64;
        let samples = 8_000;
        let engaged = (0..samples)
            .filter(|i| {
                should_engage_randomly(&format!("user-{i}"), &format!("message number {i}"), denominator)
            })
            .count();
        let rate = engaged as f64 / f64::from(samples);
        let expected = 1.0 / denominator as f64;
        assert!(
            (rate - expected).abs() < 0.03,
            "rate {rate} too far from {expected}"
        );
    }
}
