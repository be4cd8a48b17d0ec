//! Sampling escalation across retry attempts.

/// Temperature for a 0-indexed attempt: `min(base + step * attempt, cap)`.
///
/// Non-decreasing in `attempt` for a non-negative `step`.
pub fn escalate(base: f64, step: f64, attempt: u32, cap: f64) -> f64 {
    (base + step * f64::from(attempt)).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rises_by_step_then_caps() {
        let temps: Vec<f64> = (0..6).map(|a| escalate(0.2, 0.15, a, 0.9)).collect();
        assert!((temps[0] - 0.2).abs() < 1e-9);
        assert!((temps[1] - 0.35).abs() < 1e-9);
        assert!((temps[2] - 0.5).abs() < 1e-9);
        assert!((temps[5] - 0.9).abs() < 1e-9);
        assert!(temps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn zero_step_is_constant() {
        assert_eq!(escalate(0.4, 0.0, 0, 0.9), escalate(0.4, 0.0, 7, 0.9));
    }
}
