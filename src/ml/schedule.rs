//! Learning rate schedule for fine-tuning.

/// Linear warmup followed by linear decay toward zero, floored at
/// `lr * 1e-3`.
///
/// With progress `p = step / total_steps`:
/// `lr_p = lr * p / warmup` while `p <= warmup`, else `lr * (1 - p)`,
/// and never less than `lr * 1e-3`.
#[derive(Debug, Clone, Copy)]
pub struct WarmupLinearSchedule {
    lr:          f64,
    warmup:      f64,
    total_steps: usize,
}

impl WarmupLinearSchedule {
    /// `warmup` is the fraction of `total_steps` spent warming up.
    pub fn new(lr: f64, warmup: f64, total_steps: usize) -> Self {
        Self { lr, warmup: warmup.clamp(0.0, 1.0), total_steps: total_steps.max(1) }
    }

    /// Learning rate for the 0-based optimizer `step`.
    pub fn lr_at(&self, step: usize) -> f64 {
        let progress = (step as f64 / self.total_steps as f64).min(1.0);
        let factor = if self.warmup > 0.0 && progress <= self.warmup {
            progress / self.warmup
        } else {
            1.0 - progress
        };
        // Floored so warmup step 0 still moves the weights.
        (self.lr * factor).max(self.lr * 1e-3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_then_decay() {
        let s = WarmupLinearSchedule::new(1.0, 0.1, 100);
        assert!((s.lr_at(5) - 0.5).abs() < 1e-9);
        assert!((s.lr_at(10) - 1.0).abs() < 1e-9);
        assert!((s.lr_at(50) - 0.5).abs() < 1e-9);
        assert!(s.lr_at(60) < s.lr_at(50));
    }

    #[test]
    fn test_floor_keeps_updates_positive() {
        let s = WarmupLinearSchedule::new(1.0, 0.1, 100);
        assert!((s.lr_at(0) - 1e-3).abs() < 1e-12);
        assert!((s.lr_at(100) - 1e-3).abs() < 1e-12);
        assert!((s.lr_at(1000) - 1e-3).abs() < 1e-12);
        // Above the floor the decay is linear.
        assert!((s.lr_at(99) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_no_warmup() {
        let s = WarmupLinearSchedule::new(2.0, 0.0, 4);
        assert!((s.lr_at(0) - 2.0).abs() < 1e-9);
        assert!((s.lr_at(2) - 1.0).abs() < 1e-9);
    }
}
