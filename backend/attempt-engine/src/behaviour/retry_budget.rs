use crate::models::Attempt;

/// Tries granted and tries remaining, derived from the step history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    total: u32,
    remaining: u32,
}

impl RetryBudget {
    pub fn new(total: u32, remaining: u32) -> Self {
        Self {
            total,
            remaining: remaining.min(total),
        }
    }

    pub fn from_attempt(attempt: &Attempt) -> Self {
        let total = attempt
            .first_step()
            .behaviour_vars
            .tries_left
            .unwrap_or(1);
        let remaining = attempt.last_tries_left().unwrap_or(total);
        Self::new(total, remaining)
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn used(&self) -> u32 {
        self.total - self.remaining
    }

    pub fn is_last_try(&self) -> bool {
        self.remaining <= 1
    }

    /// Budget after an unfavourable grade consumed one try.
    pub fn consume(self) -> Self {
        Self::new(self.total, self.remaining.saturating_sub(1))
    }

    pub fn adjust_fraction(&self, raw: f64, penalty: f64) -> f64 {
        adjusted_fraction(raw, self.total, self.remaining, penalty)
    }

    /// Same as [`adjust_fraction`](Self::adjust_fraction) with an explicit tries-left count.
    pub fn adjust_fraction_with(&self, raw: f64, penalty: f64, tries_left: u32) -> f64 {
        adjusted_fraction(raw, self.total, tries_left, penalty)
    }
}

/// `max(0, raw - (total - tries_left) * penalty)`
pub fn adjusted_fraction(raw: f64, total: u32, tries_left: u32, penalty: f64) -> f64 {
    let used = total.saturating_sub(tries_left);
    (raw - f64::from(used) * penalty).max(0.0)
}
