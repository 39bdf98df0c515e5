//! Recent reference brightness samples

use std::collections::VecDeque;

pub const HISTORY_LEN: usize = 10;

/// Ring of the last accepted reference percentages
#[derive(Debug, Clone, Default)]
pub struct ReferenceHistory {
    samples: VecDeque<u8>,
}

impl ReferenceHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Record a sample; values outside `[0, 100]` are noise and dropped
    pub fn push(&mut self, percent: f64) -> bool {
        if !(0.0..=100.0).contains(&percent) {
            return false;
        }
        if self.samples.len() == HISTORY_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(percent.round() as u8);
        true
    }

    pub fn last(&self) -> Option<u8> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True if the newest sample differs from the one before it
    pub fn changed(&self) -> bool {
        let mut newest = self.samples.iter().rev();
        match (newest.next(), newest.next()) {
            (Some(a), Some(b)) => a != b,
            (Some(_), None) => true,
            _ => false,
        }
    }

    pub fn samples(&self) -> Vec<u8> {
        self.samples.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded() {
        let mut history = ReferenceHistory::new();
        for i in 0..15 {
            assert!(history.push(f64::from(i)));
        }
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history.samples().first(), Some(&5));
        assert_eq!(history.last(), Some(14));
    }

    #[test]
    fn test_rejects_noise() {
        let mut history = ReferenceHistory::new();
        assert!(!history.push(140.0));
        assert!(!history.push(-1.0));
        assert!(!history.push(f64::NAN));
        assert!(history.is_empty());
    }

    #[test]
    fn test_changed() {
        let mut history = ReferenceHistory::new();
        assert!(!history.changed());
        history.push(40.2);
        assert!(history.changed());
        history.push(39.8);
        assert!(!history.changed());
        history.push(55.0);
        assert!(history.changed());
    }
}
