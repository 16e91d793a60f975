//! [`PowerSampleWindow`] – EIR rolling input-power average.
//!
//! A fixed-length circular buffer of input-power samples (milliwatts) kept
//! per power-consuming component.  The average is only reported once the
//! window holds a full run of consecutive valid samples; a missed sample
//! invalidates the window and it has to refill.
//!
//! ```
//! use chassis_store::PowerSampleWindow;
//!
//! let mut w = PowerSampleWindow::new(3);
//! assert_eq!(w.push(100), None);
//! assert_eq!(w.push(200), None);
//! assert_eq!(w.push(300), Some(200));
//! assert_eq!(w.push(400), Some(300)); // oldest sample (100) rolled out
//! ```

#[derive(Debug, Clone)]
pub struct PowerSampleWindow {
    samples: Vec<u64>,
    next: usize,
    filled: usize,
    valid: bool,
}

impl PowerSampleWindow {
    /// Create a window holding `len` samples (at least one).
    pub fn new(len: usize) -> Self {
        let len = len.max(1);
        Self {
            samples: vec![0; len],
            next: 0,
            filled: 0,
            valid: false,
        }
    }

    /// Record a sample and return the rolling average if the window is full.
    pub fn push(&mut self, sample_mw: u64) -> Option<u64> {
        self.samples[self.next] = sample_mw;
        self.next = (self.next + 1) % self.samples.len();
        self.filled = (self.filled + 1).min(self.samples.len());
        self.valid = true;
        self.average()
    }

    /// Rolling average over the full window, `None` until it has filled.
    pub fn average(&self) -> Option<u64> {
        if !self.is_full() {
            return None;
        }
        let sum: u128 = self.samples.iter().map(|&s| u128::from(s)).sum();
        Some((sum / self.samples.len() as u128) as u64)
    }

    /// Drop every sample; the window must refill before averaging again.
    pub fn invalidate(&mut self) {
        self.next = 0;
        self.filled = 0;
        self.valid = false;
    }

    pub fn is_full(&self) -> bool {
        self.valid && self.filled == self.samples.len()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_requires_full_window() {
        let mut w = PowerSampleWindow::new(4);
        for s in [10, 20, 30] {
            assert_eq!(w.push(s), None);
        }
        assert_eq!(w.push(40), Some(25));
    }

    #[test]
    fn invalidate_forces_refill() {
        let mut w = PowerSampleWindow::new(2);
        w.push(100);
        assert_eq!(w.push(100), Some(100));
        w.invalidate();
        assert!(!w.is_valid());
        assert!(w.is_empty());
        assert_eq!(w.push(50), None);
        assert_eq!(w.push(150), Some(100));
    }

    #[test]
    fn zero_length_is_clamped() {
        let mut w = PowerSampleWindow::new(0);
        assert_eq!(w.len(), 1);
        assert_eq!(w.push(7), Some(7));
    }
}
