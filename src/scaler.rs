//! Per-beam fast-scaler sliding window.

use crate::constants::NUM_BEAMS;

/// Circular buffer of the N most recent fast-scaler readings per beam,
/// with an O(1) running sum. `get(b)` is the mean of whatever has been
/// added so far, up to `n_fast_scaler_avg` samples.
pub struct FastScalerWindow {
    window_len: usize,
    buf: Vec<[f64; NUM_BEAMS]>,
    sum: [f64; NUM_BEAMS],
    next_index: usize,
    filled: usize,
}

impl FastScalerWindow {
    /// `window_len` is the configured `n_fast_scaler_avg`; must be >= 1.
    pub fn new(window_len: usize) -> Self {
        let window_len = window_len.max(1);
        Self {
            window_len,
            buf: vec![[0.0; NUM_BEAMS]; window_len],
            sum: [0.0; NUM_BEAMS],
            next_index: 0,
            filled: 0,
        }
    }

    /// Feed one fast-scaler reading per beam.
    pub fn add(&mut self, fast_scalers: &[f64; NUM_BEAMS]) {
        let slot = &mut self.buf[self.next_index];
        for beam in 0..NUM_BEAMS {
            self.sum[beam] -= slot[beam];
            slot[beam] = fast_scalers[beam];
            self.sum[beam] += fast_scalers[beam];
        }
        self.next_index = (self.next_index + 1) % self.window_len;
        self.filled = (self.filled + 1).min(self.window_len);
    }

    /// Mean of the samples added for this beam so far (up to `window_len`).
    pub fn get(&self, beam: usize) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        self.sum[beam] / self.filled as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_before_window_fills() {
        let mut w = FastScalerWindow::new(5);
        let mut sample = [0.0; NUM_BEAMS];
        sample[0] = 2.0;
        w.add(&sample);
        sample[0] = 4.0;
        w.add(&sample);
        assert_eq!(w.get(0), 3.0);
    }

    #[test]
    fn test_mean_after_window_fills_drops_oldest() {
        let mut w = FastScalerWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            let mut sample = [0.0; NUM_BEAMS];
            sample[0] = v;
            w.add(&sample);
        }
        // window now holds [2,3,4]; oldest (1) has been evicted
        assert_eq!(w.get(0), 3.0);
    }

    #[test]
    fn test_sum_matches_buffer_contents_invariant() {
        let mut w = FastScalerWindow::new(4);
        for v in [5.0, 1.0, 9.0, 2.0, 7.0] {
            let mut sample = [0.0; NUM_BEAMS];
            sample[1] = v;
            w.add(&sample);
        }
        let expected: f64 = w.buf.iter().map(|s| s[1]).sum();
        assert_eq!(w.sum[1], expected);
    }

    #[test]
    fn test_window_len_floored_at_one() {
        let w = FastScalerWindow::new(0);
        assert_eq!(w.window_len, 1);
    }
}
