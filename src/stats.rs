//! Welford online mean/variance, used for the across-bins summary.

#[derive(Default, Clone)]
pub struct OnlineStats {
    n:    u64,
    mean: f64,
    m2:   f64,
}

impl OnlineStats {
    pub fn push(&mut self, x: f64) {
        self.n += 1;
        let delta  = x - self.mean;
        self.mean += delta / self.n as f64;
        let delta2 = x - self.mean;
        self.m2   += delta * delta2;
    }
    pub fn count(&self) -> u64 { self.n }
    pub fn mean(&self) -> f64 { self.mean }
    pub fn var(&self)  -> f64 { if self.n > 1 { self.m2 / (self.n - 1) as f64 } else { 0.0 } }
    pub fn std(&self)  -> f64 { self.var().sqrt() }
    /// Standard error of the mean.
    pub fn sem(&self)  -> f64 {
        if self.n > 1 { self.std() / (self.n as f64).sqrt() } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_two_pass_formulas() {
        let data = [1.0, 2.0, 4.0, 8.0, 16.0];
        let mut s = OnlineStats::default();
        for &x in &data {
            s.push(x);
        }
        let mean = data.iter().sum::<f64>() / data.len() as f64;
        let var = data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
        assert!((s.mean() - mean).abs() < 1e-12);
        assert!((s.var() - var).abs() < 1e-12);
        assert_eq!(s.count(), 5);
    }

    #[test]
    fn single_sample_has_zero_spread() {
        let mut s = OnlineStats::default();
        s.push(3.5);
        assert_eq!(s.var(), 0.0);
        assert_eq!(s.sem(), 0.0);
    }
}
