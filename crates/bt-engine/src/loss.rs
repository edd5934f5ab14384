//! Binary logistic loss with positive-class weighting.
//!
//! For margin `m`, `p = sigmoid(m)` and weight `w` (`scale_pos_weight` for
//! positive rows, 1 otherwise):
//!
//! ```text
//! grad = w * (p - y)
//! hess = w * p * (1 - p)
//! ```

const HESS_MIN: f64 = 1e-16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticLoss {
    scale_pos_weight: f64,
}

impl LogisticLoss {
    pub fn new(scale_pos_weight: f64) -> Self {
        Self { scale_pos_weight }
    }

    #[inline]
    pub fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    /// Initial margin for every row. Zero margin is probability 0.5.
    pub fn base_margin(&self) -> f64 {
        0.0
    }

    #[inline]
    fn weight(&self, label: u8) -> f64 {
        if label == 1 {
            self.scale_pos_weight
        } else {
            1.0
        }
    }

    /// Fill `grad` and `hess` for every row.
    pub fn gradients(&self, margins: &[f64], labels: &[u8], grad: &mut [f64], hess: &mut [f64]) {
        debug_assert_eq!(margins.len(), labels.len());
        for (i, (&m, &y)) in margins.iter().zip(labels).enumerate() {
            let p = Self::sigmoid(m);
            let w = self.weight(y);
            grad[i] = w * (p - f64::from(y));
            hess[i] = (w * p * (1.0 - p)).max(HESS_MIN);
        }
    }

    /// Weighted mean negative log-likelihood.
    pub fn loss(&self, margins: &[f64], labels: &[u8]) -> f64 {
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (&m, &y) in margins.iter().zip(labels) {
            let w = self.weight(y);
            // log(1 + e^m) - y*m, evaluated stably.
            let softplus = if m > 0.0 {
                m + (-m).exp().ln_1p()
            } else {
                m.exp().ln_1p()
            };
            total += w * (softplus - f64::from(y) * m);
            weight_sum += w;
        }
        if weight_sum > 0.0 {
            total / weight_sum
        } else {
            0.0
        }
    }
}
