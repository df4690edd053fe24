use crate::Tensor;

/// Adam with L2 weight decay folded into the gradient.
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    weight_decay: f32,
    t: u32,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    pub fn new(params: &[&Tensor], lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.0,
            t: 0,
            m: params.iter().map(|p| vec![0.0; p.data.len()]).collect(),
            v: params.iter().map(|p| vec![0.0; p.data.len()]).collect(),
        }
    }

    #[must_use]
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Number of steps taken so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.t as usize
    }

    /// Updates every parameter that carries a gradient; the others are left untouched.
    pub fn step(&mut self, params: &mut [&mut Tensor]) {
        assert_eq!(params.len(), self.m.len(), "optimizer built for a different parameter set");
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2 = 1.0 - self.beta2.powi(self.t as i32);

        for (i, p) in params.iter_mut().enumerate() {
            let Some(grad) = p.grad.take() else {
                continue;
            };
            for j in 0..p.data.len() {
                let g = grad[j] + self.weight_decay * p.data[j];
                self.m[i][j] = self.beta1 * self.m[i][j] + (1.0 - self.beta1) * g;
                self.v[i][j] = self.beta2 * self.v[i][j] + (1.0 - self.beta2) * g * g;
                let m_hat = self.m[i][j] / bias1;
                let v_hat = self.v[i][j] / bias2;
                p.data[j] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut param = Tensor::from_vec(vec![1], vec![1.0]);
        param.grad = Some(vec![0.1]);
        let mut opt = Adam::new(&[&param], 0.1);
        opt.step(&mut [&mut param]);
        // m_hat = g, v_hat = g² after one bias-corrected step
        let expected = 1.0 - 0.1 * 0.1 / (0.01f32.sqrt() + 1e-8);
        assert!((param.data[0] - expected).abs() < 1e-6);
        assert_eq!(opt.steps(), 1);
        assert!(param.grad.is_none(), "gradient is consumed by the step");
    }

    #[test]
    fn parameters_without_gradient_are_skipped() {
        let mut a = Tensor::from_vec(vec![2], vec![1.0, 2.0]);
        let mut b = Tensor::from_vec(vec![1], vec![3.0]);
        a.grad = Some(vec![1.0, -1.0]);
        let mut opt = Adam::new(&[&a, &b], 0.01).with_weight_decay(0.5);
        opt.step(&mut [&mut a, &mut b]);
        assert_eq!(b.data, vec![3.0]);
        assert!(a.data[0] < 1.0);
        assert!(a.data[1] > 1.9 && a.data[1] < 2.0 + 0.011);
    }
}
