use ndarray::Array2;

/// Manual Adam update over a latent batch, written out as a small state
/// machine (first moment, second moment, step count) so the numerical core
/// can be checked in closed form.
///
/// Moments share the latent batch shape and start from zero; a fresh state
/// is created for every tile and discarded when its optimization ends.
pub(crate) struct AdamState {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    m: Array2<f32>,
    v: Array2<f32>,
    t: i32,
}

impl AdamState {
    pub(crate) fn new(
        lr: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
        batch: usize,
        dim: usize,
    ) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            m: Array2::zeros((batch, dim)),
            v: Array2::zeros((batch, dim)),
            t: 0,
        }
    }

    /// Advances the moments, bias-corrects them by the step count, moves the
    /// latent against the corrected gradient and clips it to [-1, 1].
    pub(crate) fn step(&mut self, latent: &mut Array2<f32>, gradient: &Array2<f32>) {
        debug_assert_eq!(latent.dim(), gradient.dim());
        debug_assert_eq!(self.m.dim(), gradient.dim());

        self.t += 1;
        let m_corr = 1.0 - self.beta1.powi(self.t);
        let v_corr = 1.0 - self.beta2.powi(self.t);

        let (lr, beta1, beta2, epsilon) = (self.lr, self.beta1, self.beta2, self.epsilon);

        ndarray::Zip::from(latent)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(gradient)
            .for_each(|z, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / m_corr;
                let v_hat = *v / v_corr;
                *z -= lr * m_hat / (v_hat.sqrt() + epsilon);
                *z = z.max(-1.0).min(1.0);
            });
    }
}
