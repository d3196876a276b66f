use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces the values a periodic emitter pushes onto a measurement stream.
pub trait MeasurementSource: Send + 'static {
    fn next_value(&mut self) -> f64;
}

impl<F> MeasurementSource for F
where
    F: FnMut() -> f64 + Send + 'static,
{
    fn next_value(&mut self) -> f64 {
        self()
    }
}

/// Uniform values in `[0, 1)`.
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementSource for RandomSource {
    fn next_value(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}
