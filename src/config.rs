use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// The configuration for the random initialization of a parameter tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitConfig {
    /// Every value is drawn uniformly from `[-limit, limit]`.
    pub limit: f64,
    /// A seed for reproducible initialization, the os entropy is used when missing.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl InitConfig {
    /// Creates a new `InitConfig`.
    ///
    /// # Arguments
    /// * `limit` - The absolute bound of the generated values.
    /// * `seed` - An optional seed for the rng.
    ///
    /// # Returns
    /// A new `InitConfig` instance.
    pub fn new(limit: f64, seed: Option<u64>) -> Self {
        Self { limit, seed }
    }

    /// Generates a random number generator given (or not) a seed.
    ///
    /// # Returns
    /// A seeded `StdRng`, or one seeded from the os when there's no seed.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn seed_is_optional() {
        let config: InitConfig = serde_json::from_str(r#"{ "limit": 0.5 }"#).unwrap();
        assert_eq!(config, InitConfig::new(0.5, None));
    }

    #[test]
    fn seeded_rngs_are_reproducible() {
        let config = InitConfig::new(1., Some(42));

        let (mut rng_a, mut rng_b) = (config.rng(), config.rng());

        let a: Vec<u32> = (0..8).map(|_| rng_a.random()).collect();
        let b: Vec<u32> = (0..8).map(|_| rng_b.random()).collect();
        assert_eq!(a, b);
    }
}
