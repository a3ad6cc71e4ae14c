/// Defaults of the CLI-only settings. Benchmark parameters default in the core builder.
pub struct DefaultsConfig {
    pub seeds: usize,
    pub jitter: f64,
    pub potential_seed: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            seeds: 5,
            jitter: 0.02,
            potential_seed: 0,
        }
    }
}
