//! Compiler configuration shared across the pipeline.

#[derive(Debug, Clone)]
pub struct Config {
    /// Emit bounds checks for array subscripts
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config { debug: false }
    }
}

impl Config {
    pub fn debug() -> Self {
        Config { debug: true }
    }
}
