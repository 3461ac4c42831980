//! Error types for the engine binary.

/// Errors raised during engine startup and the simulated transport.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An environment variable held an unparsable value.
    #[error("invalid environment variable {name}: {value}")]
    Config {
        /// Variable name.
        name: String,
        /// Rejected value.
        value: String,
    },

    /// Reading the simulated-world configuration file failed.
    #[error("failed to read sim config: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The simulated-world configuration was not valid YAML.
    #[error("failed to parse sim config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// The simulated world itself is unusable.
    #[error("invalid sim world: {reason}")]
    SimWorld {
        /// What is wrong with the world definition.
        reason: String,
    },
}
