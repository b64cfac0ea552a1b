use super::ServerConfig;
use super::merge::merge_config;

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables with sensible defaults.
    /// The `.env` file, when present, is loaded in `main` before this runs.
    ///
    /// # Errors
    /// Returns an error if a numeric variable is malformed or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge_config(None)?;
        config.validate()?;
        Ok(config)
    }
}
