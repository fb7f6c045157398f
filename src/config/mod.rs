// Configuration management module
// TOML settings plus the interactive editor behind `pdf-rag config`

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, IngestConfig, OllamaConfig, PromptConfig, RetrievalConfig, StoreConfig,
};

/// Resolve the configuration directory, preferring an explicit override
#[inline]
pub fn resolve_config_dir(
    override_dir: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir),
        None => Config::default_dir(),
    }
}
