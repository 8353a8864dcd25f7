use std::path::PathBuf;
use tabcast_core::Paths;

/// Print the effective configuration as pretty JSON.
pub fn show(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Print the default config file path.
pub fn path() {
    println!("{}", Paths::new().config_file().display());
}
