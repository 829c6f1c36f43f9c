use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use covlens_core::config::{CONFIG_DIR, CovlensConfig};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[allow(clippy::unused_async)]
pub async fn run(args: InitArgs) -> anyhow::Result<()> {
    let project = super::resolve_project(&args.path)?;
    let config_path = CovlensConfig::path_for(&project);

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "covlens is already initialized in {}. Use --force to overwrite.",
            project.display()
        );
    }

    let text = CovlensConfig::default()
        .to_toml()
        .context("Cannot serialize default config")?;
    std::fs::create_dir_all(project.join(CONFIG_DIR))
        .with_context(|| format!("Cannot create {CONFIG_DIR} in {}", project.display()))?;
    std::fs::write(&config_path, text)
        .with_context(|| format!("Cannot write config: {}", config_path.display()))?;

    println!("Initialized covlens in {}", project.display());
    println!("  Config: {}", config_path.display());
    Ok(())
}
