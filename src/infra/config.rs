use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::scanner::{DEFAULT_EXCLUDED_DIRS, ScanOptions};

/// Config files looked up in the working directory, first match wins.
const CONFIG_FILES: [&str; 4] = ["sqctx.toml", "sqctx.yaml", "sqctx.json", ".sqctx.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Default repository checkout (overridden by `--repo`)
    pub repo_root: Option<PathBuf>,

    /// Block stage settings
    pub blocks: BlocksConfig,

    /// Anchor/call-site stage settings
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocksConfig
{
    pub output_file: String,
}

impl Default for BlocksConfig
{
    fn default() -> Self
    {
        Self { output_file: "issues_with_blocks.json".to_string() }
    }
}

/// Which repository search implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend
{
    /// External `rg` process
    #[default]
    Ripgrep,
    /// In-process walker + grep-searcher
    Builtin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig
{
    pub search_window: usize,
    pub context_window: usize,
    pub max_issues: Option<usize>,
    pub max_call_sites: Option<usize>,
    pub ignore_headers: bool,
    pub excluded_dirs: Vec<String>,
    /// Per-search budget in seconds; 0 disables the timeout
    pub search_timeout_secs: u64,
    pub backend: SearchBackend,
    pub rg_path: String,
    /// Worker threads; 0 lets rayon decide
    pub threads: usize,
    /// Extra ignore globs for the builtin backend
    pub ignore_patterns: Vec<String>,
    pub output_file: String,
}

impl Default for ScanConfig
{
    fn default() -> Self
    {
        let defaults = ScanOptions::default();
        Self {
            search_window: defaults.search_window,
            context_window: defaults.context_window,
            max_issues: None,
            max_call_sites: defaults.max_call_sites,
            ignore_headers: defaults.ignore_headers,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            search_timeout_secs: 60,
            backend: SearchBackend::Ripgrep,
            rg_path: "rg".to_string(),
            threads: 0,
            ignore_patterns: Vec::new(),
            output_file: "issues_with_anchors.json".to_string(),
        }
    }
}

impl ScanConfig
{
    /// Scanner options; both windows are at least one line.
    pub fn scan_options(&self) -> ScanOptions
    {
        ScanOptions {
            search_window: self
                .search_window
                .max(1),
            context_window: self
                .context_window
                .max(1),
            max_call_sites: self
                .max_call_sites
                .filter(|&n| n > 0),
            ignore_headers: self.ignore_headers,
            excluded_dirs: self
                .excluded_dirs
                .clone(),
        }
    }

    pub fn search_timeout(&self) -> Option<std::time::Duration>
    {
        (self.search_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.search_timeout_secs))
    }

    /// `rg_path` with `~` and `$VARS` expanded.
    pub fn rg_binary(&self) -> PathBuf
    {
        PathBuf::from(
            shellexpand::full(&self.rg_path)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| {
                    self.rg_path
                        .clone()
                }),
        )
    }
}

/// Load layered configuration: defaults < config file < `SQCTX_*` env vars.
///
/// `explicit` replaces the working-directory lookup. Nested keys use `__`
/// in the environment, e.g. `SQCTX_SCAN__SEARCH_WINDOW=300`.
pub fn load_config(explicit: Option<&Path>) -> Result<Config>
{
    let mut builder = config::Config::builder();

    if let Some(path) = explicit
    {
        if !path.is_file()
        {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        builder = builder.add_source(config::File::from(path));
    }
    else
    {
        for path in &CONFIG_FILES
        {
            if Path::new(path).exists()
            {
                builder = builder.add_source(config::File::with_name(path));
                break;
            }
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SQCTX")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("scan.excluded_dirs")
            .with_list_parse_key("scan.ignore_patterns"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

/// Write the default configuration as `sqctx.toml` into `args.path`.
pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("sqctx.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string = toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        if !ctx.quiet
        {
            println!("Would write config file to {}", config_path.display());
        }
        return Ok(());
    }

    std::fs::create_dir_all(&args.path)
        .with_context(|| format!("Failed to create {}", args.path.display()))?;
    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
