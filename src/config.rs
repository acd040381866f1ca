use serde::{Deserialize, Serialize};
use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

pub const DEFAULT_ROWS: u32 = 32;
pub const DEFAULT_COLS: u32 = 64;
pub const DEFAULT_BRIGHTNESS: u8 = 70;
pub const DEFAULT_CONTROL_PORT: u16 = 8081;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level process configuration. Runtime state (current plugin, cycling,
/// per-plugin settings) lives in the state file, see `store.rs`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General options
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub state_file: Option<PathBuf>,   // persisted JSON document
    pub resource_dir: Option<PathBuf>, // gifs, fonts
    /// panel geometry & wiring
    pub matrix: Option<MatrixConfig>,
    /// control socket
    pub control: Option<ControlConfig>,
    /// frame loop & transitions
    pub scheduler: Option<SchedulerConfig>,

    /// one-shot startup selection, command line only
    #[serde(skip)]
    pub display_mode: Option<String>,
    #[serde(skip)]
    pub gif_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Headless panel, frames kept in memory
    #[default]
    Virtual,
    /// HUB75 panel through rpi-rgb-led-matrix (feature `hardware`)
    Hardware,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatrixConfig {
    pub rows: Option<u32>,
    pub cols: Option<u32>,
    pub chain_length: Option<u32>,
    pub parallel: Option<u32>,
    pub brightness: Option<u8>,          // 1-100
    pub hardware_mapping: Option<String>,
    pub gpio_slowdown: Option<u32>,
    pub backend: Option<BackendKind>,
}

impl MatrixConfig {
    pub fn rows(&self) -> u32 { self.rows.unwrap_or(DEFAULT_ROWS) }
    pub fn cols(&self) -> u32 { self.cols.unwrap_or(DEFAULT_COLS) }
    pub fn chain_length(&self) -> u32 { self.chain_length.unwrap_or(1) }
    pub fn parallel(&self) -> u32 { self.parallel.unwrap_or(1) }
    pub fn brightness(&self) -> u8 { self.brightness.unwrap_or(DEFAULT_BRIGHTNESS) }
    pub fn gpio_slowdown(&self) -> u32 { self.gpio_slowdown.unwrap_or(2) }
    pub fn backend(&self) -> BackendKind { self.backend.unwrap_or_default() }

    pub fn hardware_mapping(&self) -> &str {
        self.hardware_mapping.as_deref().unwrap_or("adafruit-hat")
    }

    /// Total canvas width across chained panels
    pub fn width(&self) -> u32 { self.cols() * self.chain_length() }

    /// Total canvas height across parallel chains
    pub fn height(&self) -> u32 { self.rows() * self.parallel() }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ControlConfig {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub io_timeout_ms: Option<u64>,
    pub max_connections: Option<usize>,
}

impl ControlConfig {
    pub fn enabled(&self) -> bool { self.enabled.unwrap_or(true) }
    pub fn host(&self) -> &str { self.host.as_deref().unwrap_or("0.0.0.0") }
    pub fn port(&self) -> u16 { self.port.unwrap_or(DEFAULT_CONTROL_PORT) }
    pub fn io_timeout_ms(&self) -> u64 { self.io_timeout_ms.unwrap_or(5000) }
    pub fn max_connections(&self) -> usize { self.max_connections.unwrap_or(16) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EasingKind {
    #[default]
    Sine,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerConfig {
    pub frame_interval_ms: Option<u64>,
    pub transition_ms: Option<u64>,
    pub transition_steps: Option<u32>,
    pub easing: Option<EasingKind>,
}

impl SchedulerConfig {
    pub fn frame_interval_ms(&self) -> u64 { self.frame_interval_ms.unwrap_or(10) }
    pub fn transition_ms(&self) -> u64 { self.transition_ms.unwrap_or(350) }
    pub fn transition_steps(&self) -> u32 { self.transition_steps.unwrap_or(12) }
    pub fn easing(&self) -> EasingKind { self.easing.unwrap_or_default() }
}

impl Config {
    pub fn matrix(&self) -> MatrixConfig { self.matrix.clone().unwrap_or_default() }
    pub fn control(&self) -> ControlConfig { self.control.clone().unwrap_or_default() }
    pub fn scheduler(&self) -> SchedulerConfig { self.scheduler.clone().unwrap_or_default() }

    pub fn state_file(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(|| PathBuf::from("config.json"))
    }

    pub fn resource_dir(&self) -> PathBuf {
        self.resource_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "InfoCube", about = "InfoCube LED matrix display", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// shorthand for --log-level debug
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    pub debug: bool,
    /// persisted state document (JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub state_file: Option<PathBuf>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    /// plugin to show first, ahead of the persisted one
    #[arg(long)]
    pub display_mode: Option<String>,
    /// gif to select before the first switch
    #[arg(long)]
    pub gif_name: Option<String>,
    /// force the headless virtual panel
    #[arg(long = "virtual", action = ArgAction::SetTrue)]
    pub virtual_panel: bool,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();

    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, &cli);

    // 4) Validate
    validate(&cfg)?;

    if cli.dump_config {
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/infocube/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/infocube/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/infocube.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["infocube.yaml", "config.yaml", "config/infocube.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_yaml::from_str(s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
pub fn merge(dst: &mut Config, src: Config) {
    // top-level
    if src.log_level.is_some()    { dst.log_level = src.log_level; }
    if src.state_file.is_some()   { dst.state_file = src.state_file; }
    if src.resource_dir.is_some() { dst.resource_dir = src.resource_dir; }
    // matrix
    match (&mut dst.matrix, src.matrix) {
        (None, Some(c)) => dst.matrix = Some(c),
        (Some(d), Some(s)) => merge_matrix(d, s),
        _ => {}
    }
    // control
    match (&mut dst.control, src.control) {
        (None, Some(c)) => dst.control = Some(c),
        (Some(d), Some(s)) => merge_control(d, s),
        _ => {}
    }
    // scheduler
    match (&mut dst.scheduler, src.scheduler) {
        (None, Some(c)) => dst.scheduler = Some(c),
        (Some(d), Some(s)) => merge_scheduler(d, s),
        _ => {}
    }
}

fn merge_matrix(dst: &mut MatrixConfig, src: MatrixConfig) {
    if src.rows.is_some()             { dst.rows = src.rows; }
    if src.cols.is_some()             { dst.cols = src.cols; }
    if src.chain_length.is_some()     { dst.chain_length = src.chain_length; }
    if src.parallel.is_some()         { dst.parallel = src.parallel; }
    if src.brightness.is_some()       { dst.brightness = src.brightness; }
    if src.hardware_mapping.is_some() { dst.hardware_mapping = src.hardware_mapping; }
    if src.gpio_slowdown.is_some()    { dst.gpio_slowdown = src.gpio_slowdown; }
    if src.backend.is_some()          { dst.backend = src.backend; }
}

fn merge_control(dst: &mut ControlConfig, src: ControlConfig) {
    if src.enabled.is_some()         { dst.enabled = src.enabled; }
    if src.host.is_some()            { dst.host = src.host; }
    if src.port.is_some()            { dst.port = src.port; }
    if src.io_timeout_ms.is_some()   { dst.io_timeout_ms = src.io_timeout_ms; }
    if src.max_connections.is_some() { dst.max_connections = src.max_connections; }
}

fn merge_scheduler(dst: &mut SchedulerConfig, src: SchedulerConfig) {
    if src.frame_interval_ms.is_some() { dst.frame_interval_ms = src.frame_interval_ms; }
    if src.transition_ms.is_some()     { dst.transition_ms = src.transition_ms; }
    if src.transition_steps.is_some()  { dst.transition_steps = src.transition_steps; }
    if src.easing.is_some()            { dst.easing = src.easing; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()  { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                { cfg.log_level = Some("debug".to_string()); }
    if cli.state_file.is_some() { cfg.state_file = cli.state_file.clone(); }

    if cli.host.is_some() || cli.port.is_some() {
        let control = cfg.control.get_or_insert_with(ControlConfig::default);
        if cli.host.is_some() { control.host = cli.host.clone(); }
        if cli.port.is_some() { control.port = cli.port; }
    }
    if cli.virtual_panel {
        cfg.matrix.get_or_insert_with(MatrixConfig::default).backend = Some(BackendKind::Virtual);
    }

    cfg.display_mode = cli.display_mode.clone();
    cfg.gif_name = cli.gif_name.clone();
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(matrix) = cfg.matrix.as_ref() {
        if !(8..=256).contains(&matrix.rows()) || !(8..=256).contains(&matrix.cols()) {
            return Err(ConfigError::Validation("matrix rows/cols must be 8..=256".into()));
        }
        if !(1..=8).contains(&matrix.chain_length()) {
            return Err(ConfigError::Validation("matrix chain_length must be 1..=8".into()));
        }
        if !(1..=3).contains(&matrix.parallel()) {
            return Err(ConfigError::Validation("matrix parallel must be 1..=3".into()));
        }
        if !(1..=100).contains(&matrix.brightness()) {
            return Err(ConfigError::Validation("matrix brightness must be 1..=100".into()));
        }
    }
    if let Some(control) = cfg.control.as_ref() {
        if control.port() == 0 {
            return Err(ConfigError::Validation("control port must be > 0".into()));
        }
        if control.max_connections() == 0 {
            return Err(ConfigError::Validation("control max_connections must be > 0".into()));
        }
    }
    if let Some(sched) = cfg.scheduler.as_ref() {
        if !(1..=1000).contains(&sched.frame_interval_ms()) {
            return Err(ConfigError::Validation("scheduler frame_interval_ms must be 1..=1000".into()));
        }
        if !(1..=120).contains(&sched.transition_steps()) {
            return Err(ConfigError::Validation("scheduler transition_steps must be 1..=120".into()));
        }
        if !(50..=2000).contains(&sched.transition_ms()) {
            return Err(ConfigError::Validation("scheduler transition_ms must be 50..=2000".into()));
        }
    }
    Ok(())
}
