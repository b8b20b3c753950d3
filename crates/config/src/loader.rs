use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::ArchiverConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "git-archiver.toml",
    "git-archiver.yaml",
    "git-archiver.yml",
    "git-archiver.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<ArchiverConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./git-archiver.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/git-archiver/git-archiver.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ArchiverConfig::default()` if no config file is found or the
/// file fails to parse. `GIT_ARCHIVER_*` overrides are not applied here.
pub fn discover_and_load() -> ArchiverConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    ArchiverConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/git-archiver/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "git-archiver").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<ArchiverConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let where_ = path.display();

    match ext {
        "toml" => toml::from_str(raw).with_context(|| format!("parse {where_}")),
        "yaml" | "yml" => serde_yaml::from_str(raw).with_context(|| format!("parse {where_}")),
        "json" => serde_json::from_str(raw).with_context(|| format!("parse {where_}")),
        _ => Err(Error::message(format!("unsupported config format: .{ext}"))),
    }
}

/// Apply the `GIT_ARCHIVER_*` deployment variables on top of `config`.
pub fn apply_env_overrides(config: &mut ArchiverConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut ArchiverConfig, lookup: impl Fn(&str) -> Option<String>) {
    let archive = &mut config.archive;

    if let Some(path) = lookup("GIT_ARCHIVER_ARCHIVE_VOLUME_PATH") {
        archive.volume_path = PathBuf::from(path);
    }
    if let Some(n) = parse_var(&lookup, "GIT_ARCHIVER_CONCURRENT_WORKERS") {
        archive.concurrent_workers = n;
    }
    if let Some(n) = parse_var(&lookup, "GIT_ARCHIVER_MAX_DISK_QUOTA") {
        archive.max_disk_quota = n;
    }
    if let Some(uri) = lookup("GIT_ARCHIVER_DOCKER_URI") {
        archive.docker_host = Some(uri);
    }
    if let Some(image) = lookup("GIT_ARCHIVER_DOCKER_WORKER_IMAGE") {
        archive.worker_image = image;
    }
    if let Some(secs) = parse_var(&lookup, "GIT_ARCHIVER_TIMEOUT") {
        archive.timeout_secs = secs;
    }
    if let Some(key) = lookup("GIT_ARCHIVER_ACCESS_KEY") {
        archive.access_key = Some(Secret::new(key));
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable environment override");
            None
        },
    }
}
