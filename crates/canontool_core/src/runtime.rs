use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const STATE_DIR_NAME: &str = ".canontool";
pub const CONFIG_FILENAME: &str = "config.toml";

pub const ROOT_ENV_VAR: &str = "CANONTOOL_ROOT";
pub const CONFIG_ENV_VAR: &str = "CANONTOOL_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub site_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub site_root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Folder name of the site root, used as the optional URL base segment.
    pub fn site_root_name(&self) -> Option<String> {
        self.site_root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "site_root: {} ({})\nstate_dir: {}\nconfig_path: {} ({})",
            normalize_path(&self.site_root),
            self.root_source.as_str(),
            normalize_path(&self.state_dir),
            normalize_path(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub site_root_exists: bool,
    pub state_dir_exists: bool,
    pub config_exists: bool,
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> RuntimeStatus {
    RuntimeStatus {
        site_root_exists: paths.site_root.is_dir(),
        state_dir_exists: paths.state_dir.is_dir(),
        config_exists: paths.config_path.is_file(),
    }
}

/// Resolve the site root and config location. Precedence per value:
/// flag > environment > default.
pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    let (site_root, root_source) = if let Some(root) = &overrides.site_root {
        (absolutize(&context.cwd, root), ValueSource::Flag)
    } else if let Some(value) = non_empty_env(ROOT_ENV_VAR) {
        (absolutize(&context.cwd, Path::new(&value)), ValueSource::Env)
    } else {
        (context.cwd.clone(), ValueSource::Default)
    };

    let state_dir = site_root.join(STATE_DIR_NAME);

    let (config_path, config_source) = if let Some(config) = &overrides.config {
        (absolutize(&context.cwd, config), ValueSource::Flag)
    } else if let Some(value) = non_empty_env(CONFIG_ENV_VAR) {
        (absolutize(&context.cwd, Path::new(&value)), ValueSource::Env)
    } else {
        (state_dir.join(CONFIG_FILENAME), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        site_root,
        state_dir,
        config_path,
        root_source,
        config_source,
    })
}

fn non_empty_env(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{PathOverrides, ResolutionContext, ValueSource, resolve_paths};

    fn context(cwd: &str) -> ResolutionContext {
        ResolutionContext {
            cwd: PathBuf::from(cwd),
        }
    }

    #[test]
    fn defaults_to_cwd_and_state_dir_config() {
        let paths = resolve_paths(&context("/srv/site"), &PathOverrides::default()).expect("resolve");
        assert_eq!(paths.site_root, PathBuf::from("/srv/site"));
        assert_eq!(paths.state_dir, PathBuf::from("/srv/site/.canontool"));
        assert_eq!(
            paths.config_path,
            PathBuf::from("/srv/site/.canontool/config.toml")
        );
        assert_eq!(paths.root_source, ValueSource::Default);
        assert_eq!(paths.config_source, ValueSource::Default);
    }

    #[test]
    fn flag_overrides_win_and_relative_flags_join_cwd() {
        let overrides = PathOverrides {
            site_root: Some(PathBuf::from("public")),
            config: Some(PathBuf::from("/etc/canontool.toml")),
        };
        let paths = resolve_paths(&context("/srv"), &overrides).expect("resolve");
        assert_eq!(paths.site_root, PathBuf::from("/srv/public"));
        assert_eq!(paths.config_path, PathBuf::from("/etc/canontool.toml"));
        assert_eq!(paths.root_source, ValueSource::Flag);
        assert_eq!(paths.config_source, ValueSource::Flag);
    }

    #[test]
    fn site_root_name_is_the_folder_name() {
        let overrides = PathOverrides {
            site_root: Some(PathBuf::from("/srv/blog")),
            config: None,
        };
        let paths = resolve_paths(&context("/srv"), &overrides).expect("resolve");
        assert_eq!(paths.site_root_name().as_deref(), Some("blog"));
    }
}
