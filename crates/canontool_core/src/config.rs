use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DOMAIN_ENV_VAR: &str = "CANONTOOL_DOMAIN";

/// Run-wide treatment of pre-existing canonical tags. Exactly one per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    #[serde(rename = "skip")]
    SkipExisting,
    #[serde(rename = "replace")]
    ReplaceExisting,
    #[serde(rename = "remove")]
    RemoveOnly,
}

impl Policy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SkipExisting => "skip",
            Self::ReplaceExisting => "replace",
            Self::RemoveOnly => "remove",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::SkipExisting),
            "replace" => Ok(Self::ReplaceExisting),
            "remove" => Ok(Self::RemoveOnly),
            other => bail!("unknown policy: {other} (expected skip, replace, or remove)"),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::SkipExisting => "insert canonical tags, skipping files that already have one",
            Self::ReplaceExisting => "insert canonical tags, replacing any existing ones",
            Self::RemoveOnly => "remove canonical tags without inserting new ones",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub domain: Option<String>,
    pub include_base_path: Option<bool>,
    pub policy: Option<Policy>,
}

impl SiteConfig {
    /// Resolve the configured domain with owned return: env > config > None.
    pub fn domain_owned(&self) -> Option<String> {
        if let Ok(value) = env::var(DOMAIN_ENV_VAR) {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        self.site.domain.clone()
    }
}

/// Load a SiteConfig from a TOML file. Returns default if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SiteConfig> {
    if !config_path.exists() {
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SiteConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn store_config(config_path: &Path, config: &SiteConfig) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(config).context("failed to serialize config")?;
    fs::write(config_path, content)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(())
}

static DOMAIN_PATTERN: OnceLock<Regex> = OnceLock::new();

fn domain_pattern() -> &'static Regex {
    DOMAIN_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("domain pattern"))
}

/// Normalize and validate a user-supplied domain: trim whitespace, strip one
/// leading http:// or https:// (case-insensitive) and one trailing slash,
/// then require a `label(.label)+.tld` shape.
pub fn normalize_domain(input: &str) -> Result<String> {
    let mut value = input.trim();
    for scheme in ["http://", "https://"] {
        if let Some(prefix) = value.get(..scheme.len())
            && prefix.eq_ignore_ascii_case(scheme)
        {
            value = &value[scheme.len()..];
            break;
        }
    }
    value = value.strip_suffix('/').unwrap_or(value).trim();
    if value.is_empty() {
        bail!("domain is empty");
    }
    if !domain_pattern().is_match(value) {
        bail!("invalid domain: {value} (expected something like example.com)");
    }
    Ok(value.to_string())
}

/// Immutable per-run configuration, constructed once at startup and passed
/// into every resolver/rewriter call.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub domain: String,
    pub policy: Policy,
    pub include_base_path: bool,
}

impl RunConfig {
    pub fn new(domain_input: &str, policy: Policy, include_base_path: bool) -> Result<Self> {
        Ok(Self {
            domain: normalize_domain(domain_input)?,
            policy,
            include_base_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{Policy, SiteConfig, SiteSection, load_config, normalize_domain, store_config};

    #[test]
    fn domain_accepts_plain_hosts() {
        assert_eq!(normalize_domain("example.com").expect("valid"), "example.com");
        assert_eq!(
            normalize_domain("sub.example.co.uk").expect("valid"),
            "sub.example.co.uk"
        );
    }

    #[test]
    fn domain_strips_scheme_and_trailing_slash() {
        assert_eq!(
            normalize_domain("https://example.com/").expect("valid"),
            "example.com"
        );
        assert_eq!(
            normalize_domain("HTTP://Example.com").expect("valid"),
            "Example.com"
        );
        assert_eq!(
            normalize_domain("  http://my-site.org  ").expect("valid"),
            "my-site.org"
        );
    }

    #[test]
    fn domain_rejects_invalid_inputs() {
        for input in ["not a domain", "http://", "", "localhost", "example", "/"] {
            assert!(normalize_domain(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn policy_parse_round_trips() {
        for policy in [Policy::SkipExisting, Policy::ReplaceExisting, Policy::RemoveOnly] {
            assert_eq!(Policy::parse(policy.as_str()).expect("parse"), policy);
        }
        assert!(Policy::parse("purge").is_err());
    }

    #[test]
    fn missing_config_file_yields_default() {
        let temp = tempdir().expect("tempdir");
        let config = load_config(&temp.path().join("config.toml")).expect("load");
        assert_eq!(config, SiteConfig::default());
    }

    #[test]
    fn config_store_load_round_trip() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join(".canontool").join("config.toml");
        let config = SiteConfig {
            site: SiteSection {
                domain: Some("example.com".to_string()),
                include_base_path: Some(true),
                policy: Some(Policy::ReplaceExisting),
            },
        };
        store_config(&config_path, &config).expect("store");
        let loaded = load_config(&config_path).expect("load");
        assert_eq!(loaded, config);
    }
}
