use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Configuration for a page monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Maximum number of fetches in flight during a check cycle
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-fetch timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// User-Agent header sent with every fetch
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Normalization pipeline
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

/// Ordered filter pipeline turning raw HTML into canonical text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Filters, applied in list order
    #[serde(default = "default_filters")]
    pub filters: Vec<FilterSpec>,

    /// Upper bound on pipeline re-runs while looking for a stable output
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
}

/// A single named step of the normalization pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Name used in logs and error messages
    pub name: String,

    #[serde(flatten)]
    pub kind: FilterKind,
}

/// What a filter does
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterKind {
    /// Remove volatile query parameters wherever they occur in the markup
    StripParams { rules: Vec<ParamRule> },

    /// Collapse every whitespace run to one space and trim
    CollapseWhitespace,

    /// Parse the markup and drop every subtree matching one of the CSS selectors
    RemoveElements { selectors: Vec<String> },

    /// Rewrite known dynamic fragments to a fixed replacement
    ReplaceFragments { rules: Vec<FragmentRule> },
}

/// A volatile query parameter: a name pattern and the shape of its value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamRule {
    /// Regex for the parameter name (matched case-insensitively, anchored to the whole name)
    pub name: String,

    /// Regex for the parameter value
    pub pattern: String,
}

/// A dynamic fragment and the placeholder it is rewritten to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentRule {
    pub pattern: String,

    /// Replacement text; may reference capture groups as `${name}`
    pub replacement: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            filters: default_filters(),
            max_passes: default_max_passes(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }
}

impl FilterSpec {
    pub fn new(name: &str, kind: FilterKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

impl ParamRule {
    pub fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

impl FragmentRule {
    pub fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

/// Default value for max_concurrency
fn default_max_concurrency() -> usize {
    5
}

/// Default value for fetch_timeout_secs
fn default_fetch_timeout_secs() -> u64 {
    30
}

/// Default value for user_agent
fn default_user_agent() -> String {
    format!("page-watch/{}", env!("CARGO_PKG_VERSION"))
}

/// Default fixpoint bound for the normalizer
fn default_max_passes() -> usize {
    4
}

/// Query parameters that change between requests to an unchanged page
pub fn default_param_rules() -> Vec<ParamRule> {
    // Values stop at the next parameter, fragment, quote, whitespace or tag delimiter
    let any_value = r#"[^&#"'\s<>]*"#;
    vec![
        // Session identifiers
        ParamRule::new(
            "sessionid|session_id|sid|phpsessid|jsessionid|aspsessionid",
            any_value,
        ),
        // One-time tokens
        ParamRule::new(
            "token|csrf|csrf_token|_csrf|nonce|authenticity_token",
            any_value,
        ),
        // Numeric cache busters
        ParamRule::new(
            "_|t|ts|cb|cachebust|cache_bust|timestamp|nocache",
            r"\d+",
        ),
        // Hex handshake ids
        ParamRule::new("hs|handshake|handshake_id", "[0-9a-fA-F]+"),
    ]
}

/// Subtrees that never carry comparable content
pub fn default_removed_selectors() -> Vec<String> {
    [
        r#"[class*="dynamic"]"#,
        r#"[id="timestamp"]"#,
        "meta",
        "input",
        "textarea",
        "select",
        "button",
        "option",
        "noscript",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Dynamic fragments that survive element removal
pub fn default_fragment_rules() -> Vec<FragmentRule> {
    vec![
        // Build ids appended to script and stylesheet paths
        FragmentRule::new(
            r"(?P<asset>\.(?:js|mjs|css))\?(?:v|ver|version|build)=[0-9A-Za-z._-]+",
            "${asset}?v=DYNAMIC",
        ),
        // Cloudflare re-encodes obfuscated addresses with a fresh key per response
        FragmentRule::new(
            r"(?P<path>/cdn-cgi/l/email-protection)#[0-9a-fA-F]+",
            "${path}#DYNAMIC",
        ),
        FragmentRule::new(r#"data-cfemail="[0-9a-fA-F]+""#, r#"data-cfemail="DYNAMIC""#),
    ]
}

/// The default normalization pipeline
pub fn default_filters() -> Vec<FilterSpec> {
    vec![
        FilterSpec::new(
            "strip_volatile_params",
            FilterKind::StripParams {
                rules: default_param_rules(),
            },
        ),
        FilterSpec::new("collapse_whitespace", FilterKind::CollapseWhitespace),
        FilterSpec::new(
            "remove_dynamic_elements",
            FilterKind::RemoveElements {
                selectors: default_removed_selectors(),
            },
        ),
        FilterSpec::new(
            "replace_dynamic_fragments",
            FilterKind::ReplaceFragments {
                rules: default_fragment_rules(),
            },
        ),
        // Element removal can leave adjacent spaces behind
        FilterSpec::new("tidy_whitespace", FilterKind::CollapseWhitespace),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = MonitorConfig::from_json("{}").unwrap();
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert!(config.user_agent.starts_with("page-watch/"));
        assert_eq!(config.normalizer.max_passes, 4);

        let names: Vec<_> = config
            .normalizer
            .filters
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "strip_volatile_params",
                "collapse_whitespace",
                "remove_dynamic_elements",
                "replace_dynamic_fragments",
                "tidy_whitespace",
            ]
        );
    }

    #[test]
    fn test_custom_filter_list() {
        let json = r#"{
            "max_concurrency": 2,
            "normalizer": {
                "filters": [
                    { "name": "drop_ads", "type": "remove_elements", "selectors": [".ad"] },
                    { "name": "squash", "type": "collapse_whitespace" }
                ]
            }
        }"#;
        let config = MonitorConfig::from_json(json).unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.normalizer.filters.len(), 2);
        match &config.normalizer.filters[0].kind {
            FilterKind::RemoveElements { selectors } => assert_eq!(selectors, &vec![".ad"]),
            other => panic!("unexpected filter kind: {:?}", other),
        }
        assert!(matches!(
            config.normalizer.filters[1].kind,
            FilterKind::CollapseWhitespace
        ));
    }

    #[test]
    fn test_unknown_filter_type_is_rejected() {
        let json = r#"{ "normalizer": { "filters": [ { "name": "x", "type": "teleport" } ] } }"#;
        assert!(matches!(
            MonitorConfig::from_json(json),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = MonitorConfig::from_json(include_str!("../demos/monitor.json")).unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert!(!config.normalizer.filters.is_empty());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = MonitorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = MonitorConfig::from_json(&json).unwrap();
        assert_eq!(parsed.normalizer.filters.len(), config.normalizer.filters.len());
    }
}
