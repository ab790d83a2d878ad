/// Settings snapshot and layered configuration merging
///
/// Settings are assembled once from the embedded defaults plus any number of
/// override layers (client config, then user config). Later layers replace
/// keys of earlier ones; nested objects are merged key by key. The resulting
/// [`Settings`] value is never mutated: reconfiguration builds a new one.
use crate::error::{CompletionError, CompletionResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Embedded default configuration
const DEFAULT_SETTINGS: &str = include_str!("../config/defaults.json");

/// Rank assigned to sources that do not configure one
pub const DEFAULT_RANK: i32 = 100;

/// Configuration layer format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

/// Popup rendering options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub ellipsis: String,
    pub tabsize: usize,
    /// Maximum rendered label width, in characters
    pub pum_max_len: usize,
    /// Maximum number of candidates delivered by one merge
    pub max_results: usize,
}

/// Fuzzy matching parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// How many adjacent-character swaps a prefix match forgives
    pub transpose_band: usize,
    /// Characters treated as equivalent to each other while matching
    pub unifying_chars: BTreeSet<char>,
    /// Minimum prefix length before non-prefix fuzzy matches are accepted
    #[serde(default = "default_min_match")]
    pub min_match: usize,
}

fn default_min_match() -> usize {
    1
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            transpose_band: 2,
            unifying_chars: ['-', '_'].into_iter().collect(),
            min_match: default_min_match(),
        }
    }
}

/// Result cache policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Number of leading prefix characters that form the cache key
    pub prefix_matches: usize,
    pub short_name: String,
    pub source_name: String,
    /// Maximum cached completions replayed for one source
    pub limit: usize,
    /// Added to a source's rank when its results come from the cache
    pub rank_penalty: i32,
}

/// Per-source cache switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheSpec {
    pub enabled: bool,
    pub same_filetype: bool,
}

/// Declarative description of one completion source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Entry point reference, resolved by name
    pub main: String,
    pub short_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default, with = "millis")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub rank: Option<i32>,
    #[serde(default)]
    pub cache: CacheSpec,
    #[serde(default)]
    pub config: Value,
}

/// Declarative description of a snippet engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetEngineSpec {
    pub main: String,
    pub enabled: bool,
    /// Snippet kinds this engine expands
    pub kinds: Vec<String>,
    #[serde(default)]
    pub config: Value,
}

/// Immutable settings snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub retries: u32,
    /// Global per-merge deadline; `None` waits for every source
    #[serde(with = "millis")]
    pub timeout: Option<Duration>,
    pub display: DisplayOptions,
    #[serde(rename = "match")]
    pub match_options: MatchOptions,
    pub cache: CacheOptions,
    pub sources: BTreeMap<String, SourceSpec>,
    #[serde(default)]
    pub snippet_engines: BTreeMap<String, SnippetEngineSpec>,
    pub logging_level: String,
}

impl Settings {
    /// Build settings from the embedded defaults and override layers
    ///
    /// Layers are applied in order, so the last layer has the final say.
    pub fn initial(layers: &[Value]) -> CompletionResult<Self> {
        let mut config: Value = serde_json::from_str(DEFAULT_SETTINGS)?;
        for layer in layers {
            config = merge_layer(config, layer.clone());
        }

        let settings: Settings = serde_json::from_value(config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings built from the embedded defaults only
    pub fn defaults() -> CompletionResult<Self> {
        Self::initial(&[])
    }

    /// Parse one configuration layer
    pub fn parse_layer(content: &str, format: ConfigFormat) -> CompletionResult<Value> {
        let layer = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(layer)
    }

    /// Names of the sources enabled in configuration
    pub fn enabled_sources(&self) -> BTreeSet<String> {
        self.sources
            .iter()
            .filter(|(_, spec)| spec.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn validate(&self) -> CompletionResult<()> {
        if self.display.pum_max_len == 0 {
            return Err(CompletionError::ConfigError(
                "display.pum_max_len must be positive".to_string(),
            ));
        }

        if self.display.tabsize == 0 {
            return Err(CompletionError::ConfigError(
                "display.tabsize must be positive".to_string(),
            ));
        }

        for (name, spec) in &self.sources {
            if spec.short_name.is_empty() {
                return Err(CompletionError::ConfigError(format!(
                    "Source '{}' has an empty short_name",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Merge `layer` over `base`
///
/// Objects merge recursively; any other value in `layer` replaces the one in
/// `base`, including arrays and explicit nulls.
pub fn merge_layer(base: Value, layer: Value) -> Value {
    match (base, layer) {
        (Value::Object(mut base), Value::Object(layer)) => {
            for (key, value) in layer {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_layer(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, layer) => layer,
    }
}

/// Optional durations expressed as whole milliseconds, `null` meaning unbounded
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        // 0 is treated like null: no deadline
        Ok(millis.filter(|ms| *ms > 0).map(Duration::from_millis))
    }
}
