/// Source factory assembly
///
/// Turns the declarative [`SourceSpec`]s of a [`Settings`] snapshot into
/// executable [`SourceFactory`] values. Intrinsic (bundled) sources are always
/// assembled; every other spec is resolved through a [`SourceLoader`] and is
/// simply left out when resolution fails.
///
/// A [`FactoryRegistry`] is built once per settings generation and is never
/// edited afterwards; reconfiguring builds a new registry.
use crate::settings::{CacheSpec, MatchOptions, Settings, SnippetEngineSpec, SourceSpec, DEFAULT_RANK};
use crate::source::{Manufacture, SnippetManufacture, SourceLoader};
use crate::types::{Seed, SnippetSeed};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Executable form of a [`SourceSpec`]
pub struct SourceFactory {
    pub name: String,
    pub short_name: String,
    pub enabled: bool,
    /// Source specific deadline; falls back to the global timeout when `None`
    pub timeout: Option<Duration>,
    pub limit: Option<usize>,
    pub unique: bool,
    pub rank: i32,
    pub cache: CacheSpec,
    pub seed: Seed,
    pub manufacture: Arc<dyn Manufacture>,
}

impl std::fmt::Debug for SourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFactory")
            .field("name", &self.name)
            .field("short_name", &self.short_name)
            .field("enabled", &self.enabled)
            .field("timeout", &self.timeout)
            .field("limit", &self.limit)
            .field("unique", &self.unique)
            .field("rank", &self.rank)
            .finish_non_exhaustive()
    }
}

/// Build a factory from its spec and resolved entry point
pub fn assemble(
    name: &str,
    spec: &SourceSpec,
    manufacture: Arc<dyn Manufacture>,
    match_options: &MatchOptions,
) -> SourceFactory {
    let seed = Seed {
        match_options: match_options.clone(),
        limit: spec.limit,
        config: spec.config.clone(),
    };

    SourceFactory {
        name: name.to_string(),
        short_name: spec.short_name.clone(),
        enabled: spec.enabled,
        timeout: spec.timeout,
        limit: spec.limit,
        unique: spec.unique,
        rank: spec.rank.unwrap_or(DEFAULT_RANK),
        cache: spec.cache,
        seed,
        manufacture,
    }
}

/// Bundled source entry points, keyed by source name
#[derive(Default, Clone)]
pub struct IntrinsicSources {
    entries: BTreeMap<String, Arc<dyn Manufacture>>,
}

impl IntrinsicSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every source bundled with this crate
    pub fn with_builtin_sources() -> Self {
        let mut intrinsic = Self::new();
        intrinsic.register(crate::sources::around::NAME, Arc::new(crate::sources::around::AroundFactory));
        intrinsic.register(crate::sources::buffers::NAME, Arc::new(crate::sources::buffers::BuffersFactory));
        intrinsic.register(crate::sources::lsp::NAME, Arc::new(crate::sources::lsp::LspFactory));
        intrinsic.register(crate::sources::paths::NAME, Arc::new(crate::sources::paths::PathsFactory));
        intrinsic
    }

    /// Register an entry point, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, manufacture: Arc<dyn Manufacture>) {
        self.entries.insert(name.into(), manufacture);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Manufacture>> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Immutable map of source factories for one settings generation
#[derive(Debug, Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<String, Arc<SourceFactory>>,
}

impl FactoryRegistry {
    /// Assemble every source factory for `settings`
    ///
    /// Never fails: intrinsic sources without a spec and external sources the
    /// loader cannot resolve are omitted.
    pub fn load(settings: &Settings, intrinsic: &IntrinsicSources, loader: &dyn SourceLoader) -> Self {
        let mut factories = BTreeMap::new();

        for (name, manufacture) in &intrinsic.entries {
            match settings.sources.get(name) {
                Some(spec) => {
                    let factory = assemble(name, spec, manufacture.clone(), &settings.match_options);
                    factories.insert(name.clone(), Arc::new(factory));
                }
                None => warn!(source = %name, "Intrinsic source has no configuration, skipping"),
            }
        }

        for (name, spec) in &settings.sources {
            if intrinsic.entries.contains_key(name) {
                continue;
            }

            match loader.load(&spec.main) {
                Some(manufacture) => {
                    let factory = assemble(name, spec, manufacture, &settings.match_options);
                    factories.insert(name.clone(), Arc::new(factory));
                }
                None => debug!(source = %name, main = %spec.main, "Source entry point not resolved"),
            }
        }

        Self { factories }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SourceFactory>> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<SourceFactory>)> {
        self.factories.iter()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Build the factory map for one settings generation
pub fn load_factories(
    settings: &Settings,
    intrinsic: &IntrinsicSources,
    loader: &dyn SourceLoader,
) -> FactoryRegistry {
    FactoryRegistry::load(settings, intrinsic, loader)
}

/// Executable form of a [`SnippetEngineSpec`]
pub struct EngineFactory {
    pub seed: SnippetSeed,
    pub manufacture: Arc<dyn SnippetManufacture>,
}

fn build_engine(
    spec: &SnippetEngineSpec,
    manufacture: Arc<dyn SnippetManufacture>,
    match_options: &MatchOptions,
) -> EngineFactory {
    EngineFactory {
        seed: SnippetSeed {
            match_options: match_options.clone(),
            config: spec.config.clone(),
        },
        manufacture,
    }
}

/// Assemble snippet engines keyed by each snippet kind they declare
///
/// Disabled and unresolvable engines are omitted. When two engines claim the
/// same kind, the one whose name sorts last wins.
pub fn load_engines(
    settings: &Settings,
    intrinsic: &BTreeMap<String, Arc<dyn SnippetManufacture>>,
    loader: &dyn SourceLoader,
) -> BTreeMap<String, Arc<EngineFactory>> {
    let mut engines = BTreeMap::new();

    for (name, spec) in &settings.snippet_engines {
        if !spec.enabled {
            continue;
        }

        let manufacture = match intrinsic.get(name) {
            Some(manufacture) => Some(manufacture.clone()),
            None => loader.load_engine(&spec.main),
        };

        let Some(manufacture) = manufacture else {
            debug!(engine = %name, main = %spec.main, "Snippet engine entry point not resolved");
            continue;
        };

        let factory = Arc::new(build_engine(spec, manufacture, &settings.match_options));
        for kind in &spec.kinds {
            engines.insert(kind.clone(), factory.clone());
        }
    }

    engines
}
