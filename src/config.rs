use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NormError, Result};
use crate::search::hybrid::FusionStrategy;
use crate::search::retriever::{BM25, DENSE, TFIDF};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub bm25: Bm25Config,
    #[serde(default)]
    pub dense: DenseConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub boost: BoostConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load defaults, then the config file, then `NORMATIVA_*` environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("NORMATIVA_CONFIG").ok().map(PathBuf::from));

        let path = match explicit {
            Some(path) => Some(path),
            None => dirs::config_dir().map(|dir| dir.join("normativa/config.toml")),
        };
        if let Some(path) = path {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let patch: ConfigPatch = toml::from_str(raw)
            .map_err(|err| NormError::Config(format!("parse config: {err}")))?;
        let mut config = Self::default();
        config.merge_patch(patch);
        config.validate()?;
        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| NormError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| NormError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.engine {
            self.engine.merge(patch);
        }
        if let Some(patch) = patch.bm25 {
            self.bm25.merge(patch);
        }
        if let Some(patch) = patch.dense {
            self.dense.merge(patch);
        }
        if let Some(patch) = patch.fusion {
            self.fusion.merge(patch);
        }
        if let Some(patch) = patch.boost {
            self.boost.merge(patch);
        }
        if let Some(patch) = patch.cache {
            self.cache.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvLookup(lookup);

        if let Some(value) = env.usize("NORMATIVA_ENGINE_DEFAULT_K")? {
            self.engine.default_k = value;
        }
        if let Some(value) = env.usize("NORMATIVA_ENGINE_CANDIDATE_POOL")? {
            self.engine.candidate_pool = value;
        }
        if let Some(value) = env.bool("NORMATIVA_ENGINE_PARALLEL") {
            self.engine.parallel = value;
        }
        if let Some(value) = env.u64("NORMATIVA_ENGINE_RETRIEVER_TIMEOUT_MS")? {
            self.engine.retriever_timeout_ms = value;
        }
        if let Some(value) = env.u64("NORMATIVA_ENGINE_QUERY_TIMEOUT_MS")? {
            self.engine.query_timeout_ms = value;
        }
        if let Some(value) = env.usize("NORMATIVA_ENGINE_MAX_IN_FLIGHT")? {
            self.engine.max_in_flight = value;
        }

        if let Some(value) = env.f64("NORMATIVA_BM25_K1")? {
            self.bm25.k1 = value;
        }
        if let Some(value) = env.f64("NORMATIVA_BM25_B")? {
            self.bm25.b = value;
        }

        if let Some(value) = env.string("NORMATIVA_DENSE_EMBEDDING_BACKEND") {
            self.dense.embedding_backend = value;
        }
        if let Some(value) = env.u32("NORMATIVA_DENSE_EMBEDDING_DIMS")? {
            self.dense.embedding_dims = value;
        }
        if let Some(value) = env.f32("NORMATIVA_DENSE_MIN_SIMILARITY")? {
            self.dense.min_similarity = value;
        }

        if let Some(value) = env.string("NORMATIVA_FUSION_STRATEGY") {
            self.fusion.strategy = parse_fusion_kind(&value)?;
        }
        if let Some(value) = env.f64("NORMATIVA_FUSION_K_RRF")? {
            self.fusion.k_rrf = value;
        }
        if let Some(values) = env.list("NORMATIVA_FUSION_WEIGHTS") {
            self.fusion.weights = parse_weights(&values)?;
        }

        if let Some(value) = env.bool("NORMATIVA_BOOST_ENABLED") {
            self.boost.enabled = value;
        }
        if let Some(values) = env.list("NORMATIVA_BOOST_KEYWORDS") {
            self.boost.keywords = values;
        }
        if let Some(value) = env.f64("NORMATIVA_BOOST_AMOUNT_BONUS")? {
            self.boost.amount_bonus = value;
        }
        if let Some(value) = env.f64("NORMATIVA_BOOST_EXACT_MATCH_BONUS")? {
            self.boost.exact_match_bonus = value;
        }
        if let Some(value) = env.f64("NORMATIVA_BOOST_MAX_BONUS_FRACTION")? {
            self.boost.max_bonus_fraction = value;
        }

        if let Some(value) = env.bool("NORMATIVA_CACHE_ENABLED") {
            self.cache.enabled = value;
        }
        if let Some(value) = env.usize("NORMATIVA_CACHE_CAPACITY")? {
            self.cache.capacity = value;
        }

        Ok(())
    }

    /// Reject values the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.engine.default_k == 0 {
            return Err(NormError::Config("engine.default_k must be greater than 0".into()));
        }
        if self.engine.candidate_pool == 0 {
            return Err(NormError::Config(
                "engine.candidate_pool must be greater than 0".into(),
            ));
        }
        if self.engine.retriever_timeout_ms == 0 || self.engine.query_timeout_ms == 0 {
            return Err(NormError::Config("engine timeouts must be greater than 0".into()));
        }
        if self.engine.max_in_flight == 0 {
            return Err(NormError::Config(
                "engine.max_in_flight must be greater than 0".into(),
            ));
        }
        if !self.bm25.k1.is_finite() || self.bm25.k1 < 0.0 {
            return Err(NormError::Config(format!(
                "bm25.k1 must be a finite value >= 0, got {}",
                self.bm25.k1
            )));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(NormError::Config(format!(
                "bm25.b must be within [0, 1], got {}",
                self.bm25.b
            )));
        }
        if self.dense.embedding_dims == 0 {
            return Err(NormError::Config(
                "dense.embedding_dims must be greater than 0".into(),
            ));
        }
        // Weighted and RRF parameters share validation with per-call strategies.
        FusionStrategy::Rrf { k_rrf: self.fusion.k_rrf }.validate()?;
        FusionStrategy::Weighted {
            weights: self.fusion.weights.clone(),
        }
        .validate()?;
        for (name, value) in [
            ("boost.amount_bonus", self.boost.amount_bonus),
            ("boost.exact_match_bonus", self.boost.exact_match_bonus),
            ("boost.max_bonus_fraction", self.boost.max_bonus_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(NormError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(NormError::Config(
                "cache.capacity must be greater than 0 when the cache is enabled".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Results returned when the caller does not pass `k`
    #[serde(default)]
    pub default_k: usize,
    /// Candidates requested from each retriever before fusion
    #[serde(default)]
    pub candidate_pool: usize,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub retriever_timeout_ms: u64,
    #[serde(default)]
    pub query_timeout_ms: u64,
    /// Worker threads one retriever may have running, including ones a
    /// timed-out query stopped waiting for
    #[serde(default)]
    pub max_in_flight: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_k: 10,
            candidate_pool: 50,
            parallel: true,
            retriever_timeout_ms: 2_000,
            query_timeout_ms: 5_000,
            max_in_flight: 8,
        }
    }
}

impl EngineConfig {
    pub fn retriever_timeout(&self) -> Duration {
        Duration::from_millis(self.retriever_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    fn merge(&mut self, patch: EnginePatch) {
        if let Some(value) = patch.default_k {
            self.default_k = value;
        }
        if let Some(value) = patch.candidate_pool {
            self.candidate_pool = value;
        }
        if let Some(value) = patch.parallel {
            self.parallel = value;
        }
        if let Some(value) = patch.retriever_timeout_ms {
            self.retriever_timeout_ms = value;
        }
        if let Some(value) = patch.query_timeout_ms {
            self.query_timeout_ms = value;
        }
        if let Some(value) = patch.max_in_flight {
            self.max_in_flight = value;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Config {
    /// Term-frequency saturation
    #[serde(default)]
    pub k1: f64,
    /// Document-length normalization
    #[serde(default)]
    pub b: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl Bm25Config {
    fn merge(&mut self, patch: Bm25Patch) {
        if let Some(value) = patch.k1 {
            self.k1 = value;
        }
        if let Some(value) = patch.b {
            self.b = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseConfig {
    #[serde(default)]
    pub embedding_backend: String,
    #[serde(default)]
    pub embedding_dims: u32,
    /// Candidates at or below this similarity are dropped
    #[serde(default)]
    pub min_similarity: f32,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self {
            embedding_backend: "hash".to_string(),
            embedding_dims: 384,
            min_similarity: 0.0,
        }
    }
}

impl DenseConfig {
    fn merge(&mut self, patch: DensePatch) {
        if let Some(value) = patch.embedding_backend {
            self.embedding_backend = value;
        }
        if let Some(value) = patch.embedding_dims {
            self.embedding_dims = value;
        }
        if let Some(value) = patch.min_similarity {
            self.min_similarity = value;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionKind {
    #[default]
    Weighted,
    Rrf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default)]
    pub strategy: FusionKind,
    #[serde(default)]
    pub k_rrf: f64,
    /// Weight per retriever name for the weighted strategy
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: FusionKind::Weighted,
            k_rrf: 60.0,
            weights: BTreeMap::from([
                (BM25.to_string(), 0.4),
                (TFIDF.to_string(), 0.2),
                (DENSE.to_string(), 0.4),
            ]),
        }
    }
}

impl FusionConfig {
    /// Runtime strategy described by this section.
    pub fn strategy(&self) -> FusionStrategy {
        match self.strategy {
            FusionKind::Weighted => FusionStrategy::Weighted {
                weights: self.weights.clone(),
            },
            FusionKind::Rrf => FusionStrategy::Rrf { k_rrf: self.k_rrf },
        }
    }

    fn merge(&mut self, patch: FusionPatch) {
        if let Some(value) = patch.strategy {
            self.strategy = value;
        }
        if let Some(value) = patch.k_rrf {
            self.k_rrf = value;
        }
        if let Some(values) = patch.weights {
            self.weights = values;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Accent-folded, lowercase trigger words
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub currency_symbols: Vec<String>,
    /// Fraction of the batch maximum added to entries carrying any amount
    #[serde(default)]
    pub amount_bonus: f64,
    /// Fraction added when an entry amount equals an amount named in the query
    #[serde(default)]
    pub exact_match_bonus: f64,
    /// Upper bound on either bonus fraction
    #[serde(default)]
    pub max_bonus_fraction: f64,
    /// Scan entry text when metadata carries no amounts
    #[serde(default)]
    pub scan_text_fallback: bool,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: [
                "monto",
                "montos",
                "importe",
                "maximo",
                "minimo",
                "tope",
                "viatico",
                "viaticos",
                "asignacion",
                "soles",
                "dolares",
                "tarifa",
                "costo",
                "pago",
                "remuneracion",
                "cuanto",
                "cuanta",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            currency_symbols: ["s/", "us$", "$", "pen", "usd"]
                .into_iter()
                .map(String::from)
                .collect(),
            amount_bonus: 0.10,
            exact_match_bonus: 0.20,
            max_bonus_fraction: 0.25,
            scan_text_fallback: true,
        }
    }
}

impl BoostConfig {
    fn merge(&mut self, patch: BoostPatch) {
        if let Some(value) = patch.enabled {
            self.enabled = value;
        }
        if let Some(values) = patch.keywords {
            self.keywords = values;
        }
        if let Some(values) = patch.currency_symbols {
            self.currency_symbols = values;
        }
        if let Some(value) = patch.amount_bonus {
            self.amount_bonus = value;
        }
        if let Some(value) = patch.exact_match_bonus {
            self.exact_match_bonus = value;
        }
        if let Some(value) = patch.max_bonus_fraction {
            self.max_bonus_fraction = value;
        }
        if let Some(value) = patch.scan_text_fallback {
            self.scan_text_fallback = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 256,
        }
    }
}

impl CacheConfig {
    fn merge(&mut self, patch: CachePatch) {
        if let Some(value) = patch.enabled {
            self.enabled = value;
        }
        if let Some(value) = patch.capacity {
            self.capacity = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub engine: Option<EnginePatch>,
    pub bm25: Option<Bm25Patch>,
    pub dense: Option<DensePatch>,
    pub fusion: Option<FusionPatch>,
    pub boost: Option<BoostPatch>,
    pub cache: Option<CachePatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EnginePatch {
    pub default_k: Option<usize>,
    pub candidate_pool: Option<usize>,
    pub parallel: Option<bool>,
    pub retriever_timeout_ms: Option<u64>,
    pub query_timeout_ms: Option<u64>,
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Bm25Patch {
    pub k1: Option<f64>,
    pub b: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DensePatch {
    pub embedding_backend: Option<String>,
    pub embedding_dims: Option<u32>,
    pub min_similarity: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FusionPatch {
    pub strategy: Option<FusionKind>,
    pub k_rrf: Option<f64>,
    pub weights: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BoostPatch {
    pub enabled: Option<bool>,
    pub keywords: Option<Vec<String>>,
    pub currency_symbols: Option<Vec<String>>,
    pub amount_bonus: Option<f64>,
    pub exact_match_bonus: Option<f64>,
    pub max_bonus_fraction: Option<f64>,
    pub scan_text_fallback: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CachePatch {
    pub enabled: Option<bool>,
    pub capacity: Option<usize>,
}

/// Parse `weighted` / `rrf`.
pub fn parse_fusion_kind(value: &str) -> Result<FusionKind> {
    match value.trim().to_lowercase().as_str() {
        "weighted" | "weighted_sum" | "weighted-sum" => Ok(FusionKind::Weighted),
        "rrf" | "reciprocal_rank" => Ok(FusionKind::Rrf),
        other => Err(NormError::Config(format!(
            "invalid fusion strategy {other} (expected weighted|rrf)"
        ))),
    }
}

/// Parse `name=value` pairs into a weights map.
pub fn parse_weights(values: &[String]) -> Result<BTreeMap<String, f64>> {
    let mut weights = BTreeMap::new();
    for entry in values {
        let (name, raw) = entry.split_once('=').ok_or_else(|| {
            NormError::Config(format!("invalid weight {entry} (expected name=value)"))
        })?;
        let value = raw.trim().parse::<f64>().map_err(|err| {
            NormError::Config(format!("invalid weight value for {}: {err}", name.trim()))
        })?;
        weights.insert(name.trim().to_string(), value);
    }
    Ok(weights)
}

struct EnvLookup<F>(F);

impl<F> EnvLookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        (self.0)(key).map(|value| {
            matches!(
                value.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match (self.0)(key) {
            Some(value) => value.trim().parse::<T>().map(Some).map_err(|err| {
                NormError::Config(format!("invalid {key} value {value}: {err}"))
            }),
            None => Ok(None),
        }
    }

    fn u32(&self, key: &str) -> Result<Option<u32>> {
        self.parsed(key)
    }

    fn u64(&self, key: &str) -> Result<Option<u64>> {
        self.parsed(key)
    }

    fn usize(&self, key: &str) -> Result<Option<usize>> {
        self.parsed(key)
    }

    fn f32(&self, key: &str) -> Result<Option<f32>> {
        self.parsed(key)
    }

    fn f64(&self, key: &str) -> Result<Option<f64>> {
        self.parsed(key)
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        (self.0)(key).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}
