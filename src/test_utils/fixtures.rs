//! Fixture corpus and stand-in retrievers.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::corpus::{CorpusEntry, InMemoryCorpus};
use crate::error::{NormError, Result};
use crate::search::retriever::{QueryInput, RawResult, Retriever};

/// Entry ids in [`directive_corpus`].
pub mod ids {
    pub const VIATICOS_MONTO: &str = "dir-001-art-5";
    pub const VIATICOS_RENDICION: &str = "dir-001-art-6";
    pub const VIATICOS_DEFINICION: &str = "dir-001-art-4";
    pub const PASAJES: &str = "dir-002-art-3";
    pub const VIATICOS_EXTERIOR: &str = "dir-002-art-7";
    pub const BIENES: &str = "dir-003-art-2";
}

/// Small corpus of travel-expense and asset directives.
pub fn directive_entries() -> Vec<CorpusEntry> {
    vec![
        CorpusEntry::new(
            ids::VIATICOS_DEFINICION,
            "Los viáticos comprenden la asignación diaria que se otorga al comisionado. \
             El monto de viáticos diario cubre alimentación, hospedaje y movilidad local, \
             y el monto máximo se fija por día de comisión.",
        )
        .with_section("Artículo 4. Definición de viáticos")
        .with_source("Directiva 001-2023-OGA"),
        CorpusEntry::new(
            ids::VIATICOS_MONTO,
            "El monto máximo por concepto de viáticos para comisiones de servicio en el \
             territorio nacional es de S/ 320.00 por día.",
        )
        .with_section("Artículo 5. Escala de viáticos")
        .with_source("Directiva 001-2023-OGA")
        .with_amount("320.00"),
        CorpusEntry::new(
            ids::VIATICOS_RENDICION,
            "La rendición de cuentas de los viáticos otorgados se presenta en un plazo \
             máximo de diez días hábiles contados desde el retorno de la comisión.",
        )
        .with_section("Artículo 6. Rendición de cuentas")
        .with_source("Directiva 001-2023-OGA"),
        CorpusEntry::new(
            ids::PASAJES,
            "Los pasajes aéreos se adquieren en clase económica para todo el personal, \
             con una anticipación mínima de siete días.",
        )
        .with_section("Artículo 3. Pasajes")
        .with_source("Directiva 002-2023-OGA"),
        CorpusEntry::new(
            ids::VIATICOS_EXTERIOR,
            "Para comisiones de servicio al exterior la asignación por viáticos es de \
             US$ 370.00 diarios según la zona geográfica.",
        )
        .with_section("Artículo 7. Viáticos internacionales")
        .with_source("Directiva 002-2023-OGA")
        .with_amount("370.00"),
        CorpusEntry::new(
            ids::BIENES,
            "El inventario de bienes patrimoniales se realiza una vez al año bajo \
             responsabilidad de la comisión de inventario.",
        )
        .with_section("Artículo 2. Inventario")
        .with_source("Directiva 003-2024-OGA"),
    ]
}

pub fn directive_corpus() -> InMemoryCorpus {
    // ids above are unique
    InMemoryCorpus::new(directive_entries()).unwrap_or_default()
}

/// The fixture corpus serialized as the JSON the CLI reads.
pub fn directive_corpus_json() -> String {
    serde_json::to_string_pretty(&directive_entries()).unwrap_or_default()
}

/// Temporary directory holding a corpus file and, optionally, a config file.
pub struct CorpusFixture {
    pub temp_dir: TempDir,
    pub corpus_path: PathBuf,
}

impl CorpusFixture {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let corpus_path = temp_dir.path().join("corpus.json");
        std::fs::write(&corpus_path, directive_corpus_json())?;
        println!("[FIXTURE] Wrote corpus: {}", corpus_path.display());
        Ok(Self {
            temp_dir,
            corpus_path,
        })
    }

    /// Write a config file next to the corpus.
    pub fn write_config(&self, content: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join("config.toml");
        std::fs::write(&path, content)?;
        println!("[FIXTURE] Wrote config: {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }
}

impl Drop for CorpusFixture {
    fn drop(&mut self) {
        println!("[FIXTURE] Cleaning up {}", self.temp_dir.path().display());
    }
}

/// Returns a fixed list, truncated to `k`.
#[derive(Debug, Clone)]
pub struct StaticRetriever {
    name: String,
    results: Vec<(String, f64)>,
}

impl StaticRetriever {
    pub fn new(name: &str, results: &[(&str, f64)]) -> Self {
        Self {
            name: name.to_string(),
            results: results
                .iter()
                .map(|(id, score)| ((*id).to_string(), *score))
                .collect(),
        }
    }
}

impl Retriever for StaticRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn retrieve(&self, _query: &QueryInput, k: usize) -> Result<Vec<RawResult>> {
        Ok(self
            .results
            .iter()
            .take(k)
            .map(|(entry_id, raw_score)| RawResult {
                entry_id: entry_id.clone(),
                raw_score: *raw_score,
                retriever: self.name.clone(),
            })
            .collect())
    }
}

/// Always reports its index as missing.
#[derive(Debug, Clone)]
pub struct FailingRetriever {
    name: String,
}

impl FailingRetriever {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Retriever for FailingRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn retrieve(&self, _query: &QueryInput, _k: usize) -> Result<Vec<RawResult>> {
        Err(NormError::unavailable(&self.name, "index not loaded"))
    }
}

/// Sleeps before answering with an inner static list.
///
/// By default it naps in short slices and gives up once the query is
/// cancelled; [`SlowRetriever::ignoring_cancel`] makes it sleep through.
#[derive(Debug, Clone)]
pub struct SlowRetriever {
    inner: StaticRetriever,
    delay: Duration,
    honors_cancel: bool,
}

impl SlowRetriever {
    const NAP: Duration = Duration::from_millis(5);

    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            inner: StaticRetriever::new(name, &[]),
            delay,
            honors_cancel: true,
        }
    }

    #[must_use]
    pub fn with_results(mut self, results: &[(&str, f64)]) -> Self {
        self.inner = StaticRetriever::new(&self.inner.name, results);
        self
    }

    #[must_use]
    pub fn ignoring_cancel(mut self) -> Self {
        self.honors_cancel = false;
        self
    }
}

impl Retriever for SlowRetriever {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn retrieve(&self, query: &QueryInput, k: usize) -> Result<Vec<RawResult>> {
        if !self.honors_cancel {
            thread::sleep(self.delay);
            return self.inner.retrieve(query, k);
        }

        let started = Instant::now();
        while started.elapsed() < self.delay {
            query.cancel.check(self.name())?;
            thread::sleep(Self::NAP.min(self.delay.saturating_sub(started.elapsed())));
        }
        self.inner.retrieve(query, k)
    }
}

/// Panics on every query.
#[derive(Debug, Clone)]
pub struct PanickingRetriever {
    name: String,
}

impl PanickingRetriever {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Retriever for PanickingRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    fn retrieve(&self, _query: &QueryInput, _k: usize) -> Result<Vec<RawResult>> {
        panic!("{} retriever exploded", self.name)
    }
}
