//! Phase: one scheduling unit of a crawl
//!
//! Phases form an ordered worklist owned by the orchestrator. A phase
//! bundles its seed sources, the templates applied to every fetched
//! document, and the worker count for its fetch pool.

use crate::model::{Source, Template};

/// Document parser kind for a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Html,
    Json,
    Text,
}

impl EngineKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "html" => Some(Self::Html),
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// One scheduling unit
#[derive(Debug, Clone)]
pub struct Phase {
    pub name: String,

    /// Inactive phases are skipped entirely
    pub active: bool,

    /// Fetch pool size; falls back to the model-level worker count
    pub n_workers: Option<usize>,

    /// How many more times this phase re-enters the schedule after
    /// completing. The repeated phase is appended to the tail of the
    /// worklist, so other phases run in between.
    pub repeat: u32,

    /// Diff seed URLs against already-stored URLs before enqueuing
    pub synchronize: bool,

    pub sources: Vec<Source>,

    /// Parser kind; `None` reuses the previous phase's parser
    pub parser: Option<EngineKind>,

    /// Named fetcher implementation; `None` uses the default
    pub fetcher: Option<String>,

    pub templates: Vec<Template>,
}

impl Phase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            n_workers: None,
            repeat: 0,
            synchronize: false,
            sources: Vec::new(),
            parser: None,
            fetcher: None,
            templates: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_templates(mut self, templates: Vec<Template>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_parser(mut self, kind: EngineKind) -> Self {
        self.parser = Some(kind);
        self
    }
}

/// A complete scrape model: the in-memory configuration the engine runs
#[derive(Debug, Clone)]
pub struct ScrapeModel {
    pub name: String,

    /// Base URL that relative source and discovered URLs resolve against
    pub domain: String,

    /// Default fetch pool size for phases that do not set their own
    pub num_workers: usize,

    /// Path for the sqlite sink, when any template declares one
    pub database_path: Option<String>,

    pub phases: Vec<Phase>,
}

impl ScrapeModel {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            num_workers: 1,
            database_path: None,
            phases: Vec::new(),
        }
    }

    pub fn with_phases(mut self, phases: Vec<Phase>) -> Self {
        self.phases = phases;
        self
    }

    /// Finds a template definition by name across all phases.
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.phases
            .iter()
            .flat_map(|p| p.templates.iter())
            .find(|t| t.name == name)
    }
}
