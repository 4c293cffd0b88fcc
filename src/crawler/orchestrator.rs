//! Phase orchestrator: the crawl's only scheduler
//!
//! Phases are drawn in order from a mutable worklist owned here.
//! RUNNING spawns one fetch pool and one parse stage per phase, seeds
//! the frontier (phase sources plus sources forwarded from the previous
//! phase), and detects exhaustion via the frontier's accounting. A
//! repeating phase is re-appended to the tail of the worklist with its
//! bounded counter decremented. No other component schedules phases.

use crate::crawler::engine;
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::parser::ParseStage;
use crate::crawler::pool::FetchPool;
use crate::crawler::transforms::{TransformFn, TransformRegistry};
use crate::frontier::{Admission, Frontier};
use crate::model::{EngineKind, Phase, ScrapeModel, SinkKind, SinkTarget, Source, Value};
use crate::storage::{Sink, SinkRegistry};
use crate::{ConfigError, LoomError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Registry name of the built-in HTTP fetcher
pub const DEFAULT_FETCHER: &str = "http";

/// Bounded wait on an empty parse queue before re-checking exhaustion,
/// tolerating slow fetch workers
const PARSE_WAIT: Duration = Duration::from_millis(250);

/// Parse queue depth between the fetch pool and the parse stage
const PARSE_QUEUE_DEPTH: usize = 64;

/// Outcome of one phase
#[derive(Debug, Clone, Default)]
pub struct PhaseReport {
    pub name: String,
    /// Documents parsed
    pub documents: u64,
    /// Records emitted to sinks
    pub records: u64,
    /// Derived sources admitted to the frontier
    pub spawned: u64,
    /// Sources handed to the next phase
    pub forwarded: usize,
    /// Sources discarded by required-template resets
    pub discarded: usize,
}

/// Outcome of a whole crawl
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub phases: Vec<PhaseReport>,
}

impl CrawlReport {
    pub fn total_records(&self) -> u64 {
        self.phases.iter().map(|p| p.records).sum()
    }
}

/// Runs a scrape model to completion
pub struct Orchestrator {
    model: ScrapeModel,
    sinks: Arc<SinkRegistry>,
    fetchers: HashMap<String, Arc<dyn Fetcher>>,
    transforms: TransformRegistry,
}

impl Orchestrator {
    /// Builds the sink registry and the default fetcher for a model.
    pub fn new(model: ScrapeModel) -> Result<Self, LoomError> {
        let sinks = Arc::new(SinkRegistry::build(&model)?);

        let user_agent = format!(
            "loomcrawl/{} (+model {})",
            env!("CARGO_PKG_VERSION"),
            model.name
        );
        let mut fetchers: HashMap<String, Arc<dyn Fetcher>> = HashMap::new();
        fetchers.insert(
            DEFAULT_FETCHER.to_string(),
            Arc::new(HttpFetcher::new(&user_agent)?),
        );

        Ok(Self {
            model,
            sinks,
            fetchers,
            transforms: TransformRegistry::with_builtins(),
        })
    }

    /// Registers (or replaces) a fetcher implementation by name.
    pub fn with_fetcher(mut self, name: &str, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetchers.insert(name.to_string(), fetcher);
        self
    }

    /// Extends the transform vocabulary available to templates.
    pub fn with_transform(mut self, name: &str, func: TransformFn) -> Self {
        self.transforms.register(name, func);
        self
    }

    /// The sink bound for a backend kind, if any template declared it.
    pub fn sink(&self, kind: SinkKind) -> Option<Arc<dyn Sink>> {
        self.sinks.get(kind)
    }

    /// Runs every phase to completion and returns the crawl report.
    ///
    /// Configuration errors at phase start (bad selector, unknown
    /// transform or fetcher) abort that phase only; the worklist
    /// continues.
    pub async fn run(self) -> Result<CrawlReport, LoomError> {
        tracing::info!(model = %self.model.name, "starting crawl");

        let mut worklist: VecDeque<Phase> = self.model.phases.clone().into();
        let mut forwarded: Vec<Source> = Vec::new();
        let mut prev_parser: Option<EngineKind> = None;
        let mut report = CrawlReport::default();

        while let Some(phase) = worklist.pop_front() {
            if !phase.active {
                tracing::info!(phase = %phase.name, "skipping inactive phase");
                continue;
            }

            // reuse the prior phase's parser kind when unspecified
            let parser_kind = match phase.parser.or(prev_parser) {
                Some(kind) => kind,
                None => {
                    tracing::error!(
                        "{}",
                        ConfigError::MissingParser(phase.name.clone())
                    );
                    continue;
                }
            };
            prev_parser = Some(parser_kind);

            let stage = match ParseStage::new(
                parser_kind,
                self.model.domain.clone(),
                &phase.templates,
                &self.transforms,
                self.sinks.clone(),
            ) {
                Ok(stage) => stage,
                Err(e) => {
                    tracing::error!(phase = %phase.name, "phase aborted: {}", e);
                    continue;
                }
            };

            let fetcher = match self.resolve_fetcher(&phase) {
                Ok(fetcher) => fetcher,
                Err(e) => {
                    tracing::error!(phase = %phase.name, "phase aborted: {}", e);
                    continue;
                }
            };

            tracing::info!(phase = %phase.name, "running phase");
            let phase_report = self
                .run_phase(&phase, stage, fetcher, &mut forwarded)
                .await;
            tracing::info!(
                phase = %phase.name,
                documents = phase_report.documents,
                records = phase_report.records,
                forwarded = phase_report.forwarded,
                "phase complete"
            );
            report.phases.push(phase_report);

            if phase.repeat > 0 {
                let mut again = phase.clone();
                again.repeat -= 1;
                tracing::info!(
                    phase = %again.name,
                    remaining = again.repeat,
                    "re-appending repeating phase"
                );
                worklist.push_back(again);
            }
        }

        tracing::info!(
            phases = report.phases.len(),
            records = report.total_records(),
            "crawl complete"
        );
        Ok(report)
    }

    /// Seeds the frontier, runs the fetch pool and the parse loop until
    /// the frontier is drained, and collects sources forwarded to the
    /// next phase.
    async fn run_phase(
        &self,
        phase: &Phase,
        stage: ParseStage,
        fetcher: Arc<dyn Fetcher>,
        forwarded: &mut Vec<Source>,
    ) -> PhaseReport {
        let frontier = Arc::new(Frontier::new());
        self.seed_frontier(phase, &frontier, std::mem::take(forwarded));

        let sink_targets: HashMap<String, SinkTarget> = phase
            .templates
            .iter()
            .filter_map(|t| t.sink.clone().map(|s| (t.name.clone(), s)))
            .collect();

        let (tx, mut rx) = mpsc::channel(PARSE_QUEUE_DEPTH);
        let n_workers = phase.n_workers.unwrap_or(self.model.num_workers).max(1);
        let pool = FetchPool::start(n_workers, fetcher, frontier.clone(), tx);

        let mut result = PhaseReport {
            name: phase.name.clone(),
            ..Default::default()
        };
        let start = std::time::Instant::now();

        loop {
            if frontier.is_drained() {
                break;
            }

            let received = tokio::time::timeout(PARSE_WAIT, rx.recv()).await;
            let (source, document) = match received {
                Ok(Some(pair)) => pair,
                Ok(None) => break,
                // timeout: the loop condition re-checks emptiness, so a
                // slow fetch worker only delays, never ends, the phase
                Err(_) => continue,
            };

            if !source.parse {
                frontier.mark_completed();
                continue;
            }

            let output = stage.parse(&source, &document);
            result.documents += 1;

            for record in &output.records {
                let Some(target) = sink_targets.get(&record.template) else {
                    continue;
                };
                let Some(sink) = self.sinks.for_target(target) else {
                    continue;
                };
                match sink.store(&target.collection, record) {
                    Ok(()) => result.records += 1,
                    Err(e) => {
                        tracing::warn!(
                            url = %record.url,
                            template = %record.template,
                            "failed to store record: {}",
                            e
                        );
                    }
                }
            }

            for new_source in output.sources {
                if frontier.enqueue(new_source) == Admission::Queued {
                    result.spawned += 1;
                }
            }
            frontier.mark_completed();

            if output.required_reset {
                let discarded = frontier.reset();
                result.discarded += discarded;
                tracing::warn!(
                    phase = %phase.name,
                    discarded,
                    "required template empty, frontier reset"
                );
            }

            if result.documents % 10 == 0 {
                let rate = result.documents as f64 / start.elapsed().as_secs_f64();
                tracing::info!(
                    phase = %phase.name,
                    documents = result.documents,
                    queued = frontier.queue_len(),
                    completed = frontier.completed(),
                    "progress: {:.2} docs/sec",
                    rate
                );
            }
        }

        pool.stop().await;

        *forwarded = frontier.take_forwarded();
        result.forwarded = forwarded.len();
        result
    }

    /// Seeds a phase: forwarded sources from the previous phase first,
    /// then the phase's own sources, with `synchronize` diffing both
    /// against URLs already present in the phase's sinks.
    fn seed_frontier(&self, phase: &Phase, frontier: &Frontier, forwarded: Vec<Source>) {
        let synced = if phase.synchronize {
            self.stored_urls(phase)
        } else {
            HashSet::new()
        };

        for mut source in forwarded {
            // deferred sources re-enter live scheduling in this phase
            source.active = true;
            source.url = engine::absolutize(&self.model.domain, &source.url);
            if synced.contains(&source.url) {
                continue;
            }
            frontier.enqueue(source);
        }

        for source in &phase.sources {
            if let Some(template_name) = &source.from_db {
                for seeded in self.sources_from_db(source, template_name) {
                    if synced.contains(&seeded.url) {
                        continue;
                    }
                    frontier.enqueue(seeded);
                }
                continue;
            }

            let mut source = source.clone();
            source.url = engine::absolutize(&self.model.domain, &source.url);
            if synced.contains(&source.url) {
                tracing::debug!(url = %source.url, "seed already stored, skipping");
                continue;
            }
            frontier.enqueue(source);
        }

        tracing::info!(
            phase = %phase.name,
            queued = frontier.queue_len(),
            "frontier seeded"
        );
    }

    /// URLs already stored across the phase's sink collections.
    fn stored_urls(&self, phase: &Phase) -> HashSet<String> {
        let mut urls = HashSet::new();
        for template in &phase.templates {
            let Some(target) = &template.sink else { continue };
            let Some(sink) = self.sinks.for_target(target) else {
                continue;
            };
            match sink.stored_urls(&target.collection) {
                Ok(stored) => urls.extend(stored),
                Err(e) => {
                    tracing::warn!(
                        template = %template.name,
                        "failed to list stored urls, synchronize skipped: {}",
                        e
                    );
                }
            }
        }
        urls
    }

    /// Seeds derived from records previously stored under a template:
    /// one source per record, carrying the record's attrs.
    fn sources_from_db(&self, proto: &Source, template_name: &str) -> Vec<Source> {
        let Some(template) = self.model.template(template_name) else {
            tracing::warn!(template = %template_name, "from-db names an unknown template");
            return Vec::new();
        };
        let Some(target) = &template.sink else {
            tracing::warn!(template = %template_name, "from-db template has no sink");
            return Vec::new();
        };
        let Some(sink) = self.sinks.for_target(target) else {
            return Vec::new();
        };

        let records = match sink.records(&target.collection) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(template = %template_name, "from-db read failed: {}", e);
                return Vec::new();
            }
        };

        records
            .into_iter()
            .map(|record| {
                let mut source = proto.clone();
                source.from_db = None;
                let url = record
                    .get("url")
                    .and_then(Value::render)
                    .unwrap_or_else(|| record.url.clone());
                source.url = engine::absolutize(&self.model.domain, &url);
                for attr in record.attrs {
                    source.set_attr(attr);
                }
                source
            })
            .collect()
    }

    fn resolve_fetcher(&self, phase: &Phase) -> Result<Arc<dyn Fetcher>, ConfigError> {
        let name = phase.fetcher.as_deref().unwrap_or(DEFAULT_FETCHER);
        self.fetchers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownFetcher(name.to_string()))
    }
}
