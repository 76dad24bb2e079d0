//! Enrichment pipeline: fill every missing image slot in a content tree.
//!
//! Per slot: stock search → download into the cache → generative fallback →
//! deterministic placeholder. Slots that already hold a valid reference are
//! never touched, so running the pipeline twice is a no-op the second time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use pagekit_cache::AssetCache;
use pagekit_providers::{ProviderRegistry, SearchOptions, SearchOrchestrator};
use pagekit_shared::{
    AppConfig, CallBudget, ContentNode, ContentTree, ImageCandidate, Result, RunLimits,
    SectionKind, is_valid_image_ref,
};

use crate::downloader::Downloader;
use crate::generative::{GenerativeFallback, OpenAiImageGenerator};
use crate::plan::{Request, TaskPlan, plan_tree};
use crate::report::{EnrichmentReport, ReportEntry, SlotSource};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-run parameters.
#[derive(Debug, Clone)]
pub struct EnrichmentContext {
    /// Subject domain label, e.g. `"restaurant"`.
    pub domain: String,
    /// Subject (business) name.
    pub subject_name: String,
    pub limits: RunLimits,
}

impl EnrichmentContext {
    pub fn new(domain: impl Into<String>, subject_name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            subject_name: subject_name.into(),
            limits: RunLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for enrichment runs.
pub trait EnrichmentProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each task finishes (in completion order).
    fn task_progress(&self, current: usize, total: usize, detail: &str);
}

/// No-op enrichment progress.
pub struct SilentEnrichmentProgress;

impl EnrichmentProgress for SilentEnrichmentProgress {
    fn phase(&self, _name: &str) {}
    fn task_progress(&self, _current: usize, _total: usize, _detail: &str) {}
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Resolution {
    url: String,
    source: SlotSource,
}

/// Per-slot results of one task, parallel to `TaskPlan::slots`.
type Resolved = Vec<Option<Resolution>>;

#[derive(Debug, Clone, Copy)]
struct TaskFlags {
    generate: bool,
    download: bool,
}

/// Drives stock search, download, and generation over a content tree.
///
/// Cheap to clone; every collaborator is shared behind an `Arc`.
#[derive(Clone)]
pub struct Enricher {
    search: SearchOrchestrator,
    downloader: Option<Arc<Downloader>>,
    fallback: Option<Arc<GenerativeFallback>>,
}

impl Enricher {
    /// Stock search only: candidate URLs are written as-is and unfilled
    /// slots get placeholders.
    pub fn new(search: SearchOrchestrator) -> Self {
        Self {
            search,
            downloader: None,
            fallback: None,
        }
    }

    pub fn with_downloader(mut self, downloader: Arc<Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<GenerativeFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Wire providers, downloader, and (if enabled) the generator from config.
    ///
    /// Missing credentials are reported here, before any run starts.
    pub fn from_config(config: &AppConfig, cache: Arc<AssetCache>) -> Result<Self> {
        let registry = ProviderRegistry::from_config(config)?;
        if registry.is_empty() {
            warn!("no stock providers enabled; only generation and placeholders will be used");
        }

        let downloader = Downloader::new(
            cache.clone(),
            config.cache.max_download_bytes,
            &config.cache.public_url_prefix,
        )?;
        let mut enricher =
            Self::new(SearchOrchestrator::new(registry)).with_downloader(Arc::new(downloader));

        if config.generation.enabled {
            let generator = OpenAiImageGenerator::from_config(&config.generation)?
                .with_max_bytes(config.cache.max_download_bytes);
            enricher = enricher.with_fallback(Arc::new(GenerativeFallback::new(
                Arc::new(generator),
                cache,
                &config.cache.public_url_prefix,
            )?));
        }
        Ok(enricher)
    }

    /// Fill missing image slots in `tree`. Never fails: anything that cannot
    /// be resolved gets its placeholder.
    pub async fn enrich(&self, tree: &mut ContentTree, ctx: &EnrichmentContext) -> EnrichmentReport {
        self.enrich_with_progress(tree, ctx, &SilentEnrichmentProgress)
            .await
    }

    /// [`enrich`](Self::enrich) with progress callbacks.
    #[instrument(skip_all, fields(domain = %ctx.domain, sections = tree.sections.len()))]
    pub async fn enrich_with_progress(
        &self,
        tree: &mut ContentTree,
        ctx: &EnrichmentContext,
        progress: &dyn EnrichmentProgress,
    ) -> EnrichmentReport {
        let start = Instant::now();
        let mut report = EnrichmentReport::new();

        progress.phase("Planning image slots");
        let plans = plan_tree(tree, ctx);
        let slot_count: usize = plans.iter().map(|p| p.slots.len()).sum();
        info!(
            run_id = %report.run_id,
            tasks = plans.len(),
            slots = slot_count,
            "starting enrichment"
        );

        let budget = Arc::new(CallBudget::new(ctx.limits.max_external_calls));
        let (outcomes, timed_out) = if plans.is_empty() {
            (Vec::new(), false)
        } else {
            progress.phase("Resolving images");
            self.run_tasks(&plans, &ctx.limits, budget.clone(), progress)
                .await
        };

        progress.phase("Applying images");
        apply(tree, &plans, outcomes, &mut report);

        report.external_calls = budget.used();
        report.timed_out = timed_out;
        report.elapsed = start.elapsed();

        info!(
            run_id = %report.run_id,
            stock = report.stock_count(),
            generative = report.generative_count(),
            placeholder = report.placeholder_count(),
            external_calls = report.external_calls,
            timed_out = report.timed_out,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "enrichment complete"
        );
        report
    }

    /// Fan out one task per plan and collect results until done or the deadline.
    async fn run_tasks(
        &self,
        plans: &[TaskPlan],
        limits: &RunLimits,
        budget: Arc<CallBudget>,
        progress: &dyn EnrichmentProgress,
    ) -> (Vec<Option<Resolved>>, bool) {
        let mut outcomes: Vec<Option<Resolved>> = vec![None; plans.len()];

        let deadline = limits.deadline.map(|d| tokio::time::Instant::now() + d);
        if limits.deadline == Some(Duration::ZERO) {
            warn!("deadline is zero, skipping resolution");
            return (outcomes, true);
        }

        let flags = TaskFlags {
            generate: limits.generation_enabled,
            download: limits.download_assets,
        };
        let semaphore = Arc::new(Semaphore::new(limits.concurrency.max(1)));
        let mut set = JoinSet::new();

        for (index, plan) in plans.iter().enumerate() {
            let enricher = self.clone();
            let plan = plan.clone();
            let budget = budget.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, Vec::new());
                };
                (index, enricher.resolve(&plan, flags, &budget).await)
            });
        }

        let mut finished = 0;
        let mut timed_out = false;
        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => set.join_next().await,
            };

            match next {
                None => break,
                Some(Ok((index, resolved))) => {
                    finished += 1;
                    progress.task_progress(finished, plans.len(), &plans[index].node_id);
                    outcomes[index] = Some(resolved);
                }
                Some(Err(e)) => {
                    finished += 1;
                    warn!(error = %e, "enrichment task failed, its slots get placeholders");
                }
            }
        }

        if timed_out {
            warn!(abandoned = set.len(), "deadline reached, abandoning in-flight tasks");
            set.abort_all();
        }
        (outcomes, timed_out)
    }

    /// Resolve every slot of one task. Unresolved slots are `None`.
    #[instrument(skip_all, fields(node = %plan.node_id, kind = %plan.kind))]
    async fn resolve(&self, plan: &TaskPlan, flags: TaskFlags, budget: &CallBudget) -> Resolved {
        let mut resolved: Resolved = vec![None; plan.slots.len()];

        // Slots past `stock_hits` had no stock candidate and may be generated.
        let (stock_hits, prompt) = match &plan.request {
            Request::Stock {
                query,
                orientation,
                prompt,
            } => {
                let options = SearchOptions {
                    count: plan.slots.len(),
                    orientation: *orientation,
                };
                let candidates = distinct(self.search.search_within(query, &options, budget).await);
                let hits = candidates.len().min(plan.slots.len());

                for (slot_idx, candidate) in candidates.into_iter().take(hits).enumerate() {
                    let provenance = plan.provenance(plan.slots[slot_idx].item);
                    resolved[slot_idx] = self
                        .accept_stock(candidate, &provenance, flags, budget)
                        .await;
                }
                (hits, prompt)
            }
            Request::Portrait { prompt } => (0, prompt),
        };

        if stock_hits == plan.slots.len() {
            return resolved;
        }
        let Some(fallback) = self.fallback.as_ref().filter(|_| flags.generate) else {
            debug!("generation disabled, remaining slots get placeholders");
            return resolved;
        };

        for (slot_idx, slot) in plan.slots.iter().enumerate().skip(stock_hits) {
            let slot_prompt = match plan.kind {
                SectionKind::Gallery => format!("{prompt} (view {})", slot.item.map_or(1, |i| i + 1)),
                _ => prompt.clone(),
            };
            let provenance = plan.provenance(slot.item);
            match fallback
                .generate(&slot_prompt, plan.request.orientation(), &provenance, budget)
                .await
            {
                Ok(candidate) => {
                    resolved[slot_idx] = Some(Resolution {
                        url: candidate.url,
                        source: SlotSource::Generative,
                    });
                }
                Err(e) => {
                    warn!(item = ?slot.item, error = %e, "generation failed, using placeholder");
                }
            }
        }
        resolved
    }

    /// Turn a stock candidate into a slot value, downloading it when enabled.
    async fn accept_stock(
        &self,
        candidate: ImageCandidate,
        provenance: &str,
        flags: TaskFlags,
        budget: &CallBudget,
    ) -> Option<Resolution> {
        let source = SlotSource::Stock {
            provider: candidate.provider_name,
        };

        let Some(downloader) = self.downloader.as_ref().filter(|_| flags.download) else {
            return Some(Resolution {
                url: candidate.url,
                source,
            });
        };

        match downloader.fetch(&candidate, provenance, budget).await {
            Ok(entry) => Some(Resolution {
                url: downloader.public_url(&entry),
                source,
            }),
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "download failed, using placeholder");
                None
            }
        }
    }
}

/// Drop candidates whose URL was already seen, keeping rank order.
fn distinct(candidates: Vec<ImageCandidate>) -> Vec<ImageCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

/// Write results into the tree in document order; anything unresolved gets
/// its placeholder.
fn apply(
    tree: &mut ContentTree,
    plans: &[TaskPlan],
    outcomes: Vec<Option<Resolved>>,
    report: &mut EnrichmentReport,
) {
    let mut outcomes = outcomes.into_iter();

    for plan in plans {
        let mut resolved = outcomes.next().flatten().unwrap_or_default();
        resolved.resize(plan.slots.len(), None);

        let Some(section) = tree
            .sections
            .get_mut(plan.node_index)
            .and_then(ContentNode::as_section_mut)
        else {
            continue;
        };

        for (slot, resolution) in plan.slots.iter().zip(resolved) {
            let resolution = resolution
                .filter(|r| is_valid_image_ref(&r.url))
                .unwrap_or_else(|| Resolution {
                    url: slot.placeholder(),
                    source: SlotSource::Placeholder,
                });

            if section.set_image(slot.item, resolution.url.clone()) {
                report.entries.push(ReportEntry {
                    node_id: plan.node_id.clone(),
                    item: slot.item,
                    source: resolution.source,
                    url: resolution.url,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
