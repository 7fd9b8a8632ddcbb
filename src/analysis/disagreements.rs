//! Disagreement analysis over several coupling views.
//!
//! Every unordered pair of the analyzed universe is scored against every
//! pattern and the best matches are kept per pattern. Internally the views
//! are processed in sorted name order, so results computed for `a,b` are
//! reused for `b,a`; candidates are permuted back into the caller's view
//! order before they are returned.

use super::filter::{NodeFilter, NodeFilterMode, PairFilter};
use super::matcher::PairAnalyzer;
use super::views::ViewProvider;
use crate::core::{ElementId, ElementKind, Pattern};
use crate::distributed::{Master, MasterSettings, WorkerLauncher, WorkerSpec};
use crate::errors::{Error, Result};
use crate::graph::CouplingGraph;
use crate::progress::{global_bar, TEMPLATE_PAIRS};
use crate::results::{
    BoundedResultSet, ResultKey, ResultStore, DEFAULT_KEEP_SIZE, DEFAULT_TRIM_FACTOR,
};
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub keep_size: usize,
    /// Candidates with a lower effective support are dropped
    pub min_support: f64,
    pub trim_factor: usize,
    pub pair_filter: PairFilter,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            keep_size: DEFAULT_KEEP_SIZE,
            min_support: 0.0,
            trim_factor: DEFAULT_TRIM_FACTOR,
            pair_filter: PairFilter::default(),
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<()> {
        if self.keep_size == 0 {
            return Err(Error::Configuration("keep_size must be positive".into()));
        }
        if self.trim_factor == 0 {
            return Err(Error::Configuration("trim_factor must be positive".into()));
        }
        if !self.min_support.is_finite() || !(0.0..=1.0).contains(&self.min_support) {
            return Err(Error::Configuration(format!(
                "min_support must lie in [0, 1], got {}",
                self.min_support
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub enum ExecutionMode {
    /// Rayon over the rows of the pair triangle
    #[default]
    InProcess,
    Distributed {
        launcher: Arc<dyn WorkerLauncher>,
        settings: MasterSettings,
    },
}

impl std::fmt::Debug for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::InProcess => f.write_str("InProcess"),
            ExecutionMode::Distributed { settings, .. } => f
                .debug_struct("Distributed")
                .field("settings", settings)
                .finish(),
        }
    }
}

/// View order used for computation and persistence
struct CanonicalOrder {
    /// `order[k]` is the caller's index of the k-th sorted view
    order: Vec<usize>,
    /// `position[j]` is the sorted index of the caller's view `j`
    position: Vec<usize>,
}

impl CanonicalOrder {
    fn new(views: &[String]) -> Self {
        let mut order: Vec<usize> = (0..views.len()).collect();
        order.sort_by(|&a, &b| views[a].cmp(&views[b]).then(a.cmp(&b)));
        let mut position = vec![0; order.len()];
        for (k, &j) in order.iter().enumerate() {
            position[j] = k;
        }
        Self { order, position }
    }

    fn views(&self, views: &[String]) -> Vec<String> {
        self.order.iter().map(|&j| views[j].clone()).collect()
    }

    fn pattern(&self, pattern: &Pattern) -> Pattern {
        pattern.truncated(self.order.len()).permuted(&self.order)
    }

    /// Source error index for every fixed slot of `pattern` (caller order),
    /// given candidates computed for the canonical pattern
    fn error_order(&self, pattern: &Pattern) -> Vec<usize> {
        let mut canonical_fixed: Vec<usize> = pattern
            .truncated(self.order.len())
            .fixed_slots()
            .map(|(j, _)| self.position[j])
            .collect();
        let caller_fixed = canonical_fixed.clone();
        canonical_fixed.sort_unstable();
        caller_fixed
            .iter()
            .map(|k| canonical_fixed.binary_search(k).unwrap_or(0))
            .collect()
    }

    fn restore(&self, pattern: &Pattern, set: &mut BoundedResultSet) {
        let error_order = self.error_order(pattern);
        set.map_candidates(|c| c.reordered(&self.position, &error_order));
    }
}

/// Runs pattern analyses for one repository
pub struct DisagreementAnalyzer {
    repo: String,
    views: Arc<dyn ViewProvider>,
    filter: Arc<dyn NodeFilter>,
    store: Option<ResultStore>,
    settings: AnalysisSettings,
    mode: ExecutionMode,
    data_dir: PathBuf,
}

impl DisagreementAnalyzer {
    pub fn new(
        repo: impl Into<String>,
        views: Arc<dyn ViewProvider>,
        filter: Arc<dyn NodeFilter>,
    ) -> Self {
        Self {
            repo: repo.into(),
            views,
            filter,
            store: None,
            settings: AnalysisSettings::default(),
            mode: ExecutionMode::InProcess,
            data_dir: PathBuf::from("."),
        }
    }

    /// Reuse and persist results in `store`
    pub fn with_store(mut self, store: ResultStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Directory workers load their views from
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// One result set per pattern, in the order of `patterns`, with coupling
    /// vectors and errors in the order of `views`.
    pub fn analyze_disagreements(
        &self,
        views: &[String],
        patterns: &[Pattern],
        mode: NodeFilterMode,
    ) -> Result<Vec<BoundedResultSet>> {
        if views.is_empty() {
            return Err(Error::validation("at least one view is required"));
        }
        self.settings.validate()?;
        for pattern in patterns {
            pattern.validate()?;
            pattern.check_arity(views.len())?;
        }

        let canonical = CanonicalOrder::new(views);
        let canonical_views = canonical.views(views);
        let canonical_patterns: Vec<Pattern> =
            patterns.iter().map(|p| canonical.pattern(p)).collect();
        let keys: Vec<ResultKey> = canonical_patterns
            .iter()
            .map(|p| {
                ResultKey::new(&self.repo, &canonical_views, mode.as_str(), p.signature())
                    .with_parameters(
                        self.settings.keep_size,
                        self.settings.min_support,
                        self.settings.pair_filter.signature(),
                    )
            })
            .collect();

        let mut results: Vec<Option<BoundedResultSet>> = Vec::with_capacity(patterns.len());
        for key in &keys {
            let stored = match &self.store {
                Some(store) => store.load(key)?,
                None => None,
            };
            if stored.is_some() {
                log::info!("Reusing stored results for pattern [{}]", key.pattern);
            }
            results.push(stored);
        }

        let pending: Vec<usize> = (0..patterns.len())
            .filter(|&i| results[i].is_none())
            .collect();
        if !pending.is_empty() {
            let pending_patterns: Vec<Pattern> = pending
                .iter()
                .map(|&i| canonical_patterns[i].clone())
                .collect();
            let computed = self.compute(&canonical_views, &pending_patterns, mode)?;
            for (&i, mut set) in pending.iter().zip(computed) {
                set.trim();
                if let Some(store) = &self.store {
                    match store.export(&keys[i], &set) {
                        Ok(path) => log::debug!("Stored results at {:?}", path),
                        Err(e) => log::warn!("Failed to store results: {}", e),
                    }
                }
                results[i] = Some(set);
            }
        }

        results
            .into_iter()
            .zip(patterns)
            .map(|(set, pattern)| {
                let mut set = set.ok_or_else(|| {
                    Error::validation(format!("no result computed for {}", pattern))
                })?;
                canonical.restore(pattern, &mut set);
                Ok(set)
            })
            .collect()
    }

    fn compute(
        &self,
        views: &[String],
        patterns: &[Pattern],
        mode: NodeFilterMode,
    ) -> Result<Vec<BoundedResultSet>> {
        let graphs = views
            .iter()
            .map(|view| self.views.get(&self.repo, view))
            .collect::<Result<Vec<_>>>()?;
        let nodes = self.universe(&graphs, mode)?;
        let pair_filter = self.settings.pair_filter;
        if !pair_filter.is_unrestricted() && !has_admissible_pair(&nodes, &pair_filter) {
            return Err(Error::validation(format!(
                "no pairs of {} {} remain after the pair filter ({})",
                nodes.len(),
                mode,
                pair_filter.signature()
            )));
        }
        let analyzer = PairAnalyzer::new(graphs, patterns, self.settings.min_support)
            .with_pair_filter(pair_filter);
        log::info!(
            "Analyzing {} {} of {} against {} patterns",
            nodes.len(),
            mode,
            self.repo,
            patterns.len()
        );

        match &self.mode {
            ExecutionMode::InProcess => Ok(self.compute_in_process(&analyzer, &nodes)),
            ExecutionMode::Distributed { launcher, settings } => {
                let spec = WorkerSpec {
                    repo: self.repo.clone(),
                    views: views.to_vec(),
                    patterns: analyzer.patterns().to_vec(),
                    min_support: self.settings.min_support,
                    pair_filter,
                    keep_size: self.settings.keep_size,
                    trim_factor: self.settings.trim_factor,
                    data_dir: self.data_dir.clone(),
                };
                let sets = analyzer.empty_sets(self.settings.keep_size, self.settings.trim_factor);
                Master::new(settings.clone(), Arc::clone(launcher)).run(&nodes, &spec, sets)
            }
        }
    }

    /// Intersection of the views' known nodes, restricted by the filter
    fn universe(
        &self,
        graphs: &[Arc<dyn CouplingGraph>],
        mode: NodeFilterMode,
    ) -> Result<Vec<ElementId>> {
        let known: Vec<(&str, HashSet<ElementId>)> = graphs
            .iter()
            .filter_map(|g| g.node_set().map(|nodes| (g.name(), nodes)))
            .collect();
        let Some((_, first)) = known.first() else {
            return Err(Error::validation(format!(
                "none of the views of {} defines a node universe",
                self.repo
            )));
        };

        let universe: HashSet<ElementId> = first
            .iter()
            .filter(|node| known.iter().all(|(_, nodes)| nodes.contains(*node)))
            .cloned()
            .collect();
        for (name, nodes) in &known {
            log::info!(
                "View '{}': {} nodes, {} outside the common universe",
                name,
                nodes.len(),
                nodes.len() - universe.len()
            );
        }
        let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
        for node in &universe {
            let kind = match ElementKind::classify(node.as_str()) {
                ElementKind::Package => "packages",
                ElementKind::File => "files",
                ElementKind::Class => "classes",
                ElementKind::Method => "methods",
            };
            *kinds.entry(kind).or_default() += 1;
        }
        log::debug!("Common universe of {} nodes: {:?}", universe.len(), kinds);

        Ok(self.filter.filter_nodes(&universe, mode))
    }

    fn compute_in_process(
        &self,
        analyzer: &PairAnalyzer,
        nodes: &[ElementId],
    ) -> Vec<BoundedResultSet> {
        let keep_size = self.settings.keep_size;
        let trim_factor = self.settings.trim_factor;
        analyzer.warm_up(nodes);

        let bar = global_bar(nodes.len() as u64, TEMPLATE_PAIRS);
        bar.set_message("Analyzing pairs");
        let sets = (0..nodes.len())
            .into_par_iter()
            .progress_with(bar.clone())
            .fold(
                || analyzer.empty_sets(keep_size, trim_factor),
                |mut sets, i| {
                    for j in 0..i {
                        analyzer.analyze_into(&nodes[i], &nodes[j], &mut sets);
                    }
                    for set in sets.iter_mut().filter(|s| s.needs_trim()) {
                        set.trim();
                    }
                    sets
                },
            )
            .reduce(
                || analyzer.empty_sets(keep_size, trim_factor),
                |mut left, right| {
                    for (set, other) in left.iter_mut().zip(right) {
                        set.merge(other);
                        if set.needs_trim() {
                            set.trim();
                        }
                    }
                    left
                },
            );
        bar.finish_and_clear();
        sets
    }
}

fn has_admissible_pair(nodes: &[ElementId], filter: &PairFilter) -> bool {
    (0..nodes.len()).into_par_iter().any(|i| {
        nodes[..i]
            .iter()
            .any(|other| !nodes[i].is_related_to(other) && filter.admits(&nodes[i], other))
    })
}

impl std::fmt::Debug for DisagreementAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisagreementAnalyzer")
            .field("repo", &self.repo)
            .field("store", &self.store)
            .field("settings", &self.settings)
            .field("mode", &self.mode)
            .finish()
    }
}
