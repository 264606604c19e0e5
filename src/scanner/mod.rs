//! Scan driver: applies every configured signature to every method of every
//! class in an application.

mod application;
mod feedback;

pub use application::Application;
pub use feedback::{CancellationToken, ScanContext, ScanFeedback};

use crate::bytecode::{BytecodeParser, ClassParser};
use crate::config::ScanConfig;
use crate::error::{HoundError, Result};
use crate::matcher::SequenceMatcher;
use crate::paths::{PathId, PathTable};
use crate::results::{DefaultSink, ResultSink, ScanResults, SplittingSink};
use crate::signatures::Signature;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub classes_scanned: usize,
    pub classes_failed: usize,
    pub detections: usize,
    pub cancelled: bool,
}

/// Whole-scan aggregate plus the share each class contributed.
#[derive(Debug, Clone)]
pub struct SplitResults {
    pub whole: ScanResults,
    pub per_class: BTreeMap<String, ScanResults>,
    pub summary: ScanSummary,
}

/// Signature scanner over application bundles
pub struct Scanner {
    signatures: Vec<Signature>,
    parser: Arc<dyn ClassParser>,
    config: ScanConfig,
}

/// Builder for configuring and creating Scanner instances
pub struct ScannerBuilder {
    config: ScanConfig,
    signatures: Vec<Signature>,
    parser: Arc<dyn ClassParser>,
}

impl ScannerBuilder {
    /// Create a new scanner builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
            signatures: Vec::new(),
            parser: Arc::new(BytecodeParser::new()),
        }
    }

    #[must_use]
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signatures.push(signature);
        self
    }

    #[must_use]
    pub fn signatures<I: IntoIterator<Item = Signature>>(mut self, signatures: I) -> Self {
        self.signatures.extend(signatures);
        self
    }

    /// Replace the class-file decoder
    #[must_use]
    pub fn parser(mut self, parser: Arc<dyn ClassParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Set maximum class size to scan
    #[must_use]
    pub fn max_class_size(mut self, max_class_size: usize) -> Self {
        self.config.max_class_size = max_class_size;
        self
    }

    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    #[must_use]
    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.config.max_threads = max_threads;
        self
    }

    /// Use a custom configuration
    pub fn config(mut self, config: ScanConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn build(self) -> Result<Scanner> {
        self.config.validate()?;
        if self.signatures.is_empty() {
            warn!("Scanner built without signatures, scans will report nothing");
        }
        Ok(Scanner { signatures: self.signatures, parser: self.parser, config: self.config })
    }
}

impl Default for ScannerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    #[must_use]
    pub fn builder() -> ScannerBuilder {
        ScannerBuilder::new()
    }

    pub fn new(signatures: Vec<Signature>) -> Result<Self> {
        ScannerBuilder::new().signatures(signatures).build()
    }

    pub fn with_config(signatures: Vec<Signature>, config: ScanConfig) -> Result<Self> {
        ScannerBuilder::new().signatures(signatures).config(config)?.build()
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn scan(&self, app: &Application) -> Result<ScanResults> {
        self.scan_with(app, &ScanContext::new())
    }

    /// Scan with feedback and/or cancellation. A cancelled scan returns what
    /// was found before the stop.
    pub fn scan_with(&self, app: &Application, ctx: &ScanContext<'_>) -> Result<ScanResults> {
        let mut sink = DefaultSink::new(Arc::new(PathTable::new()));
        self.scan_into(app, ctx, &mut sink)?;
        Ok(sink.finalize())
    }

    /// Scan into a caller-owned sink. Only pool setup can fail; per-class
    /// failures are reported to feedback and counted in the summary.
    pub fn scan_into<S: ResultSink + ?Sized>(
        &self,
        app: &Application,
        ctx: &ScanContext<'_>,
        sink: &mut S,
    ) -> Result<ScanSummary> {
        let paths = Arc::clone(sink.paths());
        let source = paths.source(app.id());
        self.start(app, ctx);

        let summary = if self.config.parallel {
            self.scan_parallel(app, ctx, source, sink)?
        } else {
            let mut summary = ScanSummary::default();
            for (name, bytes) in app.classes() {
                if ctx.is_cancelled() {
                    summary.cancelled = true;
                    break;
                }
                let outcome = self.scan_class(ctx, source, name, bytes, sink);
                summary.absorb(outcome);
            }
            summary
        };

        self.finish(app, ctx, &summary);
        Ok(summary)
    }

    /// Like [`Scanner::scan_with`], additionally returning each class's own
    /// detections.
    pub fn scan_split(&self, app: &Application, ctx: &ScanContext<'_>) -> SplitResults {
        let mut whole = DefaultSink::new(Arc::new(PathTable::new()));
        let source = whole.paths().source(app.id());
        let mut per_class = BTreeMap::new();
        let mut summary = ScanSummary::default();
        self.start(app, ctx);

        for (name, bytes) in app.classes() {
            if ctx.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let mut split = SplittingSink::new(&mut whole);
            let outcome = self.scan_class(ctx, source, name, bytes, &mut split);
            per_class.insert(name.clone(), split.finalize());
            summary.absorb(outcome);
        }

        self.finish(app, ctx, &summary);
        SplitResults { whole: whole.finalize(), per_class, summary }
    }

    fn scan_parallel<S: ResultSink + ?Sized>(
        &self,
        app: &Application,
        ctx: &ScanContext<'_>,
        source: PathId,
        sink: &mut S,
    ) -> Result<ScanSummary> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_threads)
            .build()
            .map_err(|e| HoundError::configuration(format!("failed to start scan workers: {}", e)))?;
        let paths = Arc::clone(sink.paths());
        let classes: Vec<(&String, &Vec<u8>)> = app.classes().iter().collect();

        let partials: Vec<Option<(ClassOutcome, ScanResults)>> = pool.install(|| {
            classes
                .par_iter()
                .map(|(name, bytes)| {
                    if ctx.is_cancelled() {
                        return None;
                    }
                    let mut local = DefaultSink::new(Arc::clone(&paths));
                    let outcome = self.scan_class(ctx, source, name, bytes, &mut local);
                    Some((outcome, local.finalize()))
                })
                .collect()
        });

        let mut summary = ScanSummary::default();
        for partial in partials {
            let Some((outcome, results)) = partial else {
                summary.cancelled = true;
                continue;
            };
            for detection in results.detections() {
                sink.record(Arc::clone(detection));
            }
            summary.absorb(outcome);
        }
        Ok(summary)
    }

    /// Scan one class, isolating any failure to it.
    fn scan_class<S: ResultSink + ?Sized>(
        &self,
        ctx: &ScanContext<'_>,
        source: PathId,
        name: &str,
        bytes: &[u8],
        sink: &mut S,
    ) -> ClassOutcome {
        if let Some(feedback) = ctx.feedback() {
            feedback.on_class_start(name);
        }
        match self.match_class(ctx, source, name, bytes, sink) {
            Ok((detections, cancelled)) => {
                debug!("{}: {} detections", name, detections);
                if let Some(feedback) = ctx.feedback() {
                    feedback.on_class_complete(name, detections);
                }
                ClassOutcome::Scanned { detections, cancelled }
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!("Skipping class {}: {}", name, e);
                } else {
                    warn!("Unexpected error scanning class {}: {}", name, e);
                }
                if let Some(feedback) = ctx.feedback() {
                    feedback.on_class_failure(name, &e);
                }
                ClassOutcome::Failed
            }
        }
    }

    /// Returns the detection count and whether cancellation cut the class short.
    fn match_class<S: ResultSink + ?Sized>(
        &self,
        ctx: &ScanContext<'_>,
        source: PathId,
        name: &str,
        bytes: &[u8],
        sink: &mut S,
    ) -> Result<(usize, bool)> {
        if bytes.len() > self.config.max_class_size {
            return Err(HoundError::class_too_large(name, bytes.len(), self.config.max_class_size));
        }
        // Malformed classes may crash a plugged-in parser
        let parsed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.parser.parse(bytes)))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("class parser panicked")));
        let class = parsed.map_err(|e| HoundError::class_parse(name, e))?;
        if class.name != name {
            debug!("class stored as {} declares itself as {}", name, class.name);
        }

        let paths = Arc::clone(sink.paths());
        let class_path = paths.class(source, name);
        let mut detections = 0;
        for method in &class.methods {
            let method_path = paths.method(class_path, &method.name, &method.descriptor);
            for signature in &self.signatures {
                if ctx.is_cancelled() {
                    return Ok((detections, true));
                }
                for (variant, entries) in signature.variants() {
                    let matcher = SequenceMatcher::new(signature.archetype(), variant, entries);
                    detections += matcher.run(method_path, &method.instructions, sink);
                }
            }
        }
        Ok((detections, false))
    }

    fn start(&self, app: &Application, ctx: &ScanContext<'_>) {
        info!(
            "Scanning {} ({} classes) with {} signatures",
            app.id(),
            app.class_count(),
            self.signatures.len()
        );
        if let Some(feedback) = ctx.feedback() {
            feedback.on_scan_start(app.class_count());
        }
    }

    fn finish(&self, app: &Application, ctx: &ScanContext<'_>, summary: &ScanSummary) {
        if summary.cancelled {
            info!(
                "Scan of {} cancelled after {} classes: {} detections",
                app.id(),
                summary.classes_scanned,
                summary.detections
            );
        } else {
            info!(
                "Scan of {} completed: {} classes scanned, {} failed, {} detections",
                app.id(),
                summary.classes_scanned,
                summary.classes_failed,
                summary.detections
            );
        }
        if let Some(feedback) = ctx.feedback() {
            feedback.on_scan_complete(summary.cancelled);
        }
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("signatures", &self.signatures.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

enum ClassOutcome {
    Scanned { detections: usize, cancelled: bool },
    Failed,
}

impl ScanSummary {
    fn absorb(&mut self, outcome: ClassOutcome) {
        match outcome {
            ClassOutcome::Scanned { detections, cancelled } => {
                self.classes_scanned += 1;
                self.detections += detections;
                self.cancelled |= cancelled;
            }
            ClassOutcome::Failed => self.classes_failed += 1,
        }
    }
}
