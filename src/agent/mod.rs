//! The monitoring agent: collect on one timer, report on another.

pub mod aggregator;
pub mod reporter;
pub mod sources;

pub use aggregator::Aggregator;
pub use reporter::Reporter;
pub use sources::{RuntimeSource, SampleSource};

use crate::core::{AgentConfig, MetricaError, Result};
use std::sync::Arc;

/// Wires the aggregator, sources and reporter together and drives the two
/// periodic tasks. The tasks share nothing but the aggregator's table.
pub struct Agent {
    config: AgentConfig,
    aggregator: Arc<Aggregator>,
    reporter: Arc<Reporter>,
    sources: Vec<Arc<dyn SampleSource>>,
}

impl Agent {
    /// Builds an agent with the built-in runtime source. Fails on invalid
    /// configuration or an unusable encryption key.
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let reporter = Arc::new(Reporter::new(&config)?);
        Ok(Self {
            config,
            aggregator: Arc::new(Aggregator::new()),
            reporter,
            sources: vec![Arc::new(RuntimeSource::new())],
        })
    }

    /// Registers an additional sample source.
    pub fn with_source(mut self, source: Arc<dyn SampleSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    /// Runs the collection and reporting loops until ctrl-c.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            address = %self.config.address,
            poll_secs = self.config.poll_interval_secs,
            report_secs = self.config.report_interval_secs,
            rate_limit = self.config.rate_limit,
            "starting agent"
        );

        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut report = tokio::time::interval(self.config.report_interval());
        report.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = poll.tick() => self.collect_once(),
                _ = report.tick() => self.report_once(),
                result = &mut shutdown => {
                    if let Err(error) = result {
                        tracing::error!(%error, "cannot listen for shutdown signal");
                    }
                    tracing::info!("agent stopped");
                    return Ok(());
                }
            }
        }
    }

    /// One collection tick: every source feeds the aggregator.
    fn collect_once(&self) {
        for source in &self.sources {
            for sample in source.collect() {
                self.aggregator.record(&sample);
            }
        }
        tracing::debug!(metrics = self.aggregator.len(), "collected samples");
    }

    /// One reporting tick. The send runs on its own task holding a rate
    /// limit slot, so retries never stall the timers; a saturated tick is
    /// dropped and its data rides along in the next cycle.
    fn report_once(&self) {
        let permit = match self.reporter.try_begin_cycle() {
            Ok(permit) => permit,
            Err(MetricaError::RateLimited { limit }) => {
                tracing::warn!(limit, "rate limit exceeded, skipping report cycle");
                return;
            },
            Err(error) => {
                tracing::error!(%error, "cannot begin report cycle");
                return;
            },
        };

        let batch = self.aggregator.snapshot();
        let reporter = Arc::clone(&self.reporter);
        tokio::spawn(async move {
            if let Err(error) = reporter.send_cycle(&batch).await {
                tracing::error!(%error, category = error.category(), "report cycle failed");
            }
            drop(permit);
        });
    }
}
