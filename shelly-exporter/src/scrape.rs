//! Scrape orchestration: fetch every target, render, concatenate.

use std::fmt;

use futures::future::join_all;
use tracing::{debug, error};

use crate::client::ShellyClient;
use crate::error::TargetError;
use crate::model::Target;
use crate::process::{self, ProcessStatsSource};
use crate::render::{RenderedDevice, render_device, write_lines};

/// Outcome counts of one scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// Targets whose lines were written.
    pub succeeded: usize,
    /// Targets skipped because of an error.
    pub failed: usize,
    /// Optional fields missing across all written targets.
    pub skipped_fields: usize,
}

/// Immutable scrape pipeline, shared by all concurrent requests.
pub struct Exporter {
    client: ShellyClient,
    process: Box<dyn ProcessStatsSource>,
}

impl Exporter {
    pub fn new(client: ShellyClient, process: Box<dyn ProcessStatsSource>) -> Self {
        Self { client, process }
    }

    /// Fetch and render a single target.
    pub async fn scrape_target(&self, target: &Target) -> Result<RenderedDevice, TargetError> {
        let snapshot = self.client.fetch(target).await?;
        render_device(target, &snapshot).map_err(|e| TargetError::new(target.clone(), e))
    }

    /// Scrape all targets and write their lines, then the process lines.
    ///
    /// Targets are fetched concurrently but written in list order. A failed
    /// target is logged and contributes no lines.
    pub async fn scrape_into<W: fmt::Write>(
        &self,
        targets: &[Target],
        sink: &mut W,
    ) -> Result<ScrapeSummary, fmt::Error> {
        let results = join_all(targets.iter().map(|t| self.scrape_target(t))).await;
        let mut summary = ScrapeSummary::default();

        for result in results {
            match result {
                Ok(rendered) => {
                    write_lines(sink, &rendered.lines)?;
                    summary.succeeded += 1;
                    summary.skipped_fields += rendered.skipped.len();
                }
                Err(e) => {
                    error!(ip = %e.target, error = %e.source, "Failed to scrape target");
                    summary.failed += 1;
                }
            }
        }

        write_lines(sink, &process::collect_lines(self.process.as_ref()))?;

        debug!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped_fields = summary.skipped_fields,
            "Scrape finished"
        );

        Ok(summary)
    }

    /// Scrape into a fresh string.
    pub async fn scrape(&self, targets: &[Target]) -> (String, ScrapeSummary) {
        let mut body = String::new();
        // Writing into a String cannot fail.
        let summary = self
            .scrape_into(targets, &mut body)
            .await
            .unwrap_or_default();
        (body, summary)
    }
}
