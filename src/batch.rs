//! Sequential batch runs over many channels.
//!
//! Channels are scraped one at a time with a jittered pause between them,
//! and every outcome is exported as soon as it lands so an interrupted run
//! keeps everything scraped so far.

use std::time::Duration;

use log::{error, info, warn};
use rand::Rng;

use crate::export::DataExporter;
use crate::scraper::ProfileScraper;

/// What a finished (or interrupted) batch did.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Channel URL paired with the error that stopped it.
    pub failures: Vec<(String, String)>,
    pub emails_found: usize,
    pub interrupted: bool,
}

pub struct BatchRunner {
    scraper: ProfileScraper,
    exporter: DataExporter,
    delay: Duration,
    filename: String,
}

impl BatchRunner {
    pub fn new(scraper: ProfileScraper, exporter: DataExporter) -> Self {
        Self {
            scraper,
            exporter,
            delay: Duration::from_secs(10),
            filename: "results".to_string(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Scrape every URL in order. Ctrl-C stops the batch cleanly with
    /// everything already exported.
    pub async fn run(&self, urls: &[String]) -> BatchSummary {
        self.run_with_shutdown(urls, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// As [`run`](Self::run), with an explicit shutdown signal. The signal
    /// is honored both mid-scrape and during the pause between profiles.
    pub async fn run_with_shutdown<F>(&self, urls: &[String], shutdown: F) -> BatchSummary
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut summary = BatchSummary {
            total: urls.len(),
            ..BatchSummary::default()
        };

        for (index, url) in urls.iter().enumerate() {
            info!("profile {}/{}: {url}", index + 1, urls.len());

            let outcome = tokio::select! {
                outcome = self.scraper.scrape_channel(url) => outcome,
                _ = &mut shutdown => {
                    warn!("interrupted, stopping batch");
                    summary.interrupted = true;
                    break;
                }
            };

            if outcome.record.email.is_some() {
                summary.emails_found += 1;
            }
            match &outcome.error {
                None => summary.succeeded += 1,
                Some(err) => summary.failures.push((url.clone(), err.to_string())),
            }

            if let Err(err) = self
                .exporter
                .export_both(std::slice::from_ref(&outcome.record), &self.filename)
            {
                error!("export of {url} failed: {err}");
            }

            if index + 1 < urls.len() && !self.delay.is_zero() {
                let pause = jittered(self.delay);
                info!("waiting {:.1}s before the next profile", pause.as_secs_f64());
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = &mut shutdown => {
                        warn!("interrupted, stopping batch");
                        summary.interrupted = true;
                        break;
                    }
                }
            }
        }

        summary
    }
}

/// Randomize a pause to 80-120% of its nominal value.
fn jittered(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.8..1.2);
    delay.mul_f64(factor)
}

impl BatchSummary {
    /// Operator-facing wrap-up lines.
    pub fn log(&self) {
        info!(
            "batch finished: {}/{} succeeded, {} email(s) found{}",
            self.succeeded,
            self.total,
            self.emails_found,
            if self.interrupted { " (interrupted)" } else { "" },
        );
        for (url, reason) in &self.failures {
            warn!("failed: {url}: {reason}");
        }
    }
}
