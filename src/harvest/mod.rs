//! The pagination state machine. Discovers the total page count from the
//! first page, accumulates records serially, and skips failing pages without
//! aborting the job. Every per-page failure is recorded as an observable
//! outcome; nothing escapes `run_job` as an error.

mod client;
mod error;

pub mod envelope;
pub mod request;

pub use client::{ApiClient, ApiClientBuilder, RetryPolicy};
pub use error::TransportError;

use crate::harvest::envelope::extract;
use crate::harvest::request::{Category, PageRequest};
use crate::model::{HarvestSummary, Record};
use serde_json::Value;

/// Seam between the harvester and the network. [ApiClient] is the production
/// implementation; tests script a fake.
pub trait PageSource {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<Value, TransportError>;
}

/// Parameters for one harvest job. `start_page` exists for manual resume: a
/// caller may note the last completed page of an earlier run and continue
/// from there.
#[derive(Debug, Clone)]
pub struct HarvestJob {
    pub category: Category,
    pub page_size: u32,
    pub start_page: u32,
    pub max_pages: Option<u32>,
}

impl HarvestJob {
    pub fn new(category: Category, page_size: u32) -> Self {
        Self {
            category,
            page_size,
            start_page: 1,
            max_pages: None,
        }
    }
}

/// What happened to one attempted page.
#[derive(Debug)]
pub enum PageOutcome {
    /// Page fetched and normalized; contributed this many records.
    Fetched(usize),
    /// Transport failed; page contributed nothing.
    TransportFailed(TransportError),
    /// Transport succeeded but normalization found no records.
    NoRecords,
}

impl PageOutcome {
    pub fn is_skip(&self) -> bool {
        !matches!(self, PageOutcome::Fetched(_))
    }
}

/// One attempted page and its outcome, in attempt order.
#[derive(Debug)]
pub struct PageReport {
    pub page: u32,
    pub outcome: PageOutcome,
}

/// Terminal state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStatus {
    /// The first page yielded records; the job ran to its last page.
    Done,
    /// The first page failed or was empty; the job holds no records.
    DoneEmpty,
}

/// Result of one job: always returned, never an error. `records` preserves
/// page order, then in-page order; a skipped page contributes zero records at
/// its position.
#[derive(Debug)]
pub struct HarvestOutcome {
    pub status: HarvestStatus,
    pub records: Vec<Record>,
    pub total_rows: u64,
    /// Page count discovered from the first envelope, after any `max_pages`
    /// cap. Fixed for the job's lifetime.
    pub total_pages: u32,
    pub pages: Vec<PageReport>,
    /// The raw first-page envelope, kept for diagnostic inspection.
    pub first_envelope: Option<Value>,
}

impl HarvestOutcome {
    fn empty(report: PageReport, first_envelope: Option<Value>) -> Self {
        Self {
            status: HarvestStatus::DoneEmpty,
            records: Vec::new(),
            total_rows: 0,
            total_pages: 0,
            pages: vec![report],
            first_envelope,
        }
    }

    pub fn summary(&self, category: Category) -> HarvestSummary {
        HarvestSummary {
            category: category.as_str().to_string(),
            attempted_pages: self.pages.len() as u32,
            skipped_pages: self.pages.iter().filter(|p| p.outcome.is_skip()).count() as u32,
            record_count: self.records.len(),
            total_rows: self.total_rows,
            total_pages: self.total_pages,
        }
    }
}

/// Run one harvest job to completion.
///
/// The first page is fetched to discover `total_pages`; a transport failure or
/// an empty first page terminates the job as [HarvestStatus::DoneEmpty]. Every
/// later page in `start_page+1 ..= total_pages` is attempted exactly once;
/// failures and empty pages are recorded as skips and the loop continues.
/// Pacing between requests is the source's concern (see [ApiClient]).
pub fn run_job<S: PageSource>(
    job: &HarvestJob,
    source: &mut S,
    progress: Option<&dyn Fn(u32, u32)>,
) -> HarvestOutcome {
    let first_request = PageRequest::new(job.category, job.start_page, job.page_size);
    let first_envelope = match source.fetch_page(&first_request) {
        Ok(envelope) => envelope,
        Err(e) => {
            return HarvestOutcome::empty(
                PageReport {
                    page: job.start_page,
                    outcome: PageOutcome::TransportFailed(e),
                },
                None,
            );
        }
    };

    let first_page = extract(&first_envelope);
    if first_page.records.is_empty() {
        return HarvestOutcome::empty(
            PageReport {
                page: job.start_page,
                outcome: PageOutcome::NoRecords,
            },
            Some(first_envelope),
        );
    }

    // total_pages is fixed here and never re-queried mid-job.
    let mut total_pages = first_page.total_pages;
    if let Some(cap) = job.max_pages {
        total_pages = total_pages.min(cap);
    }

    let mut records = first_page.records;
    let mut pages = vec![PageReport {
        page: job.start_page,
        outcome: PageOutcome::Fetched(records.len()),
    }];
    if let Some(p) = progress {
        p(1, total_pages.saturating_sub(job.start_page) + 1);
    }

    for page in job.start_page + 1..=total_pages {
        let request = PageRequest::new(job.category, page, job.page_size);
        let outcome = match source.fetch_page(&request) {
            Ok(envelope) => {
                let data = extract(&envelope);
                if data.records.is_empty() {
                    PageOutcome::NoRecords
                } else {
                    let fetched = data.records.len();
                    records.extend(data.records);
                    PageOutcome::Fetched(fetched)
                }
            }
            Err(e) => PageOutcome::TransportFailed(e),
        };
        pages.push(PageReport { page, outcome });
        if let Some(p) = progress {
            p(page - job.start_page + 1, total_pages - job.start_page + 1);
        }
    }

    HarvestOutcome {
        status: HarvestStatus::Done,
        records,
        total_rows: first_page.total_rows,
        total_pages,
        pages,
        first_envelope: Some(first_envelope),
    }
}
