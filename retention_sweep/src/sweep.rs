//! The sweep loop: list a page, delete what expired, repeat until the
//! listing runs out.

use crate::{
    container::{self, ContainerClient},
    policy::RetentionPolicy,
};
use snafu::prelude::*;
use std::{fmt, io::Write, sync::Arc, time::Duration};
use sweep_time::{Time, TimeProvider};
use tracing::info;

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(context(false), display("{source}"))]
    Container { source: container::Error },

    #[snafu(display("Failed to write the sweep report: {source}"))]
    Report { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Counters and timestamps of one completed sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub start_time: Time,
    pub end_time: Time,
    /// Objects listed, i.e. the container size before the sweep.
    pub total: u64,
    pub deleted: u64,
}

impl SweepSummary {
    /// Objects left in the container after the sweep.
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.deleted)
    }

    pub fn elapsed(&self) -> Duration {
        self.end_time
            .checked_duration_since(self.start_time)
            .unwrap_or_default()
    }
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "------------------------------ SUMMARY ------------------------------"
        )?;
        writeln!(f, "DELETION COMPLETE - Total Deleted: {}", self.deleted)?;
        writeln!(f, "DELETION START TIME: {}", self.start_time)?;
        writeln!(f, "DELETION END TIME: {}", self.end_time)?;
        writeln!(f, "Total Number of Blobs before Deletion: {}", self.total)?;
        writeln!(
            f,
            "Total Number of Blobs after Deletion: {}",
            self.remaining()
        )?;
        write!(
            f,
            "Total Time Elapsed - {}",
            humantime::format_duration(self.elapsed())
        )
    }
}

/// Deletes every object in one container that is older than the retention
/// window.
///
/// Each run walks the whole container once. The cutoff is taken from the
/// time provider for every page, so a long run deletes with a slightly later
/// cutoff towards its end.
#[derive(Debug)]
pub struct Sweeper {
    container: Arc<dyn ContainerClient>,
    time_provider: Arc<dyn TimeProvider>,
    policy: RetentionPolicy,
}

impl Sweeper {
    pub fn new(container: Arc<dyn ContainerClient>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            container,
            time_provider,
            policy: RetentionPolicy::default(),
        }
    }

    /// Run one sweep, writing the per-page lines, the deletion lines and the
    /// summary block to `out`.
    ///
    /// Any listing or deletion failure ends the sweep; objects deleted before
    /// it stay deleted.
    pub async fn run<W: Write + Send>(&self, out: &mut W) -> Result<SweepSummary> {
        self.run_since(self.time_provider.now(), out).await
    }

    /// [`Self::run`] for a sweep whose start was taken earlier, before the
    /// container was connected. The summary reports `start_time` and measures
    /// the elapsed time from it.
    pub async fn run_since<W: Write + Send>(
        &self,
        start_time: Time,
        out: &mut W,
    ) -> Result<SweepSummary> {
        let mut token = None;
        let mut total = 0_u64;
        let mut deleted = 0_u64;

        loop {
            let page = self.container.list_page(token).await?;
            token = page.next;

            let cutoff = self.policy.cutoff(self.time_provider.now());
            let listed = page.objects.len() as u64;
            let (expired, _retained) = self.policy.partition(page.objects, cutoff);

            info!(listed, expired = expired.len(), %cutoff, "Swept page");
            writeln!(out, "Total - {listed} - vs To Be Deleted - {}", expired.len())
                .context(ReportSnafu)?;

            for object in &expired {
                info!(location = %object.location, last_modified = %object.last_modified, "Deleting");
                self.container.delete_object(&object.location).await?;
                writeln!(
                    out,
                    " -   DELETED - {} - LastModified: {}",
                    object.location, object.last_modified
                )
                .context(ReportSnafu)?;
            }

            total += listed;
            deleted += expired.len() as u64;
            debug_assert!(deleted <= total);

            if token.is_none() {
                break;
            }
        }

        let summary = SweepSummary {
            start_time,
            end_time: self.time_provider.now(),
            total,
            deleted,
        };
        info!(
            total,
            deleted,
            remaining = summary.remaining(),
            elapsed = %humantime::format_duration(summary.elapsed()),
            "Sweep complete"
        );
        writeln!(out, "\n\n{summary}").context(ReportSnafu)?;

        Ok(summary)
    }
}
