//! Per-user daily download counter. Counters implicitly reset at the local
//! midnight, because a counter of a previous day is treated as zero.

use crate::prelude::*;
use crate::store::{JsonDocument, Mutation};
use crate::Result;
use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::types::UserId;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    /// Max number of downloads per user per day
    pub(crate) daily_limit: u32,

    /// Give the slot back if the request didn't deliver anything
    #[serde(default)]
    pub(crate) refund_on_failure: bool,
}

pub(crate) trait Clock: Send + Sync {
    /// Current date in the local timezone of the bot
    fn today(&self) -> NaiveDate;
}

pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct QuotaEntry {
    pub(crate) date: NaiveDate,
    pub(crate) count: u32,
}

type QuotaDoc = BTreeMap<u64, QuotaEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QuotaDecision {
    Allowed { used: u32, limit: u32 },
    Denied { limit: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QuotaStats {
    pub(crate) active_users_today: usize,
    pub(crate) downloads_today: u64,
}

pub(crate) struct QuotaTracker {
    doc: JsonDocument<QuotaDoc>,
    limit: u32,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    pub(crate) fn new(path: impl Into<PathBuf>, limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            doc: JsonDocument::new(path),
            limit,
            clock,
        }
    }

    pub(crate) fn limit(&self) -> u32 {
        self.limit
    }

    /// Counts one more download for the user if the limit permits it.
    #[instrument(skip(self), fields(user = user.0))]
    pub(crate) async fn try_consume(&self, user: UserId) -> Result<QuotaDecision> {
        let today = self.clock.today();
        let limit = self.limit;

        let decision = self
            .doc
            .update(|doc| {
                let used = doc
                    .get(&user.0)
                    .filter(|entry| entry.date == today)
                    .map(|entry| entry.count)
                    .unwrap_or(0);

                if used >= limit {
                    return Mutation::Skip(QuotaDecision::Denied { limit });
                }

                let used = used + 1;
                doc.insert(user.0, QuotaEntry { date: today, count: used });

                Mutation::Commit(QuotaDecision::Allowed { used, limit })
            })
            .await?;

        debug!(?decision, "Quota checked");

        Ok(decision)
    }

    /// Returns the slot consumed by [`Self::try_consume`] today
    #[instrument(skip(self), fields(user = user.0))]
    pub(crate) async fn refund(&self, user: UserId) -> Result {
        let today = self.clock.today();

        let refunded = self
            .doc
            .update(|doc| match doc.get_mut(&user.0) {
                Some(entry) if entry.date == today && entry.count > 0 => {
                    entry.count -= 1;
                    Mutation::Commit(true)
                }
                _ => Mutation::Skip(false),
            })
            .await?;

        if refunded {
            info!("Refunded the download slot");
        }

        Ok(())
    }

    /// Number of downloads the user made today
    pub(crate) async fn usage(&self, user: UserId) -> Result<u32> {
        let today = self.clock.today();
        let doc = self.doc.read().await?;

        Ok(doc
            .get(&user.0)
            .filter(|entry| entry.date == today)
            .map(|entry| entry.count)
            .unwrap_or(0))
    }

    pub(crate) async fn stats(&self) -> Result<QuotaStats> {
        let today = self.clock.today();
        let doc = self.doc.read().await?;

        let todays = doc
            .values()
            .filter(|entry| entry.date == today && entry.count > 0);

        Ok(QuotaStats {
            active_users_today: todays.clone().count(),
            downloads_today: todays.map(|entry| u64::from(entry.count)).sum(),
        })
    }
}
