use crate::prelude::*;
use crate::store::{JsonDocument, Mutation};
use crate::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;
use teloxide::types::UserId;

/// Append-only set of users who ever started the bot. These are the
/// recipients of the broadcasts.
pub(crate) struct UserRegistry {
    doc: JsonDocument<BTreeSet<u64>>,
}

impl UserRegistry {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    /// Returns `true` if the user wasn't registered before
    pub(crate) async fn insert(&self, user: UserId) -> Result<bool> {
        let inserted = self
            .doc
            .update(|users| {
                if users.insert(user.0) {
                    Mutation::Commit(true)
                } else {
                    Mutation::Skip(false)
                }
            })
            .await?;

        if inserted {
            info!(user = user.0, "Registered a new user");
            metrics::increment_counter!("reelgate_registered_users_total");
        }

        Ok(inserted)
    }

    pub(crate) async fn all(&self) -> Result<Vec<UserId>> {
        Ok(self.doc.read().await?.into_iter().map_collect(UserId))
    }

    pub(crate) async fn len(&self) -> Result<usize> {
        Ok(self.doc.read().await?.len())
    }
}
