use crate::prelude::*;
use crate::quota::{QuotaDecision, QuotaTracker};
use crate::tg::ChatTransport;
use crate::Result;
use std::sync::Arc;
use teloxide::types::{ChatId, UserId};

/// Reasons to refuse serving the user. These are expected in normal
/// operation and are shown to the user as is.
#[derive(Debug, thiserror::Error)]
pub(crate) enum AccessError {
    #[error("You need to join our channel to use this bot: {invite_link}")]
    NotAMember { invite_link: String },

    #[error(
        "You have reached your daily limit of {limit} downloads. \
        The limit resets at midnight."
    )]
    QuotaExceeded { limit: u32 },

    #[error("Unauthorized. This command is available only to the bot operator.")]
    NotOperator,
}

#[derive(Debug)]
pub(crate) enum Admission {
    Admitted { used: u32, limit: u32 },
    RejectedNotMember,
    RejectedQuota { limit: u32 },

    /// The membership couldn't be verified. The quota wasn't touched.
    RejectedTransportError(crate::Error),
}

/// Channel membership check followed by the quota check. The quota is
/// consumed only for the members of the channel.
pub(crate) struct AccessGate {
    transport: Arc<dyn ChatTransport>,
    quota: Arc<QuotaTracker>,
    channel: ChatId,
}

impl AccessGate {
    pub(crate) fn new(
        transport: Arc<dyn ChatTransport>,
        quota: Arc<QuotaTracker>,
        channel: ChatId,
    ) -> Self {
        Self {
            transport,
            quota,
            channel,
        }
    }

    #[instrument(skip(self), fields(user = user.0))]
    pub(crate) async fn admit(&self, user: UserId) -> Result<Admission> {
        let status = match self.transport.chat_member_status(self.channel, user).await {
            Ok(status) => status,
            Err(err) => {
                warn!(err = tracing_err(&err), "Failed to check the channel membership");
                return Ok(Admission::RejectedTransportError(err));
            }
        };

        if !status.is_joined() {
            debug!(?status, "User is not a member of the channel");
            return Ok(Admission::RejectedNotMember);
        }

        let admission = match self.quota.try_consume(user).await? {
            QuotaDecision::Allowed { used, limit } => Admission::Admitted { used, limit },
            QuotaDecision::Denied { limit } => Admission::RejectedQuota { limit },
        };

        Ok(admission)
    }
}
