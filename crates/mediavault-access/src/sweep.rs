//! Periodic cleanup of expired tokens
//!
//! The scheduler in the server binary calls [`TokenService::sweep_expired`]
//! on a fixed interval; the same operation backs the admin-triggered sweep
//! endpoint. Each token's transition is independent: one failing record is
//! logged and counted, never allowed to abort the rest of the pass.

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::{debug, warn};

use mediavault_db::entities::access_token::{self, Entity as AccessToken};

use crate::error::AccessError;
use crate::service::TokenService;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Tokens transitioned to expired during this pass
    pub processed: usize,
    /// Tokens whose transition or read-group sync failed (retried next pass)
    pub failed: usize,
}

impl TokenService {
    /// Find tokens whose expiration has passed but whose cached flag is not
    /// yet set, and transition them. Revoked-but-unexpired tokens get their
    /// read-group sync re-driven here too, so a removal that failed at
    /// revocation time converges.
    pub async fn sweep_expired(&self) -> Result<SweepReport, AccessError> {
        let candidates = AccessToken::find()
            .filter(access_token::Column::Expired.eq(false))
            .all(self.database())
            .await?;

        let now = self.now();
        let mut report = SweepReport::default();

        for token in candidates {
            let token_id = token.id;

            if token.is_expired_at(now) {
                match self.expire(token).await {
                    Ok(_) => report.processed += 1,
                    Err(e) => {
                        warn!(token_id = %token_id, error = %e, "Failed to expire token during sweep");
                        report.failed += 1;
                    }
                }
            } else if token.revoked {
                if let Err(e) = self.sync_read_group(&token).await {
                    warn!(token_id = %token_id, error = %e, "Failed to sync read group for revoked token during sweep");
                    report.failed += 1;
                }
            }
        }

        debug!(
            processed = report.processed,
            failed = report.failed,
            "Access token sweep finished"
        );

        Ok(report)
    }
}
