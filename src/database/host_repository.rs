use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fiscal host of a collective, as far as settlement needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostAccount {
    pub collective_id: Uuid,
    pub host_collective_id: Uuid,
    pub currency: String,
    /// Connected provider account; `None` means the host never connected one.
    pub connected_account_id: Option<String>,
    pub host_fee_percent: BigDecimal,
    /// Revenue-share plan. Present and non-zero means platform fees come from
    /// the order's platform tip.
    pub host_fee_share_percent: Option<BigDecimal>,
}

impl HostAccount {
    pub fn is_shared_revenue(&self) -> bool {
        self.host_fee_share_percent
            .as_ref()
            .map(|p| !p.is_zero())
            .unwrap_or(false)
    }

    pub fn connected_account(&self) -> Option<&str> {
        self.connected_account_id
            .as_deref()
            .filter(|account| !account.trim().is_empty())
    }
}

#[cfg(feature = "database")]
pub use pg::HostRepository;

#[cfg(feature = "database")]
mod pg {
    use super::HostAccount;
    use crate::database::error::{DatabaseError, DatabaseResult};
    use sqlx::{types::BigDecimal, FromRow, PgExecutor};
    use uuid::Uuid;

    #[derive(Debug, Clone, FromRow)]
    struct HostAccountRow {
        collective_id: Uuid,
        host_collective_id: Uuid,
        currency: String,
        connected_account_id: Option<String>,
        host_fee_percent: BigDecimal,
        host_fee_share_percent: Option<BigDecimal>,
    }

    impl From<HostAccountRow> for HostAccount {
        fn from(row: HostAccountRow) -> Self {
            HostAccount {
                collective_id: row.collective_id,
                host_collective_id: row.host_collective_id,
                currency: row.currency,
                connected_account_id: row.connected_account_id,
                host_fee_percent: row.host_fee_percent,
                host_fee_share_percent: row.host_fee_share_percent,
            }
        }
    }

    pub struct HostRepository;

    impl HostRepository {
        pub async fn find_by_collective<'e, E: PgExecutor<'e>>(
            executor: E,
            collective_id: Uuid,
        ) -> DatabaseResult<Option<HostAccount>> {
            let row = sqlx::query_as::<_, HostAccountRow>(
                "SELECT collective_id, host_collective_id, currency, connected_account_id,
                        host_fee_percent, host_fee_share_percent
                 FROM host_accounts
                 WHERE collective_id = $1",
            )
            .bind(collective_id)
            .fetch_optional(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            Ok(row.map(HostAccount::from))
        }
    }
}
