//! Liveness report for the settlement service.
//!
//! The ledger store is the only hard dependency; the provider is only reached
//! per request and is not probed here.

use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error};

use crate::database::error::DatabaseResult;
use crate::database::ledger::SharedLedgerStore;
use crate::services::order_state::OrderStatus;

/// Orders awaiting the redirect callback are counted up to this many.
const BACKLOG_SCAN_LIMIT: usize = 1000;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
}

#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: BTreeMap<String, ComponentHealth>,
    /// Orders still in REQUIRE_CLIENT_CONFIRMATION, capped at the scan limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_confirmation: Option<usize>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    store: SharedLedgerStore,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new(store: SharedLedgerStore) -> Self {
        Self {
            store,
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub async fn check_health(&self) -> HealthStatus {
        let ledger = self.probe("ledger", self.store.health_check()).await;

        let awaiting_confirmation = if ledger.status == ComponentState::Up {
            self.store
                .find_orders_by_status(OrderStatus::RequireClientConfirmation, BACKLOG_SCAN_LIMIT)
                .await
                .map(|orders| orders.len())
                .ok()
        } else {
            None
        };

        let status = if ledger.status == ComponentState::Up {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };

        HealthStatus {
            status,
            checks: BTreeMap::from([("ledger".to_string(), ledger)]),
            awaiting_confirmation,
            timestamp: chrono::Utc::now(),
        }
    }

    async fn probe<F>(&self, component: &str, check: F) -> ComponentHealth
    where
        F: Future<Output = DatabaseResult<()>>,
    {
        let started = Instant::now();
        match timeout(self.probe_timeout, check).await {
            Ok(Ok(())) => {
                let elapsed = started.elapsed().as_millis();
                debug!(component, elapsed_ms = elapsed as u64, "health probe ok");
                ComponentHealth {
                    status: ComponentState::Up,
                    response_time_ms: Some(elapsed),
                    details: None,
                }
            }
            Ok(Err(e)) => {
                error!(component, error = %e, "health probe failed");
                ComponentHealth {
                    status: ComponentState::Down,
                    response_time_ms: None,
                    details: Some(e.to_string()),
                }
            }
            Err(_) => {
                error!(component, timeout = ?self.probe_timeout, "health probe timed out");
                ComponentHealth {
                    status: ComponentState::Down,
                    response_time_ms: None,
                    details: Some("timed out".to_string()),
                }
            }
        }
    }
}
