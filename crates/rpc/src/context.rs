//! Application context - wires everything together

use chrono::{DateTime, NaiveDate, Utc};
use fisca_core::{Amount, TypeCatalog};
use fisca_delegation::{DelegationEngine, DelegationStore};
use fisca_guard::{AuthorizationDecision, GuardConfig, PaymentGuard};
use fisca_registry::{ObligationRegistry, ObligationStore};
use fisca_scoring::{RiskScoreSnapshot, ScoringConfig, SnapshotStore};
use std::path::{Path, PathBuf};

/// Application context - wires together all components
pub struct AppContext {
    pub registry: ObligationRegistry,
    pub delegations: DelegationEngine,
    pub guard: PaymentGuard,
    pub snapshots: SnapshotStore,
    pub scoring_config: ScoringConfig,
    data_path: PathBuf,
}

impl AppContext {
    /// Create a new application context.
    ///
    /// Databases and the decision log are created under `data_path` on
    /// first use. Optional JSON files next to them override the
    /// defaults: `types.json` (obligation type catalog), `scoring.json`
    /// and `guard.json`.
    pub async fn new(data_path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let data_path = data_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_path)?;

        let catalog_path = data_path.join("types.json");
        let catalog = if catalog_path.exists() {
            TypeCatalog::from_file(&catalog_path)?
        } else {
            TypeCatalog::builtin()
        };

        let scoring_path = data_path.join("scoring.json");
        let scoring_config = if scoring_path.exists() {
            ScoringConfig::from_file(&scoring_path)?
        } else {
            ScoringConfig::default()
        };

        let guard_path = data_path.join("guard.json");
        let guard_config = if guard_path.exists() {
            GuardConfig::from_file(&guard_path)?
        } else {
            GuardConfig::default()
        };

        let registry = ObligationRegistry::new(
            ObligationStore::new(data_path.join("obligations.db"))?,
            catalog.clone(),
        );
        let delegations = DelegationEngine::new(
            DelegationStore::new(data_path.join("delegations.db"))?,
            catalog,
        );
        let guard = PaymentGuard::new(
            data_path.join("guard.db"),
            data_path.join("decisions.jsonl"),
            &guard_config,
        )?;
        let snapshots = SnapshotStore::new(data_path.join("risk.db")).await?;

        Ok(Self {
            registry,
            delegations,
            guard,
            snapshots,
            scoring_config,
            data_path,
        })
    }

    /// Authorize a payment under a delegation.
    ///
    /// Flow: Refresh delegation (lazy expiry) → Fetch obligation →
    /// Guard decision. The decision lands in the audit log whatever the
    /// outcome; unknown ids error out before the guard runs.
    pub fn authorize_payment(
        &mut self,
        delegation_id: &str,
        obligation_id: &str,
        proposed_amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationDecision, AuthorizeError> {
        let delegation = self.delegations.refresh(delegation_id, now)?;
        let obligation = self.registry.get(obligation_id)?;
        let decision = self
            .guard
            .authorize(&delegation, &obligation, proposed_amount, now)?;
        Ok(decision)
    }

    /// Recompute one client's risk snapshot and persist it
    pub async fn recompute_risk(
        &self,
        client_id: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RiskScoreSnapshot, anyhow::Error> {
        let obligations = self.registry.client_obligations(client_id)?;
        let snapshot =
            RiskScoreSnapshot::compute(client_id, &obligations, &self.scoring_config, today, now);
        self.snapshots.upsert(&snapshot).await?;
        Ok(snapshot)
    }

    /// Recompute every known client, riskiest first in the result
    pub async fn recompute_all(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<RiskScoreSnapshot>, anyhow::Error> {
        for client_id in self.registry.client_ids()? {
            self.recompute_risk(&client_id, today, now).await?;
        }
        Ok(self.snapshots.list().await?)
    }

    /// Get data directory path
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

/// Errors during payment authorization
#[derive(Debug, thiserror::Error)]
pub enum AuthorizeError {
    #[error("Delegation error: {0}")]
    Delegation(#[from] fisca_delegation::DelegationError),

    #[error("Registry error: {0}")]
    Registry(#[from] fisca_registry::RegistryError),

    #[error("Guard error: {0}")]
    Guard(#[from] fisca_guard::GuardError),
}
