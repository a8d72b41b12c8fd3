use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::tx::{Transaction, TransactionRepository, TransactionStatus};
use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    Confirmed,
    NotYet,
    Expired,
}

/// Capability seam towards the payment network: answers whether the funds
/// for a given bill reference were received. A production deployment backs
/// this with the bank webhook/API client.
#[async_trait]
pub trait SettlementProbe: Send + Sync {
    async fn check_settlement(
        &self,
        bill_number: &str,
        amount: Decimal,
    ) -> AppResult<SettlementStatus>;
}

/// Stand-in probe: waits the configured delay, then confirms unconditionally.
pub struct SimulatedProbe {
    delay: Duration,
}

impl SimulatedProbe {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl SettlementProbe for SimulatedProbe {
    async fn check_settlement(
        &self,
        bill_number: &str,
        amount: Decimal,
    ) -> AppResult<SettlementStatus> {
        tokio::time::sleep(self.delay).await;
        tracing::info!("simulated settlement confirmed for bill {bill_number} ({amount})");
        Ok(SettlementStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationOutcome {
    Confirmed,
    StillPending,
    Expired,
    Failed,
}

pub struct VerifyService {
    ledger: TransactionRepository,
    probe: Arc<dyn SettlementProbe>,
    validity_window: chrono::Duration,
}

impl VerifyService {
    pub fn new(
        ledger: TransactionRepository,
        probe: Arc<dyn SettlementProbe>,
        validity_window: Duration,
    ) -> Self {
        Self {
            ledger,
            probe,
            validity_window: chrono::Duration::from_std(validity_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(120)),
        }
    }

    /// Settle a pending transaction or report its terminal state.
    /// Terminal records are answered without re-running settlement.
    pub async fn verify(&self, bill_number: &str) -> AppResult<(VerificationOutcome, Transaction)> {
        let transaction = self.ledger.find_by_bill(bill_number).await?;

        if let Some(outcome) = terminal_outcome(transaction.status) {
            tracing::info!(
                "verify on settled bill {bill_number}: already {:?}",
                transaction.status
            );
            return Ok((outcome, transaction));
        }

        if is_expired(transaction.created_at, Utc::now(), self.validity_window) {
            tracing::warn!("bill {bill_number} expired before settlement, failing it");
            let transaction = self
                .ledger
                .update_status(bill_number, TransactionStatus::Failed)
                .await?;
            return Ok((VerificationOutcome::Expired, transaction));
        }

        let probe_result = self
            .probe
            .check_settlement(bill_number, transaction.amount)
            .await;
        let (outcome, new_status) = outcome_for_probe(bill_number, probe_result);

        let transaction = match new_status {
            Some(status) => self.ledger.update_status(bill_number, status).await?,
            None => transaction,
        };

        tracing::info!("verification of bill {bill_number}: {outcome:?}");
        Ok((outcome, transaction))
    }
}

fn terminal_outcome(status: TransactionStatus) -> Option<VerificationOutcome> {
    match status {
        TransactionStatus::Success => Some(VerificationOutcome::Confirmed),
        TransactionStatus::Failed => Some(VerificationOutcome::Failed),
        TransactionStatus::Pending => None,
    }
}

fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, window: chrono::Duration) -> bool {
    now - created_at > window
}

// A probe error is a transient condition: the client retries, the record
// stays PENDING. It is never promoted to a confirmation.
fn outcome_for_probe(
    bill_number: &str,
    result: AppResult<SettlementStatus>,
) -> (VerificationOutcome, Option<TransactionStatus>) {
    match result {
        Ok(SettlementStatus::Confirmed) => {
            (VerificationOutcome::Confirmed, Some(TransactionStatus::Success))
        }
        Ok(SettlementStatus::NotYet) => (VerificationOutcome::StillPending, None),
        Ok(SettlementStatus::Expired) => {
            (VerificationOutcome::Expired, Some(TransactionStatus::Failed))
        }
        Err(err) => {
            tracing::warn!("settlement check for bill {bill_number} failed: {err}");
            (VerificationOutcome::StillPending, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn terminal_states_answer_without_settlement() {
        // repeated calls on a settled record keep returning the settled outcome
        for _ in 0..2 {
            assert_eq!(
                terminal_outcome(TransactionStatus::Success),
                Some(VerificationOutcome::Confirmed)
            );
        }
        assert_eq!(
            terminal_outcome(TransactionStatus::Failed),
            Some(VerificationOutcome::Failed)
        );
        assert_eq!(terminal_outcome(TransactionStatus::Pending), None);
    }

    #[test]
    fn expiry_cutoff() {
        let window = chrono::Duration::seconds(120);
        let created = Utc::now();
        assert!(!is_expired(created, created + chrono::Duration::seconds(119), window));
        assert!(!is_expired(created, created + chrono::Duration::seconds(120), window));
        assert!(is_expired(created, created + chrono::Duration::seconds(121), window));
    }

    #[test]
    fn probe_results_map_to_outcomes() {
        let (outcome, status) = outcome_for_probe("KH-1", Ok(SettlementStatus::Confirmed));
        assert_eq!(outcome, VerificationOutcome::Confirmed);
        assert_eq!(status, Some(TransactionStatus::Success));

        let (outcome, status) = outcome_for_probe("KH-1", Ok(SettlementStatus::NotYet));
        assert_eq!(outcome, VerificationOutcome::StillPending);
        assert_eq!(status, None);

        let (outcome, status) = outcome_for_probe("KH-1", Ok(SettlementStatus::Expired));
        assert_eq!(outcome, VerificationOutcome::Expired);
        assert_eq!(status, Some(TransactionStatus::Failed));
    }

    #[test]
    fn transient_probe_failure_stays_pending() {
        let result = Err(AppError::VerificationTransientFailure(
            "bank unreachable".to_string(),
        ));
        let (outcome, status) = outcome_for_probe("KH-1", result);
        assert_eq!(outcome, VerificationOutcome::StillPending);
        assert_eq!(status, None);
    }

    struct UnreachableProbe;

    #[async_trait]
    impl SettlementProbe for UnreachableProbe {
        async fn check_settlement(
            &self,
            _bill_number: &str,
            _amount: Decimal,
        ) -> AppResult<SettlementStatus> {
            Err(AppError::VerificationTransientFailure(
                "connection refused".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn simulated_probe_confirms_after_delay() {
        let probe = SimulatedProbe::new(Duration::from_millis(0));
        let status = probe.check_settlement("KH-1", Decimal::ONE).await.unwrap();
        assert_eq!(status, SettlementStatus::Confirmed);
    }

    #[tokio::test]
    async fn probe_trait_object_usable_behind_arc() {
        let probe: Arc<dyn SettlementProbe> = Arc::new(UnreachableProbe);
        let err = probe.check_settlement("KH-1", Decimal::ONE).await.unwrap_err();
        assert!(matches!(err, AppError::VerificationTransientFailure(_)));
    }

    #[test]
    fn outcomes_serialize_screaming_snake() {
        let json = serde_json::to_string(&VerificationOutcome::StillPending).unwrap();
        assert_eq!(json, "\"STILL_PENDING\"");
        let json = serde_json::to_string(&VerificationOutcome::Confirmed).unwrap();
        assert_eq!(json, "\"CONFIRMED\"");
    }
}
