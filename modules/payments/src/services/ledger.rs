//! Payment ledger service: the PaymentRequest state machine and the
//! Payment entries it produces.
//!
//! The state machine is `pending -> {paid, failed, expired}` with every
//! exit terminal. Transition functions are idempotent: re-applying a
//! transition to a terminal row is a no-op that returns the stored row,
//! so the reconciliation engine can be driven from both the push and the
//! pull path without coordination beyond the row lock taken here.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::correlator::REFERENCE_PREFIX;
use crate::events::{self, enqueue_event};
use crate::gateway::CheckoutSession;
use crate::models::{
    Payment, PaymentFailedPayload, PaymentMethod, PaymentRequest, PaymentSucceededPayload,
    RequestStatus,
};
use crate::repos::{payment_repo, payment_request_repo};
use crate::validation::{self, ValidationError};

/// How long a checkout stays payable once a provider session exists.
const DEFAULT_EXPIRY_HOURS: i64 = 24;

/// Attempts at generating a collision-free checkout reference.
const REFERENCE_ATTEMPTS: usize = 4;

const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("payment request {id} not found for tenant {tenant_id}")]
    NotFound { tenant_id: String, id: i64 },

    #[error("checkout reference '{0}' already exists for this tenant")]
    DuplicateReference(String),

    #[error("could not generate a unique checkout reference")]
    ReferenceExhausted,
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Result of an idempotent transition attempt.
#[derive(Debug)]
pub enum TransitionOutcome {
    /// The transition was applied in this call.
    Applied {
        request: PaymentRequest,
        payment: Option<Payment>,
    },
    /// The row was already terminal in a compatible state; nothing changed.
    AlreadyTerminal(PaymentRequest),
    /// The provider reported "paid" for a locally failed/expired row.
    /// Flagged for manual review, never silently overridden.
    Conflict(PaymentRequest),
}

#[derive(Debug, Clone)]
pub struct CreateRequestInput {
    pub tenant_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub customer_email: Option<String>,
    pub order_id: Option<i64>,
    pub job_id: Option<i64>,
    /// Caller-supplied reference; generated when absent.
    pub checkout_reference: Option<String>,
}

/// Create a requested charge with status `pending`.
///
/// The checkout reference is collision-checked against the tenant's
/// existing requests; the insert retries on a unique-constraint race for
/// generated references and rejects for caller-supplied ones.
pub async fn create_payment_request(
    pool: &PgPool,
    input: CreateRequestInput,
) -> LedgerResult<PaymentRequest> {
    let amount_minor = validation::validate_amount(input.amount)?;
    validation::validate_currency(&input.currency)?;
    validation::validate_description(&input.description)?;
    if let Some(email) = &input.customer_email {
        validation::validate_email(email)?;
    }
    if let Some(reference) = &input.checkout_reference {
        if reference.trim().is_empty() {
            return Err(ValidationError::EmptyReference.into());
        }
    }

    let supplied = input.checkout_reference.is_some();

    for _ in 0..REFERENCE_ATTEMPTS {
        let reference = match &input.checkout_reference {
            Some(reference) => reference.trim().to_string(),
            None => generate_reference(),
        };

        let new_request = payment_request_repo::NewPaymentRequest {
            tenant_id: input.tenant_id.clone(),
            checkout_reference: reference.clone(),
            amount_minor,
            currency: input.currency.clone(),
            description: input.description.clone(),
            customer_email: input.customer_email.clone(),
            order_id: input.order_id,
            job_id: input.job_id,
        };

        match payment_request_repo::insert(pool, &new_request).await {
            Ok(request) => {
                tracing::info!(
                    tenant_id = %request.tenant_id,
                    payment_request_id = request.id,
                    checkout_reference = %request.checkout_reference,
                    amount_minor = request.amount_minor,
                    currency = %request.currency,
                    "payment request created"
                );
                return Ok(request);
            }
            Err(e) if is_unique_violation(&e) => {
                if supplied {
                    return Err(LedgerError::DuplicateReference(reference));
                }
                // Generated reference collided; try another.
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(LedgerError::ReferenceExhausted)
}

/// Store the provider checkout artifact on a request, starting the
/// 24-hour expiry clock if none is running yet.
pub async fn attach_checkout_artifact(
    pool: &PgPool,
    tenant_id: &str,
    request_id: i64,
    session: &CheckoutSession,
) -> LedgerResult<PaymentRequest> {
    let expires_at = Utc::now() + Duration::hours(DEFAULT_EXPIRY_HOURS);

    payment_request_repo::attach_checkout_artifact(
        pool,
        tenant_id,
        request_id,
        &session.id,
        session.payment_link.as_deref(),
        expires_at,
    )
    .await?
    .ok_or_else(|| LedgerError::NotFound {
        tenant_id: tenant_id.to_string(),
        id: request_id,
    })
}

/// Confirmation details accompanying a successful charge.
#[derive(Debug, Clone, Default)]
pub struct PaidDetails {
    pub provider_payment_reference: Option<String>,
    pub receipt_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Transition a request to `paid` and write its ledger entry.
///
/// The status re-check, the status flip, the Payment insert, and the
/// outbox enqueue share one transaction under a row lock, so two
/// concurrent confirmations for the same request serialize here and the
/// loser sees a terminal row.
pub async fn mark_paid(
    pool: &PgPool,
    tenant_id: &str,
    request_id: i64,
    details: PaidDetails,
) -> LedgerResult<TransitionOutcome> {
    let mut tx = pool.begin().await?;

    let request = payment_request_repo::fetch_for_update(&mut tx, tenant_id, request_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound {
            tenant_id: tenant_id.to_string(),
            id: request_id,
        })?;

    match request.status {
        RequestStatus::Paid => {
            tracing::info!(
                tenant_id,
                payment_request_id = request_id,
                "payment request already paid; confirmation ignored"
            );
            return Ok(TransitionOutcome::AlreadyTerminal(request));
        }
        RequestStatus::Failed | RequestStatus::Expired => {
            tracing::warn!(
                tenant_id,
                payment_request_id = request_id,
                local_status = %request.status,
                "provider reported paid for a terminal non-paid request; flagged for manual review"
            );
            return Ok(TransitionOutcome::Conflict(request));
        }
        RequestStatus::Pending => {}
    }

    payment_request_repo::set_status(&mut tx, tenant_id, request_id, RequestStatus::Paid).await?;

    let paid_at = details.paid_at.unwrap_or_else(Utc::now);
    let payment = payment_repo::insert(
        &mut tx,
        &payment_repo::NewPayment {
            tenant_id: tenant_id.to_string(),
            payment_request_id: Some(request_id),
            order_id: request.order_id,
            job_id: request.job_id,
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            method: PaymentMethod::Provider,
            provider_payment_reference: details.provider_payment_reference.clone(),
            receipt_url: details.receipt_url.clone(),
            paid_at,
            notes: None,
        },
    )
    .await?;

    let envelope = events::new_envelope(
        tenant_id.to_string(),
        Some(request.checkout_reference.clone()),
        None,
        PaymentSucceededPayload {
            payment_id: payment.id,
            payment_request_id: Some(request_id),
            checkout_reference: Some(request.checkout_reference.clone()),
            method: PaymentMethod::Provider,
            order_id: request.order_id,
            job_id: request.job_id,
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            customer_email: request.customer_email.clone(),
            provider_payment_reference: details.provider_payment_reference,
            receipt_url: details.receipt_url,
        },
    );
    enqueue_event(&mut tx, "payment.succeeded", &envelope).await?;

    tx.commit().await?;

    tracing::info!(
        tenant_id,
        payment_request_id = request_id,
        payment_id = payment.id,
        amount_minor = payment.amount_minor,
        "payment request confirmed paid"
    );

    let request = PaymentRequest {
        status: RequestStatus::Paid,
        ..request
    };

    Ok(TransitionOutcome::Applied {
        request,
        payment: Some(payment),
    })
}

/// Transition a request to `failed`. No Payment entry is created.
pub async fn mark_failed(
    pool: &PgPool,
    tenant_id: &str,
    request_id: i64,
    reason: Option<String>,
) -> LedgerResult<TransitionOutcome> {
    let mut tx = pool.begin().await?;

    let request = payment_request_repo::fetch_for_update(&mut tx, tenant_id, request_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound {
            tenant_id: tenant_id.to_string(),
            id: request_id,
        })?;

    if request.status.is_terminal() {
        tracing::info!(
            tenant_id,
            payment_request_id = request_id,
            status = %request.status,
            "failure report for a terminal request; ignored"
        );
        return Ok(TransitionOutcome::AlreadyTerminal(request));
    }

    payment_request_repo::set_status(&mut tx, tenant_id, request_id, RequestStatus::Failed).await?;

    let failure_reason = reason.unwrap_or_else(|| "declined by provider".to_string());
    let envelope = events::new_envelope(
        tenant_id.to_string(),
        Some(request.checkout_reference.clone()),
        None,
        PaymentFailedPayload {
            payment_request_id: request_id,
            checkout_reference: request.checkout_reference.clone(),
            order_id: request.order_id,
            job_id: request.job_id,
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            customer_email: request.customer_email.clone(),
            failure_reason: failure_reason.clone(),
        },
    );
    enqueue_event(&mut tx, "payment.failed", &envelope).await?;

    tx.commit().await?;

    tracing::info!(
        tenant_id,
        payment_request_id = request_id,
        failure_reason = %failure_reason,
        "payment request marked failed"
    );

    let request = PaymentRequest {
        status: RequestStatus::Failed,
        ..request
    };

    Ok(TransitionOutcome::Applied {
        request,
        payment: None,
    })
}

/// Transition a request to `expired`. Applied by the sweeper when the
/// provider session lapsed or the expiry clock ran out while pending.
pub async fn mark_expired(
    pool: &PgPool,
    tenant_id: &str,
    request_id: i64,
) -> LedgerResult<TransitionOutcome> {
    let mut tx = pool.begin().await?;

    let request = payment_request_repo::fetch_for_update(&mut tx, tenant_id, request_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound {
            tenant_id: tenant_id.to_string(),
            id: request_id,
        })?;

    if request.status.is_terminal() {
        return Ok(TransitionOutcome::AlreadyTerminal(request));
    }

    payment_request_repo::set_status(&mut tx, tenant_id, request_id, RequestStatus::Expired).await?;
    tx.commit().await?;

    tracing::info!(
        tenant_id,
        payment_request_id = request_id,
        "payment request expired"
    );

    let request = PaymentRequest {
        status: RequestStatus::Expired,
        ..request
    };

    Ok(TransitionOutcome::Applied {
        request,
        payment: None,
    })
}

#[derive(Debug, Clone)]
pub struct ManualPaymentInput {
    pub tenant_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub order_id: Option<i64>,
    pub job_id: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Record a payment taken outside the provider (cash, bank transfer).
///
/// Emits the same `payment.succeeded` event as a reconciled charge so the
/// order payment projection includes it.
pub async fn record_manual_payment(
    pool: &PgPool,
    input: ManualPaymentInput,
) -> LedgerResult<Payment> {
    let amount_minor = validation::validate_amount(input.amount)?;
    validation::validate_currency(&input.currency)?;
    if input.method == PaymentMethod::Provider {
        return Err(ValidationError::ProviderMethodReserved.into());
    }

    let mut tx = pool.begin().await?;

    let payment = payment_repo::insert(
        &mut tx,
        &payment_repo::NewPayment {
            tenant_id: input.tenant_id.clone(),
            payment_request_id: None,
            order_id: input.order_id,
            job_id: input.job_id,
            amount_minor,
            currency: input.currency.clone(),
            method: input.method,
            provider_payment_reference: None,
            receipt_url: None,
            paid_at: input.paid_at.unwrap_or_else(Utc::now),
            notes: input.notes.clone(),
        },
    )
    .await?;

    let envelope = events::new_envelope(
        input.tenant_id.clone(),
        None,
        None,
        PaymentSucceededPayload {
            payment_id: payment.id,
            payment_request_id: None,
            checkout_reference: None,
            method: input.method,
            order_id: input.order_id,
            job_id: input.job_id,
            amount_minor,
            currency: input.currency,
            customer_email: None,
            provider_payment_reference: None,
            receipt_url: None,
        },
    );
    enqueue_event(&mut tx, "payment.succeeded", &envelope).await?;

    tx.commit().await?;

    tracing::info!(
        tenant_id = %payment.tenant_id,
        payment_id = payment.id,
        method = %payment.method,
        amount_minor = payment.amount_minor,
        "manual payment recorded"
    );

    Ok(payment)
}

fn generate_reference() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{REFERENCE_PREFIX}{}", &token[..12])
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == PG_UNIQUE_VIOLATION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_references_carry_the_link_prefix() {
        let reference = generate_reference();
        assert!(reference.starts_with(REFERENCE_PREFIX));
        assert_eq!(reference.len(), REFERENCE_PREFIX.len() + 12);
    }

    #[test]
    fn generated_references_are_distinct() {
        let a = generate_reference();
        let b = generate_reference();
        assert_ne!(a, b);
    }
}
