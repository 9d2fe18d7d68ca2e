use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use stripe::{
    CancelSubscription, Client, CreateRefund, Invoice, ListInvoices, PaymentIntentId, Refund,
    Subscription, SubscriptionId, UpdateSubscription,
};
use uuid::Uuid;

use crate::api_subs::dtos::manage::{
    ManageAction, ManageRequest, ManageResponse, SubscriptionType,
};
use crate::common::error::{AppError, Res};
use crate::common::jwt::Claims;
use crate::db;

/// Days after the subscription start during which a full refund can be
/// requested, unless the withdrawal right was waived by consuming content.
pub const WITHDRAWAL_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundEligibility {
    Eligible,
    /// The withdrawal window has passed.
    WindowExpired,
    /// Benefits were consumed during the window, waiving the right.
    Waived,
}

/// Scope-independent eligibility rule for a full refund on cancellation.
pub fn refund_eligibility(
    started_at: DateTime<Utc>,
    withdrawal_right_waived: bool,
    now: DateTime<Utc>,
) -> RefundEligibility {
    if withdrawal_right_waived {
        return RefundEligibility::Waived;
    }
    if now - started_at > Duration::days(WITHDRAWAL_WINDOW_DAYS) {
        return RefundEligibility::WindowExpired;
    }
    RefundEligibility::Eligible
}

/// The actor's active subscription in the requested scope, with everything
/// the lifecycle actions need.
struct ScopeHandle {
    provider_subscription_id: String,
    started_at: DateTime<Utc>,
    withdrawal_right_waived: bool,
    /// Row id for professor scope; platform state lives on the user row.
    professor_row_id: Option<Uuid>,
}

async fn resolve_scope(pool: &PgPool, claims: &Claims, req: &ManageRequest) -> Res<ScopeHandle> {
    match req.subscription_type {
        SubscriptionType::Platform => {
            let user = db::user::get_user_by_id(pool, claims.user_id).await?;
            let active = user.platform_subscription_status.as_deref() == Some("active");
            match (active, user.platform_subscription_id) {
                (true, Some(subscription_id)) => Ok(ScopeHandle {
                    provider_subscription_id: subscription_id,
                    started_at: user.platform_subscription_started_at.unwrap_or(user.created_at),
                    withdrawal_right_waived: user.platform_withdrawal_right_waived,
                    professor_row_id: None,
                }),
                _ => Err(AppError::NotFound(
                    "No active platform subscription".to_string(),
                )),
            }
        }
        SubscriptionType::Professor => {
            let professor_id = req.professor_id.ok_or_else(|| {
                AppError::BadRequest("professor_id is required for professor scope".to_string())
            })?;
            let row = db::subscription::get_professor_subscription(pool, claims.user_id, professor_id)
                .await?
                .filter(|row| row.status == "active");
            match row {
                Some(row) => match row.stripe_subscription_id.clone() {
                    Some(subscription_id) => Ok(ScopeHandle {
                        provider_subscription_id: subscription_id,
                        started_at: row.started_at,
                        withdrawal_right_waived: row.withdrawal_right_waived,
                        professor_row_id: Some(row.id),
                    }),
                    None => Err(AppError::NotFound(
                        "No active professor subscription".to_string(),
                    )),
                },
                None => Err(AppError::NotFound(
                    "No active professor subscription".to_string(),
                )),
            }
        }
    }
}

fn parse_subscription_id(id: &str) -> Res<SubscriptionId> {
    id.parse::<SubscriptionId>()
        .map_err(|e| AppError::Internal(format!("Invalid stored subscription ID: {}", e)))
}

async fn set_cancel_at_period_end(
    client: &Client,
    subscription_id: &SubscriptionId,
    cancel: bool,
) -> Res<Subscription> {
    Subscription::update(
        client,
        subscription_id,
        UpdateSubscription {
            cancel_at_period_end: Some(cancel),
            ..Default::default()
        },
    )
    .await
    .map_err(AppError::from)
}

/// Finds the payment intent behind the latest invoice of a subscription,
/// together with the amount paid on it.
async fn latest_invoice_payment(
    client: &Client,
    subscription_id: &SubscriptionId,
) -> Res<Option<(PaymentIntentId, i64)>> {
    let invoices = Invoice::list(
        client,
        &ListInvoices {
            subscription: Some(subscription_id.clone()),
            limit: Some(1),
            ..Default::default()
        },
    )
    .await
    .map_err(AppError::from)?;

    let Some(invoice) = invoices.data.first() else {
        return Ok(None);
    };
    let Some(intent) = invoice.payment_intent.as_ref() else {
        return Ok(None);
    };
    Ok(Some((intent.id().clone(), invoice.amount_paid.unwrap_or(0))))
}

async fn issue_full_refund(
    client: &Client,
    payment_intent_id: PaymentIntentId,
) -> Res<Refund> {
    let mut params = CreateRefund::new();
    params.payment_intent = Some(payment_intent_id);
    params.reason = Some(stripe::RefundReasonFilter::RequestedByCustomer);
    Refund::create(client, params).await.map_err(AppError::from)
}

async fn persist_cancellation_fields(
    pool: &PgPool,
    claims: &Claims,
    scope: &ScopeHandle,
    req: &ManageRequest,
) -> Res<()> {
    match scope.professor_row_id {
        None => {
            db::user::set_platform_cancellation(
                pool,
                claims.user_id,
                req.cancellation_reason.as_deref(),
                req.cancellation_feedback.as_deref(),
            )
            .await
        }
        Some(row_id) => {
            db::subscription::set_cancellation(
                pool,
                row_id,
                req.cancellation_reason.as_deref(),
                req.cancellation_feedback.as_deref(),
            )
            .await
        }
    }
}

async fn persist_cancel_flag(
    pool: &PgPool,
    claims: &Claims,
    scope: &ScopeHandle,
    cancel: bool,
) -> Res<()> {
    match scope.professor_row_id {
        None => db::user::set_platform_cancel_at_period_end(pool, claims.user_id, cancel).await,
        Some(row_id) => db::subscription::set_cancel_at_period_end(pool, row_id, cancel).await,
    }
}

async fn persist_terminal_cancellation(
    pool: &PgPool,
    claims: &Claims,
    scope: &ScopeHandle,
) -> Res<()> {
    match scope.professor_row_id {
        None => db::user::cancel_platform_now(pool, claims.user_id).await,
        Some(row_id) => db::subscription::cancel_now(pool, row_id).await,
    }
}

/// User-initiated subscription management: cancel (optionally with a refund
/// request) or reactivate, for the platform or a per-professor scope.
pub async fn manage(
    pool: &PgPool,
    client: &Client,
    claims: &Claims,
    req: ManageRequest,
) -> Res<ManageResponse> {
    let scope = resolve_scope(pool, claims, &req).await?;
    let subscription_id = parse_subscription_id(&scope.provider_subscription_id)?;

    match req.action {
        ManageAction::Reactivate => {
            set_cancel_at_period_end(client, &subscription_id, false).await?;
            persist_cancel_flag(pool, claims, &scope, false).await?;
            Ok(ManageResponse {
                success: true,
                message: "Subscription will renew at the end of the period".to_string(),
                refund_processed: None,
                refund_id: None,
            })
        }
        ManageAction::Cancel if !req.request_refund => {
            set_cancel_at_period_end(client, &subscription_id, true).await?;
            persist_cancel_flag(pool, claims, &scope, true).await?;
            persist_cancellation_fields(pool, claims, &scope, &req).await?;
            Ok(ManageResponse {
                success: true,
                message: "Subscription will end at the end of the current period".to_string(),
                refund_processed: None,
                refund_id: None,
            })
        }
        ManageAction::Cancel => {
            match refund_eligibility(scope.started_at, scope.withdrawal_right_waived, Utc::now()) {
                RefundEligibility::Waived => {
                    return Err(AppError::BadRequest(
                        "Refund not available: withdrawal right was waived because benefits were used"
                            .to_string(),
                    ));
                }
                RefundEligibility::WindowExpired => {
                    return Err(AppError::BadRequest(format!(
                        "Refund not available: the {}-day withdrawal window has expired",
                        WITHDRAWAL_WINDOW_DAYS
                    )));
                }
                RefundEligibility::Eligible => {}
            }

            match try_refund(pool, client, claims, &scope, &subscription_id, &req).await {
                Ok(refund_id) => {
                    // Refund issued, terminate immediately rather than at
                    // period end
                    Subscription::cancel(client, &subscription_id, CancelSubscription::new())
                        .await?;
                    persist_terminal_cancellation(pool, claims, &scope).await?;
                    persist_cancellation_fields(pool, claims, &scope, &req).await?;
                    Ok(ManageResponse {
                        success: true,
                        message: "Subscription cancelled and payment refunded".to_string(),
                        refund_processed: Some(true),
                        refund_id: Some(refund_id),
                    })
                }
                Err(e) => {
                    // Degrade to a scheduled cancellation; losing the refund
                    // must not keep the user subscribed
                    log::error!("Refund failed, falling back to scheduled cancellation: {}", e);
                    set_cancel_at_period_end(client, &subscription_id, true).await?;
                    persist_cancel_flag(pool, claims, &scope, true).await?;
                    persist_cancellation_fields(pool, claims, &scope, &req).await?;
                    Ok(ManageResponse {
                        success: true,
                        message:
                            "Refund could not be processed; subscription will end at the end of the current period"
                                .to_string(),
                        refund_processed: Some(false),
                        refund_id: None,
                    })
                }
            }
        }
    }
}

/// Issues the refund and records it. Any failure here is downgraded by the
/// caller, not propagated to the client.
async fn try_refund(
    pool: &PgPool,
    client: &Client,
    claims: &Claims,
    scope: &ScopeHandle,
    subscription_id: &SubscriptionId,
    req: &ManageRequest,
) -> Res<String> {
    let Some((payment_intent_id, _amount_paid)) =
        latest_invoice_payment(client, subscription_id).await?
    else {
        return Err(AppError::NotFound(
            "No payment information found for this subscription".to_string(),
        ));
    };

    let refund = issue_full_refund(client, payment_intent_id).await?;

    // The provider has issued the refund at this point; a bookkeeping
    // failure must not make the caller report it as unprocessed
    if let Err(e) = db::refund::insert_refund(
        pool,
        claims.user_id,
        req.subscription_type.as_str(),
        subscription_id.as_str(),
        refund.amount,
        req.cancellation_reason.as_deref(),
        &refund.status.unwrap_or_default().to_string(),
        refund.id.as_str(),
    )
    .await
    {
        log::error!("Refund {} issued but not recorded: {}", refund.id, e);
    }

    Ok(refund.id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_allowed_inside_window() {
        let now = Utc::now();
        let started = now - Duration::days(3);
        assert_eq!(
            refund_eligibility(started, false, now),
            RefundEligibility::Eligible
        );
    }

    #[test]
    fn refund_denied_after_window() {
        let now = Utc::now();
        let started = now - Duration::days(WITHDRAWAL_WINDOW_DAYS + 1);
        assert_eq!(
            refund_eligibility(started, false, now),
            RefundEligibility::WindowExpired
        );
    }

    #[test]
    fn waiver_beats_the_window() {
        let now = Utc::now();
        let started = now - Duration::days(1);
        assert_eq!(
            refund_eligibility(started, true, now),
            RefundEligibility::Waived
        );
    }

    #[test]
    fn resubscription_start_reopens_the_window() {
        let now = Utc::now();

        // The stored start date follows the provider subscription: after a
        // cancel-and-resubscribe the row carries the new subscription's
        // start, not the one from a year ago
        let original_start = now - Duration::days(365);
        let new_start = now - Duration::days(3);

        assert_eq!(
            refund_eligibility(original_start, false, now),
            RefundEligibility::WindowExpired
        );
        assert_eq!(
            refund_eligibility(new_start, false, now),
            RefundEligibility::Eligible
        );
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let now = Utc::now();
        let started = now - Duration::days(WITHDRAWAL_WINDOW_DAYS);
        assert_eq!(
            refund_eligibility(started, false, now),
            RefundEligibility::Eligible
        );
    }
}
