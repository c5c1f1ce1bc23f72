//! CLI commands

use chrono::{DateTime, NaiveDate, Utc};
use fisca_alerts::AlertLevel;
use fisca_core::{Amount, PaidBy, PaymentMethod, Periodicity};
use fisca_delegation::{DelegationUpdate, NewDelegation, Party, SpendingLimit};
use fisca_guard::{month_key, DecisionOutcome};
use fisca_registry::{
    NewObligation, Obligation, ObligationFilter, ObligationState, ObligationUpdate, Priority,
};
use rust_decimal::Decimal;

use crate::context::AppContext;

// === Obligations ===

/// Register a new obligation
pub async fn obligation_create(
    ctx: &mut AppContext,
    type_code: &str,
    client: &str,
    due: NaiveDate,
    amount: Decimal,
    priority: Option<Priority>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let new = NewObligation {
        type_code: type_code.to_string(),
        client_id: client.to_string(),
        due_date: Some(due),
        base_amount: Amount::new(amount)?,
        priority,
        notes,
        ..Default::default()
    };

    let obligation = ctx.registry.create(new, now)?;

    println!(
        "✅ Created {} ({} {} due {})",
        obligation.id, obligation.client_id, obligation.type_code, obligation.due_date
    );
    Ok(())
}

/// Update an open obligation
pub async fn obligation_update(
    ctx: &mut AppContext,
    id: &str,
    state: Option<ObligationState>,
    priority: Option<Priority>,
    base_amount: Option<Decimal>,
    penalty_amount: Option<Decimal>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let update = ObligationUpdate {
        state,
        priority,
        base_amount: base_amount.map(Amount::new).transpose()?,
        penalty_amount: penalty_amount.map(Amount::new).transpose()?,
        notes,
        ..Default::default()
    };

    let obligation = ctx.registry.update(id, update, now)?;

    println!("✅ Updated {} (state: {})", obligation.id, obligation.state);
    Ok(())
}

/// Record a payment, settling the obligation
pub async fn obligation_pay(
    ctx: &mut AppContext,
    id: &str,
    paid_on: NaiveDate,
    method: Option<PaymentMethod>,
    paid_by: Option<PaidBy>,
    reference: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let update = ObligationUpdate {
        state: Some(ObligationState::Paid),
        payment_date: Some(paid_on),
        payment_method: method,
        paid_by,
        payment_reference: reference,
        ..Default::default()
    };

    let obligation = ctx.registry.update(id, update, now)?;

    let timing = if obligation.paid_late() {
        "late"
    } else {
        "on time"
    };
    println!(
        "✅ {} paid on {} ({}, {} total)",
        obligation.id,
        paid_on,
        timing,
        obligation.total_amount()
    );
    Ok(())
}

/// Cancel an obligation
pub async fn obligation_cancel(
    ctx: &mut AppContext,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let obligation = ctx.registry.cancel(id, now)?;
    println!("✅ Cancelled {}", obligation.id);
    Ok(())
}

/// Correct a mistyped due date
pub async fn obligation_correct_due(
    ctx: &mut AppContext,
    id: &str,
    due: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let obligation = ctx.registry.correct_due_date(id, due, now)?;
    println!("✅ {} now due {}", obligation.id, obligation.due_date);
    Ok(())
}

/// Show one obligation in full
pub async fn obligation_show(
    ctx: &AppContext,
    id: &str,
    today: NaiveDate,
) -> Result<(), anyhow::Error> {
    let obligation = ctx.registry.get(id)?;

    println!("{}", obligation.id);
    println!("  client:   {}", obligation.client_id);
    println!("  type:     {}", obligation.type_code);
    println!("  state:    {}", obligation.state);
    println!("  priority: {}", obligation.priority);
    println!(
        "  due:      {} ({})",
        obligation.due_date,
        alert_cell(&obligation, today)
    );
    println!(
        "  amount:   {} (base {} + penalties {})",
        obligation.total_amount(),
        obligation.base_amount,
        obligation.penalty_amount
    );
    if let Some(paid_on) = obligation.payment_date {
        let timing = if obligation.paid_late() {
            " (late)"
        } else {
            ""
        };
        println!("  paid:     {}{}", paid_on, timing);
    }
    if let Some(ref reference) = obligation.payment_reference {
        println!("  ref:      {}", reference);
    }
    if let Some(ref notes) = obligation.notes {
        println!("  notes:    {}", notes);
    }
    Ok(())
}

/// List obligations matching the filters
#[allow(clippy::too_many_arguments)]
pub async fn obligation_list(
    ctx: &AppContext,
    client: Option<String>,
    type_code: Option<String>,
    periodicity: Option<Periodicity>,
    state: Option<ObligationState>,
    overdue_only: bool,
    min_alert: Option<AlertLevel>,
    limit: Option<usize>,
    offset: usize,
    today: NaiveDate,
) -> Result<(), anyhow::Error> {
    let filter = ObligationFilter {
        client_id: client,
        type_code,
        periodicity,
        state,
        overdue_only,
        min_alert,
        limit,
        offset,
    };

    let obligations = ctx.registry.list(&filter, today)?;
    print_obligation_table(&obligations, today);
    Ok(())
}

fn print_obligation_table(obligations: &[Obligation], today: NaiveDate) {
    if obligations.is_empty() {
        println!("No obligations found");
        return;
    }

    println!("Obligations ({}):", obligations.len());
    println!("{:-<86}", "");
    println!(
        "{:<14} | {:<10} | {:<8} | {:<10} | {:<11} | {:>12} | {}",
        "ID", "Client", "Type", "Due", "State", "Amount", "Alert"
    );
    println!("{:-<86}", "");

    for obligation in obligations {
        println!(
            "{:<14} | {:<10} | {:<8} | {:<10} | {:<11} | {:>12} | {}",
            obligation.id,
            obligation.client_id,
            obligation.type_code,
            obligation.due_date,
            obligation.state.to_string(),
            obligation.total_amount().to_string(),
            alert_cell(obligation, today),
        );
    }
}

fn alert_cell(obligation: &Obligation, today: NaiveDate) -> String {
    if obligation.is_settled() {
        return "settled".to_string();
    }
    let days = obligation.days_until_due(today);
    if days < 0 {
        format!("{} ({} days overdue)", obligation.alert_level(today), -days)
    } else {
        format!("{} ({} days left)", obligation.alert_level(today), days)
    }
}

// === Alerts ===

/// Aggregate open obligations into alert buckets
pub async fn alerts_summary(
    ctx: &AppContext,
    client: Option<&str>,
    today: NaiveDate,
) -> Result<(), anyhow::Error> {
    let summary = ctx.registry.alerts_summary(client, today)?;

    match client {
        Some(client) => println!("Alerts for {} (as of {}):", client, today),
        None => println!("Alerts (as of {}):", today),
    }
    println!(
        "  overdue:  {:>4}  ({} due)",
        summary.overdue.count, summary.overdue.total_amount
    );
    println!(
        "  urgent:   {:>4}  ({} due)",
        summary.urgent.count, summary.urgent.total_amount
    );
    println!(
        "  upcoming: {:>4}  ({} due)",
        summary.upcoming.count, summary.upcoming.total_amount
    );
    println!("  total:    {:>4}", summary.total_count());
    Ok(())
}

/// List obligations at or above an alert level
pub async fn alerts_list(
    ctx: &AppContext,
    client: Option<String>,
    min_alert: AlertLevel,
    today: NaiveDate,
) -> Result<(), anyhow::Error> {
    let filter = ObligationFilter {
        client_id: client,
        min_alert: Some(min_alert),
        ..Default::default()
    };

    let obligations = ctx.registry.list(&filter, today)?;
    print_obligation_table(&obligations, today);
    Ok(())
}

// === Risk ===

/// Recompute risk snapshots (one client, or everyone)
pub async fn risk_recompute(
    ctx: &AppContext,
    client: Option<&str>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    match client {
        Some(client) => {
            let snapshot = ctx.recompute_risk(client, today, now).await?;
            println!(
                "✅ {}: score {} ({})",
                snapshot.client_id, snapshot.score, snapshot.level
            );
        }
        None => {
            let snapshots = ctx.recompute_all(today, now).await?;
            println!("✅ Recomputed {} clients", snapshots.len());
            for snapshot in &snapshots {
                println!(
                    "   {:<12} score {:>3} ({})",
                    snapshot.client_id, snapshot.score, snapshot.level
                );
            }
        }
    }
    Ok(())
}

/// Show a client's stored risk snapshot
pub async fn risk_show(ctx: &AppContext, client: &str) -> Result<(), anyhow::Error> {
    let Some(snapshot) = ctx.snapshots.get(client).await? else {
        println!("No risk snapshot for {} (run `risk recompute`)", client);
        return Ok(());
    };

    println!("{}", snapshot.client_id);
    println!("  score:      {} ({})", snapshot.score, snapshot.level);
    println!(
        "  late:       {} obligations, {} due",
        snapshot.late_obligations_count, snapshot.late_obligations_amount
    );
    println!("  penalties:  {}", snapshot.total_penalties_amount);
    println!(
        "  avg delay:  {} days",
        snapshot.average_payment_delay_days
    );
    println!("  compliance: {}%", snapshot.compliance_rate);
    println!(
        "  window:     {} months, computed {}",
        snapshot.window_months, snapshot.computed_at
    );
    Ok(())
}

/// List every stored snapshot, riskiest first
pub async fn risk_list(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let snapshots = ctx.snapshots.list().await?;

    if snapshots.is_empty() {
        println!("No risk snapshots (run `risk recompute`)");
        return Ok(());
    }

    println!("Risk snapshots ({}):", snapshots.len());
    println!("{:-<70}", "");
    println!(
        "{:<12} | {:>5} | {:<8} | {:>4} | {:>9} | {:>10}",
        "Client", "Score", "Level", "Late", "Avg delay", "Compliance"
    );
    println!("{:-<70}", "");

    for snapshot in &snapshots {
        println!(
            "{:<12} | {:>5} | {:<8} | {:>4} | {:>9} | {:>9}%",
            snapshot.client_id,
            snapshot.score,
            snapshot.level.to_string(),
            snapshot.late_obligations_count,
            snapshot.average_payment_delay_days,
            snapshot.compliance_rate,
        );
    }
    Ok(())
}

// === Delegations ===

/// Draft a new payment delegation
#[allow(clippy::too_many_arguments)]
pub async fn delegation_create(
    ctx: &mut AppContext,
    client: &str,
    types: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
    max_payment: Option<Decimal>,
    max_month: Option<Decimal>,
    method: Option<PaymentMethod>,
    require_validation: bool,
    validation_delay: Option<i64>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let new = NewDelegation {
        client_id: client.to_string(),
        delegated_types: types.split(',').map(str::to_string).collect(),
        start_date: Some(start),
        end_date: end,
        max_amount_per_payment: spending_limit(max_payment)?,
        max_amount_per_month: spending_limit(max_month)?,
        payment_method: method,
        require_client_validation: require_validation,
        validation_delay_hours: validation_delay.unwrap_or(72),
        notes,
    };

    let delegation = ctx.delegations.create(new, now)?;

    println!(
        "✅ Created delegation {} for {} covering [{}]",
        delegation.id,
        delegation.client_id,
        delegation.delegated_types.join(", ")
    );
    Ok(())
}

fn spending_limit(value: Option<Decimal>) -> Result<SpendingLimit, anyhow::Error> {
    match value {
        Some(value) => Ok(SpendingLimit::try_from(value)?),
        None => Ok(SpendingLimit::Unlimited),
    }
}

/// Freeze the terms and submit for signature
pub async fn delegation_submit(
    ctx: &mut AppContext,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let delegation = ctx.delegations.submit(id, now)?;
    println!(
        "✅ {} submitted for signature (terms {})",
        delegation.id,
        delegation.terms_hash.as_deref().unwrap_or("-")
    );
    Ok(())
}

/// Record one party's signature
pub async fn delegation_sign(
    ctx: &mut AppContext,
    id: &str,
    party: Party,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let delegation = ctx.delegations.sign(id, party, now)?;

    if delegation.state == fisca_delegation::DelegationState::Active {
        println!("✅ {} signed by {}; fully signed, now active", id, party);
    } else {
        println!("✅ {} signed by {} (state: {})", id, party, delegation.state);
    }
    Ok(())
}

/// Pause an active delegation
pub async fn delegation_suspend(
    ctx: &mut AppContext,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let delegation = ctx.delegations.suspend(id, now)?;
    println!("✅ {} suspended", delegation.id);
    Ok(())
}

/// Resume a suspended delegation
pub async fn delegation_reactivate(
    ctx: &mut AppContext,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let delegation = ctx.delegations.reactivate(id, now)?;
    println!("✅ {} active again", delegation.id);
    Ok(())
}

/// Revoke a delegation for good
pub async fn delegation_revoke(
    ctx: &mut AppContext,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let delegation = ctx.delegations.revoke(id, now)?;
    println!("✅ {} revoked", delegation.id);
    Ok(())
}

/// Re-evaluate one delegation against the calendar
pub async fn delegation_refresh(
    ctx: &mut AppContext,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let delegation = ctx.delegations.refresh(id, now)?;
    println!("✅ {} (state: {})", delegation.id, delegation.state);
    Ok(())
}

/// Expire every delegation whose window has closed
pub async fn delegation_sweep(
    ctx: &mut AppContext,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let expired = ctx.delegations.expire_sweep(now)?;
    println!("✅ Expired {} delegations", expired);
    Ok(())
}

/// Edit a delegation (full edit in draft, notes only after)
#[allow(clippy::too_many_arguments)]
pub async fn delegation_update(
    ctx: &mut AppContext,
    id: &str,
    types: Option<String>,
    end: Option<NaiveDate>,
    max_payment: Option<Decimal>,
    max_month: Option<Decimal>,
    require_validation: Option<bool>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let update = DelegationUpdate {
        delegated_types: types.map(|t| t.split(',').map(str::to_string).collect()),
        end_date: end,
        max_amount_per_payment: max_payment.map(SpendingLimit::try_from).transpose()?,
        max_amount_per_month: max_month.map(SpendingLimit::try_from).transpose()?,
        require_client_validation: require_validation,
        notes,
        ..Default::default()
    };

    let delegation = ctx.delegations.update(id, update, now)?;
    println!("✅ Updated {} (state: {})", delegation.id, delegation.state);
    Ok(())
}

/// Show one delegation in full
pub async fn delegation_show(ctx: &AppContext, id: &str) -> Result<(), anyhow::Error> {
    let delegation = ctx.delegations.get(id)?;

    println!("{}", delegation.id);
    println!("  client:      {}", delegation.client_id);
    println!("  state:       {}", delegation.state);
    println!("  types:       [{}]", delegation.delegated_types.join(", "));
    let end = delegation
        .end_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "open".to_string());
    println!("  window:      {} .. {}", delegation.start_date, end);
    println!(
        "  limits:      {} per payment, {} per month",
        delegation.max_amount_per_payment, delegation.max_amount_per_month
    );
    if delegation.require_client_validation {
        println!(
            "  validation:  required, {}h to answer",
            delegation.validation_delay_hours
        );
    }
    println!(
        "  signatures:  client {} / accountant {}",
        signature_cell(delegation.signature_of(Party::Client)),
        signature_cell(delegation.signature_of(Party::Accountant)),
    );
    if let Some(ref hash) = delegation.terms_hash {
        println!("  terms:       {}", hash);
    }
    if let Some(ref notes) = delegation.notes {
        println!("  notes:       {}", notes);
    }
    Ok(())
}

fn signature_cell(record: Option<&fisca_delegation::SignatureRecord>) -> String {
    match record {
        Some(record) => format!("signed {}", record.signed_at.date_naive()),
        None => "unsigned".to_string(),
    }
}

/// List delegations, optionally for one client
pub async fn delegation_list(
    ctx: &AppContext,
    client: Option<&str>,
) -> Result<(), anyhow::Error> {
    let delegations = ctx.delegations.list(client)?;

    if delegations.is_empty() {
        println!("No delegations found");
        return Ok(());
    }

    println!("Delegations ({}):", delegations.len());
    println!("{:-<92}", "");
    println!(
        "{:<14} | {:<10} | {:<9} | {:<23} | {:>12} | {:>12}",
        "ID", "Client", "State", "Window", "Per payment", "Per month"
    );
    println!("{:-<92}", "");

    for delegation in &delegations {
        let end = delegation
            .end_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "open".to_string());
        println!(
            "{:<14} | {:<10} | {:<9} | {:<23} | {:>12} | {:>12}",
            delegation.id,
            delegation.client_id,
            delegation.state.to_string(),
            format!("{} .. {}", delegation.start_date, end),
            delegation.max_amount_per_payment.to_string(),
            delegation.max_amount_per_month.to_string(),
        );
    }
    Ok(())
}

// === Payments ===

/// Ask the guard to authorize a payment
pub async fn pay_request(
    ctx: &mut AppContext,
    delegation_id: &str,
    obligation_id: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let proposed = Amount::new(amount)?;
    let decision = ctx.authorize_payment(delegation_id, obligation_id, proposed, now)?;

    match decision.outcome {
        DecisionOutcome::Allowed => {
            println!(
                "✅ Authorized {} for {} ({})",
                decision.amount,
                decision.obligation_id,
                decision.reason.as_str()
            );
        }
        DecisionOutcome::PendingValidation => {
            println!(
                "⏳ Awaiting client validation (request {})",
                decision.validation_request_id.as_deref().unwrap_or("-")
            );
        }
        DecisionOutcome::Denied => {
            println!("❌ Denied: {}", decision.reason.as_str());
        }
    }
    println!("   decision {}", decision.id);
    Ok(())
}

/// Record the client's answer to a validation request
pub async fn pay_resolve(
    ctx: &mut AppContext,
    request_id: &str,
    approve: bool,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let decision = ctx.guard.resolve_validation(request_id, approve, now)?;

    match decision.outcome {
        DecisionOutcome::Allowed => {
            println!("✅ Validation approved; payment authorized ({})", decision.id);
        }
        _ => {
            println!(
                "❌ Payment not authorized: {} ({})",
                decision.reason.as_str(),
                decision.id
            );
        }
    }
    Ok(())
}

/// Expire overdue validation requests, releasing their holds
pub async fn pay_expire(ctx: &mut AppContext, now: DateTime<Utc>) -> Result<(), anyhow::Error> {
    let expired = ctx.guard.expire_validations(now)?;
    println!("✅ Expired {} validation requests", expired.len());
    Ok(())
}

/// List validation requests still waiting on the client
pub async fn pay_pending(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let pending = ctx.guard.pending_validations()?;

    if pending.is_empty() {
        println!("No pending validation requests");
        return Ok(());
    }

    println!("Pending validation requests ({}):", pending.len());
    for request in &pending {
        println!(
            "  {} {} for {} ({} due, answer by {})",
            request.id, request.delegation_id, request.obligation_id, request.amount,
            request.deadline
        );
    }
    Ok(())
}

/// Show how much of a delegation's monthly budget is held
pub async fn pay_month(
    ctx: &AppContext,
    delegation_id: &str,
    month: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let month = month.unwrap_or_else(|| month_key(now.date_naive()));
    let held = ctx.guard.month_to_date(delegation_id, &month)?;
    println!("{} held for {} in {}", held, delegation_id, month);
    Ok(())
}

// === Audit ===

/// Dump the decision log as JSON lines
pub async fn audit_decisions(ctx: &AppContext, tail: Option<usize>) -> Result<(), anyhow::Error> {
    let decisions = ctx.guard.log().read_all()?;

    if decisions.is_empty() {
        println!("No decisions logged");
        return Ok(());
    }

    let start = tail
        .map(|n| decisions.len().saturating_sub(n))
        .unwrap_or(0);
    for decision in &decisions[start..] {
        println!("{}", serde_json::to_string(decision)?);
    }
    Ok(())
}
