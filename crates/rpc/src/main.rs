//! Fisca CLI - Main entry point

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use fisca_alerts::AlertLevel;
use fisca_core::{PaidBy, PaymentMethod, Periodicity};
use fisca_delegation::Party;
use fisca_registry::{ObligationState, Priority};
use fisca_rpc::{commands, AppContext};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fisca")]
#[command(about = "Fisca - Fiscal obligation back-office", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage fiscal obligations
    #[command(subcommand)]
    Obligation(ObligationCommands),

    /// Due-date alerts
    #[command(subcommand)]
    Alerts(AlertCommands),

    /// Client risk scoring
    #[command(subcommand)]
    Risk(RiskCommands),

    /// Payment delegations
    #[command(subcommand)]
    Delegation(DelegationCommands),

    /// Payment authorization
    #[command(subcommand)]
    Pay(PayCommands),

    /// Audit trails
    #[command(subcommand)]
    Audit(AuditCommands),
}

#[derive(Subcommand)]
enum ObligationCommands {
    /// Register a new obligation
    Create {
        /// Obligation type code (e.g. tva, urssaf)
        type_code: String,
        /// Client ID
        client: String,
        /// Statutory due date (YYYY-MM-DD)
        due: NaiveDate,
        /// Amount due
        amount: Decimal,
        /// Priority (low, normal, high)
        #[arg(long)]
        priority: Option<Priority>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Update an open obligation
    Update {
        id: String,
        /// New lifecycle state (draft, todo, in_progress, waiting)
        #[arg(long)]
        state: Option<ObligationState>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        base_amount: Option<Decimal>,
        /// Accrued penalties and surcharges
        #[arg(long)]
        penalty: Option<Decimal>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Record a payment, settling the obligation
    Pay {
        id: String,
        /// Date the payment went out (YYYY-MM-DD)
        paid_on: NaiveDate,
        /// Payment method (direct_debit, bank_transfer, check, card)
        #[arg(long)]
        method: Option<PaymentMethod>,
        /// Who paid (client, delegated_accountant)
        #[arg(long)]
        by: Option<PaidBy>,
        /// Payment reference
        #[arg(long)]
        reference: Option<String>,
    },

    /// Cancel an obligation
    Cancel { id: String },

    /// Correct a mistyped due date
    CorrectDue { id: String, due: NaiveDate },

    /// Show one obligation
    Show { id: String },

    /// List obligations
    List {
        #[arg(long)]
        client: Option<String>,
        #[arg(long = "type")]
        type_code: Option<String>,
        /// Filter by type recurrence (one_time, monthly, quarterly, annual)
        #[arg(long)]
        periodicity: Option<Periodicity>,
        #[arg(long)]
        state: Option<ObligationState>,
        /// Only unsettled obligations past their due date
        #[arg(long)]
        overdue: bool,
        /// Only obligations at or above this alert level
        #[arg(long)]
        min_alert: Option<AlertLevel>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
}

#[derive(Subcommand)]
enum AlertCommands {
    /// Bucket counts: overdue / urgent / upcoming
    Summary {
        #[arg(long)]
        client: Option<String>,
    },

    /// List obligations needing attention
    List {
        #[arg(long)]
        client: Option<String>,
        /// Lowest alert level to include
        #[arg(long, default_value = "warning")]
        min: AlertLevel,
    },
}

#[derive(Subcommand)]
enum RiskCommands {
    /// Recompute snapshots (one client, or everyone)
    Recompute {
        #[arg(long)]
        client: Option<String>,
    },

    /// Show a client's stored snapshot
    Show { client: String },

    /// List snapshots, riskiest first
    List,
}

#[derive(Subcommand)]
enum DelegationCommands {
    /// Draft a new payment delegation
    Create {
        client: String,
        /// Covered type codes, comma separated
        types: String,
        /// First day of validity (YYYY-MM-DD)
        start: NaiveDate,
        /// Last day of validity (omit for open-ended)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Per-payment cap (omit for unlimited)
        #[arg(long)]
        max_payment: Option<Decimal>,
        /// Monthly cap (omit for unlimited)
        #[arg(long)]
        max_month: Option<Decimal>,
        /// Payment method the firm will use
        #[arg(long)]
        method: Option<PaymentMethod>,
        /// Pause each payment for the client's explicit ok
        #[arg(long)]
        require_validation: bool,
        /// Hours the client has to answer
        #[arg(long)]
        validation_delay: Option<i64>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Freeze the terms and submit for signature
    Submit { id: String },

    /// Record a signature (client, accountant)
    Sign { id: String, party: Party },

    /// Pause an active delegation
    Suspend { id: String },

    /// Resume a suspended delegation
    Reactivate { id: String },

    /// Revoke a delegation for good
    Revoke { id: String },

    /// Re-evaluate one delegation against the calendar
    Refresh { id: String },

    /// Expire every delegation whose window has closed
    Sweep,

    /// Edit a delegation (full edit in draft, notes only after)
    Update {
        id: String,
        #[arg(long)]
        types: Option<String>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        max_payment: Option<Decimal>,
        #[arg(long)]
        max_month: Option<Decimal>,
        #[arg(long)]
        require_validation: Option<bool>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show one delegation
    Show { id: String },

    /// List delegations
    List {
        #[arg(long)]
        client: Option<String>,
    },
}

#[derive(Subcommand)]
enum PayCommands {
    /// Ask the guard to authorize a payment
    Request {
        delegation: String,
        obligation: String,
        amount: Decimal,
    },

    /// Approve a pending validation request
    Approve { request: String },

    /// Decline a pending validation request
    Decline { request: String },

    /// Expire overdue validation requests
    Expire,

    /// List validation requests waiting on the client
    Pending,

    /// Held amount for a delegation's month
    Month {
        delegation: String,
        /// Budget month (YYYY-MM), defaults to the current one
        #[arg(long)]
        month: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Dump the decision log as JSON lines
    Decisions {
        /// Only the last N decisions
        #[arg(long)]
        tail: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // Create application context
    let mut ctx = AppContext::new(&cli.data).await?;

    let now = Utc::now();
    let today = now.date_naive();

    match cli.command {
        Commands::Obligation(command) => match command {
            ObligationCommands::Create {
                type_code,
                client,
                due,
                amount,
                priority,
                notes,
            } => {
                commands::obligation_create(
                    &mut ctx, &type_code, &client, due, amount, priority, notes, now,
                )
                .await?;
            }

            ObligationCommands::Update {
                id,
                state,
                priority,
                base_amount,
                penalty,
                notes,
            } => {
                commands::obligation_update(
                    &mut ctx,
                    &id,
                    state,
                    priority,
                    base_amount,
                    penalty,
                    notes,
                    now,
                )
                .await?;
            }

            ObligationCommands::Pay {
                id,
                paid_on,
                method,
                by,
                reference,
            } => {
                commands::obligation_pay(&mut ctx, &id, paid_on, method, by, reference, now)
                    .await?;
            }

            ObligationCommands::Cancel { id } => {
                commands::obligation_cancel(&mut ctx, &id, now).await?;
            }

            ObligationCommands::CorrectDue { id, due } => {
                commands::obligation_correct_due(&mut ctx, &id, due, now).await?;
            }

            ObligationCommands::Show { id } => {
                commands::obligation_show(&ctx, &id, today).await?;
            }

            ObligationCommands::List {
                client,
                type_code,
                periodicity,
                state,
                overdue,
                min_alert,
                limit,
                offset,
            } => {
                commands::obligation_list(
                    &ctx,
                    client,
                    type_code,
                    periodicity,
                    state,
                    overdue,
                    min_alert,
                    limit,
                    offset,
                    today,
                )
                .await?;
            }
        },

        Commands::Alerts(command) => match command {
            AlertCommands::Summary { client } => {
                commands::alerts_summary(&ctx, client.as_deref(), today).await?;
            }

            AlertCommands::List { client, min } => {
                commands::alerts_list(&ctx, client, min, today).await?;
            }
        },

        Commands::Risk(command) => match command {
            RiskCommands::Recompute { client } => {
                commands::risk_recompute(&ctx, client.as_deref(), today, now).await?;
            }

            RiskCommands::Show { client } => {
                commands::risk_show(&ctx, &client).await?;
            }

            RiskCommands::List => {
                commands::risk_list(&ctx).await?;
            }
        },

        Commands::Delegation(command) => match command {
            DelegationCommands::Create {
                client,
                types,
                start,
                end,
                max_payment,
                max_month,
                method,
                require_validation,
                validation_delay,
                notes,
            } => {
                commands::delegation_create(
                    &mut ctx,
                    &client,
                    &types,
                    start,
                    end,
                    max_payment,
                    max_month,
                    method,
                    require_validation,
                    validation_delay,
                    notes,
                    now,
                )
                .await?;
            }

            DelegationCommands::Submit { id } => {
                commands::delegation_submit(&mut ctx, &id, now).await?;
            }

            DelegationCommands::Sign { id, party } => {
                commands::delegation_sign(&mut ctx, &id, party, now).await?;
            }

            DelegationCommands::Suspend { id } => {
                commands::delegation_suspend(&mut ctx, &id, now).await?;
            }

            DelegationCommands::Reactivate { id } => {
                commands::delegation_reactivate(&mut ctx, &id, now).await?;
            }

            DelegationCommands::Revoke { id } => {
                commands::delegation_revoke(&mut ctx, &id, now).await?;
            }

            DelegationCommands::Refresh { id } => {
                commands::delegation_refresh(&mut ctx, &id, now).await?;
            }

            DelegationCommands::Sweep => {
                commands::delegation_sweep(&mut ctx, now).await?;
            }

            DelegationCommands::Update {
                id,
                types,
                end,
                max_payment,
                max_month,
                require_validation,
                notes,
            } => {
                commands::delegation_update(
                    &mut ctx,
                    &id,
                    types,
                    end,
                    max_payment,
                    max_month,
                    require_validation,
                    notes,
                    now,
                )
                .await?;
            }

            DelegationCommands::Show { id } => {
                commands::delegation_show(&ctx, &id).await?;
            }

            DelegationCommands::List { client } => {
                commands::delegation_list(&ctx, client.as_deref()).await?;
            }
        },

        Commands::Pay(command) => match command {
            PayCommands::Request {
                delegation,
                obligation,
                amount,
            } => {
                commands::pay_request(&mut ctx, &delegation, &obligation, amount, now).await?;
            }

            PayCommands::Approve { request } => {
                commands::pay_resolve(&mut ctx, &request, true, now).await?;
            }

            PayCommands::Decline { request } => {
                commands::pay_resolve(&mut ctx, &request, false, now).await?;
            }

            PayCommands::Expire => {
                commands::pay_expire(&mut ctx, now).await?;
            }

            PayCommands::Pending => {
                commands::pay_pending(&ctx).await?;
            }

            PayCommands::Month { delegation, month } => {
                commands::pay_month(&ctx, &delegation, month, now).await?;
            }
        },

        Commands::Audit(command) => match command {
            AuditCommands::Decisions { tail } => {
                commands::audit_decisions(&ctx, tail).await?;
            }
        },
    }

    Ok(())
}
