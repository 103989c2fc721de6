use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::domain::order_state_for;
use crate::ports::TransactionLedger;

#[derive(Parser)]
#[command(name = "threeds-reconciler")]
#[command(about = "3-D Secure callback reconciliation and result delivery", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction inspection and repair commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Print a payment transaction and its order
    Show {
        #[arg(value_name = "CONVERSATION_ID")]
        conversation_id: String,
    },

    /// Re-derive the order state from a terminal transaction
    SyncOrder {
        #[arg(value_name = "CONVERSATION_ID")]
        conversation_id: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_show(
    ledger: &dyn TransactionLedger,
    conversation_id: &str,
) -> anyhow::Result<()> {
    let tx = ledger
        .find_by_conversation_id(conversation_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Transaction {} not found", conversation_id))?;
    let order = ledger.find_order(&tx.order_number).await?;

    println!("Transaction {}", tx.conversation_id);
    println!("  Order:         {}", tx.order_number);
    println!("  Status:        {}", tx.status);
    println!("  Payment ID:    {}", tx.payment_id.as_deref().unwrap_or("-"));
    if let Some(code) = &tx.error_code {
        println!(
            "  Error:         {} ({})",
            code,
            tx.error_message.as_deref().unwrap_or("")
        );
    }
    if let Some(at) = tx.completed_at {
        println!("  Completed at:  {}", at.to_rfc3339());
    }
    match order {
        Some(order) => println!(
            "  Order state:   {} / {}",
            order.status, order.payment_status
        ),
        None => println!("  Order state:   <missing>"),
    }
    Ok(())
}

/// Repairs an order whose state drifted from its terminal transaction.
pub async fn handle_tx_sync_order(
    ledger: &dyn TransactionLedger,
    conversation_id: &str,
) -> anyhow::Result<()> {
    let tx = ledger
        .find_by_conversation_id(conversation_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Transaction {} not found", conversation_id))?;

    if !tx.status.is_terminal() {
        anyhow::bail!(
            "Transaction {} is still {}; nothing to sync",
            conversation_id,
            tx.status
        );
    }

    let (status, payment_status) = order_state_for(tx.status);
    ledger
        .update_order(&tx.order_number, status, payment_status)
        .await?;

    tracing::info!(
        conversation_id = %conversation_id,
        order_number = %tx.order_number,
        "Order state synchronised from transaction"
    );
    println!(
        "✓ Order {} set to {} / {}",
        tx.order_number, status, payment_status
    );
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    crate::startup::validate_env_vars(config)?;

    println!("Configuration:");
    println!("  Server Port:      {}", config.server_port);
    println!("  Database URL:     {}", mask_password(&config.database_url));
    println!("  Gateway Mode:     {}", config.gateway_mode);
    println!("  Gateway URL:      {}", config.gateway_base_url);
    println!(
        "  Signature Secret: {}",
        if config.gateway_signature_secret.is_some() {
            "configured"
        } else {
            "not set"
        }
    );
    println!("  Return URL:       {}", config.return_base_url);
    println!("  Gateway Timeout:  {}s", config.gateway_timeout_secs);
    println!("  Ledger Timeout:   {}s", config.ledger_timeout_secs);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
