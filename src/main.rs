use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use threeds_reconciler::adapters::{HttpChallengeCompleter, PostgresAuditLogger, PostgresLedger};
use threeds_reconciler::cli::{self, Cli, Commands, DbCommands, TxCommands};
use threeds_reconciler::config::{Config, LogFormat};
use threeds_reconciler::relay::RelayTimings;
use threeds_reconciler::use_cases::{ReconcileCallback, ReconcileSettings};
use threeds_reconciler::{create_app, db, startup, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
        Commands::Tx(command) => {
            let pool = db::create_pool(&config).await?;
            let ledger = PostgresLedger::new(pool);
            match command {
                TxCommands::Show { conversation_id } => {
                    cli::handle_tx_show(&ledger, &conversation_id).await
                }
                TxCommands::SyncOrder { conversation_id } => {
                    cli::handle_tx_sync_order(&ledger, &conversation_id).await
                }
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    startup::validate_env_vars(&config)?;
    let return_base_url = url::Url::parse(&config.return_base_url)?;

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let ledger = Arc::new(PostgresLedger::new(pool.clone()));
    let report = startup::validate_environment(&config, ledger.as_ref()).await;
    if !report.is_valid() {
        report.print();
        anyhow::bail!("startup validation failed");
    }

    let completer = Arc::new(HttpChallengeCompleter::new(
        config.gateway_base_url.clone(),
        config.gateway_api_key.clone(),
        config.gateway_timeout(),
    ));
    let audit = Arc::new(PostgresAuditLogger::new(pool));
    tracing::info!(
        mode = %config.gateway_mode,
        gateway = %config.gateway_base_url,
        "Gateway completer initialized"
    );

    let reconciler = Arc::new(ReconcileCallback::new(
        ledger.clone(),
        completer,
        audit,
        ReconcileSettings {
            mode: config.gateway_mode,
            signature_secret: config.gateway_signature_secret.clone(),
            ledger_timeout: config.ledger_timeout(),
            gateway_timeout: config.gateway_timeout(),
        },
    ));

    let app = create_app(AppState {
        ledger,
        reconciler,
        return_base_url,
        relay_timings: RelayTimings::default(),
        cors_allowed_origins: config.cors_allowed_origins.clone(),
        log_request_body: config.log_request_body,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
