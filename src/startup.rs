use anyhow::{Context, Result};

use crate::config::{Config, GatewayMode};
use crate::ports::TransactionLedger;

pub struct ValidationReport {
    pub environment: bool,
    pub ledger: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.ledger
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Ledger Connectivity:   {}", status(self.ledger));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(
    config: &Config,
    ledger: &dyn TransactionLedger,
) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        ledger: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }

    if let Err(e) = ledger.ping().await {
        report.ledger = false;
        report.errors.push(format!("Ledger: {}", e));
    }

    report
}

pub fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.gateway_mode == GatewayMode::Live && config.gateway_signature_secret.is_none() {
        anyhow::bail!("GATEWAY_SIGNATURE_SECRET is required when GATEWAY_MODE=live");
    }
    if config.gateway_timeout_secs == 0 || config.ledger_timeout_secs == 0 {
        anyhow::bail!("GATEWAY_TIMEOUT_SECS and LEDGER_TIMEOUT_SECS must be greater than 0");
    }

    url::Url::parse(&config.gateway_base_url).context("GATEWAY_BASE_URL is not a valid URL")?;
    let return_url =
        url::Url::parse(&config.return_base_url).context("RETURN_BASE_URL is not a valid URL")?;
    if return_url.cannot_be_a_base() {
        anyhow::bail!("RETURN_BASE_URL must be an absolute http(s) URL");
    }

    Ok(())
}
