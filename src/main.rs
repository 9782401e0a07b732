use std::sync::Arc;

use anyhow::Context;

use lead_intake::agent::{Agent, AgentDeps};
use lead_intake::channels::CliChannel;
use lead_intake::config::{DialogueConfig, SessionConfig};
use lead_intake::crm::OdooClient;
use lead_intake::llm::{LlmBackend, LlmConfig, create_provider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let session_config = match SessionConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("  export GEMINI_API_KEY=...");
            eprintln!("  export ODOO_PASSWORD=...");
            std::process::exit(1);
        }
    };
    let dialogue_config = DialogueConfig::from_env().context("invalid LEAD_INTAKE_* setting")?;

    eprintln!("Lead intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", dialogue_config.model);
    eprintln!(
        "   Odoo: {} (db: {}, user: {})",
        session_config.odoo_url, session_config.odoo_db, session_config.odoo_user
    );

    let llm = create_provider(&LlmConfig {
        backend: LlmBackend::Gemini,
        api_key: session_config.gemini_api_key.clone(),
        model: dialogue_config.model.clone(),
        base_url: None,
    })?;

    let odoo = Arc::new(OdooClient::from_config(&session_config)?);
    match odoo.server_version().await {
        Ok(version) => eprintln!("   Odoo server: {}", version),
        Err(e) => {
            tracing::warn!(error = %e, "Odoo is not reachable yet; submissions may fail");
            eprintln!("   Odoo server: unreachable ({})", e);
        }
    }

    eprintln!("   Type a message and press Enter. /help for commands, /quit to exit.\n");
    eprintln!("Hi! I can register your request with our team. What's your name?");

    let agent = Agent::new(
        dialogue_config,
        AgentDeps { llm, crm: odoo },
        Box::new(CliChannel::new()),
    );
    agent.run().await?;

    Ok(())
}
