use std::sync::Arc;

use chrono::Utc;
use inbox_pilot::approval::ApprovalWorkflow;
use inbox_pilot::channels::{
    DisabledTransport, EmailTransport, HttpSmsSender, SmsConfig, SmsTransport, SmtpConfig,
    SmtpMailer,
};
use inbox_pilot::config::{AppConfig, LlmSettings};
use inbox_pilot::delivery::DeliveryEngine;
use inbox_pilot::drip::{DripScheduler, SequenceLibrary};
use inbox_pilot::index::MemoryIndex;
use inbox_pilot::knowledge::KnowledgeIndexer;
use inbox_pilot::llm;
use inbox_pilot::pipeline::InboundPipeline;
use inbox_pilot::responder::{EscalationRules, Responder};
use inbox_pilot::server::{self, AppState};
use inbox_pilot::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(AppConfig::from_env());
    let llm_settings = LlmSettings::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export LLM_API_KEY=sk-...");
        std::process::exit(1);
    });

    let (completion, embeddings) = llm::create_clients(&llm_settings)?;

    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(MemoryIndex::new());

    let email: Arc<dyn EmailTransport> = match SmtpConfig::from_env() {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)),
        None => {
            tracing::warn!("SMTP not configured; email sending disabled");
            Arc::new(DisabledTransport::email())
        }
    };
    let sms: Arc<dyn SmsTransport> = match SmsConfig::from_env() {
        Some(cfg) => Arc::new(HttpSmsSender::new(cfg)),
        None => {
            tracing::warn!("SMS provider not configured; SMS sending disabled");
            Arc::new(DisabledTransport::sms())
        }
    };

    let indexer = Arc::new(KnowledgeIndexer::new(embeddings.clone(), index.clone()));
    let responder = Arc::new(Responder::new(
        completion,
        embeddings,
        index,
        EscalationRules::default(),
        config.responder.clone(),
    ));
    let delivery = Arc::new(DeliveryEngine::new(
        store.clone(),
        email.clone(),
        sms.clone(),
    ));
    let pipeline = Arc::new(InboundPipeline::new(
        store.clone(),
        responder,
        delivery,
        config.clone(),
    ));
    let approvals = Arc::new(ApprovalWorkflow::new(
        store.clone(),
        email.clone(),
        sms.clone(),
    ));
    let scheduler = Arc::new(DripScheduler::new(
        store.clone(),
        email,
        SequenceLibrary::with_defaults(),
        config.drip.clone(),
    ));

    // ── Drip tick loop ──────────────────────────────────────────────
    let schedule = config.drip.schedule()?;
    let tick_scheduler = scheduler.clone();
    tokio::spawn(async move {
        for next in schedule.upcoming(Utc) {
            let wait = next - Utc::now();
            if let Ok(wait) = wait.to_std() {
                tokio::time::sleep(wait).await;
            }
            if let Err(e) = tick_scheduler.tick(Utc::now()).await {
                tracing::error!(error = %e, "Drip tick failed");
            }
        }
    });

    // ── HTTP server ─────────────────────────────────────────────────
    let app = server::router(AppState {
        pipeline,
        approvals,
        scheduler,
        indexer,
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Inbox Pilot listening");
    axum::serve(listener, app).await?;

    Ok(())
}
