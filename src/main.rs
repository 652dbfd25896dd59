use std::sync::Arc;

use outreach_assist::assistant::{AssistantClient, Classifier};
use outreach_assist::campaign::Campaign;
use outreach_assist::config::Config;
use outreach_assist::crm::{CrmClient, LeadStore};
use outreach_assist::mail::{ImapInbox, MailSender, MailSource, Mailer};
use outreach_assist::pipeline::InboundPipeline;
use outreach_assist::{logging, scheduler, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let _log_guard = logging::init("logs");

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📬 Outreach Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   IMAP: {}:{} (mailbox: {})",
        config.mail.imap_host, config.mail.imap_port, config.mail.mailbox
    );
    eprintln!(
        "   SMTP: {}:{} (from: {})",
        config.mail.smtp_host,
        config.mail.smtp_port,
        config.mail.from_header()
    );
    eprintln!("   CRM module: {}", config.crm.module);
    eprintln!("   Subject filter: {}", config.mail.subject_filter);
    eprintln!("   HTTP: http://0.0.0.0:{}\n", config.http.port);

    // ── Services ─────────────────────────────────────────────────────
    let leads: Arc<dyn LeadStore> = Arc::new(CrmClient::new(config.crm.clone()));
    let mailer: Arc<dyn Mailer> = Arc::new(MailSender::new(config.mail.clone()));
    let source: Arc<dyn MailSource> = Arc::new(ImapInbox::new(config.mail.clone()));
    let classifier: Arc<dyn Classifier> = Arc::new(AssistantClient::new(config.assistant.clone()));

    let pipeline = Arc::new(InboundPipeline::new(
        source,
        Arc::clone(&mailer),
        classifier,
        Arc::clone(&leads),
    ));
    let campaign = Arc::new(Campaign::new(Arc::clone(&leads), Arc::clone(&mailer)));

    // ── Background jobs ─────────────────────────────────────────────
    let _followup_job =
        scheduler::spawn_followup_job(Arc::clone(&campaign), &config.schedule.followup_cron)?;
    let _inbound_job = scheduler::spawn_inbound_job(Arc::clone(&pipeline), config.schedule.clone());

    // ── Control surface ─────────────────────────────────────────────
    let app = server::routes(campaign);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http.port)).await?;
    tracing::info!(port = config.http.port, "Control server started");
    axum::serve(listener, app).await?;

    Ok(())
}
