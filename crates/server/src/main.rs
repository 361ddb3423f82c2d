use lettre::{AsyncSmtpTransport, Tokio1Executor, transport::smtp::authentication::Credentials};
use membership_comms::AppResources;
use membership_comms::api::start_webserver;
use membership_comms::automation::schedulers::{
    start_campaign_scheduler, start_inactivity_scheduler, start_whatsapp_reminder_scheduler,
};
use membership_comms::config::load_config_or_panic;
use membership_comms::mailer::{EmailTransport, SmtpMailer};
use rustls::crypto;
use rustls::crypto::CryptoProvider;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "membership_comms=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");
    dotenvy::dotenv().ok();

    initialize_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());

    let ring_provider = crypto::ring::default_provider();
    CryptoProvider::install_default(ring_provider).expect("Failed to install crypto provider");

    // Set up SeaORM database connection
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    // Set up lettre SMTP client behind the transport seam
    let creds = Credentials::new(config.smtp.username.clone(), config.smtp.password.clone());
    let smtp = Arc::new(
        AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp.server)
            .expect("Invalid SMTP relay host")
            .port(config.smtp.port)
            .credentials(creds)
            .build(),
    );
    let mailer: Arc<dyn EmailTransport> = Arc::new(
        SmtpMailer::new(smtp, &config.smtp.from, &config.smtp.provider)
            .expect("Invalid smtp.from address"),
    );

    if !mailer.validate_connection().await {
        tracing::warn!(
            name = "startup.smtp_unreachable",
            smtp_server = %config.smtp.server,
            message = "SMTP connection check failed, sends will be retried per policy"
        );
    }

    let resources = Arc::new(AppResources { db, mailer, config });
    tracing::info!(
        environment = %resources.config.environment,
        production = resources.config.is_production(),
        "scheduler configuration"
    );

    // Background timers: campaign sender plus the two population scanners.
    start_campaign_scheduler(resources.clone());
    start_inactivity_scheduler(resources.clone());
    start_whatsapp_reminder_scheduler(resources.clone());

    start_webserver((*resources).clone()).await?;
    Ok(())
}
