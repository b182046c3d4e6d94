use reminder_buddy::{
    bot::{self, BotData, transport::DiscordTransport},
    config,
    core::{defaults, orchestrator::ReminderEngine},
    errors::{Error, Result},
    scheduler::ReminderScheduler,
};
use std::{env, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenvy::dotenv().ok();

    // 3. Engine settings and entity profiles
    let app_config = config::engine::load_default_config()
        .inspect_err(|e| error!(error = %e, "Failed to load configuration"))?;

    // 4. Database
    let db = config::database::create_connection()
        .await
        .inspect_err(|e| error!(error = %e, "Failed to connect to database"))?;
    config::database::create_tables(&db).await?;
    info!("Database initialized successfully");

    // 5. Administrators and notification transport
    let admins = config::admins::get_admin_ids();
    if admins.is_empty() {
        warn!(
            var = config::admins::ADMIN_IDS_ENV,
            "No global administrators configured"
        );
    }

    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!(error = %e, "DISCORD_BOT_TOKEN not found"))
        .map_err(Error::EnvVar)?;
    let transport = Arc::new(DiscordTransport::new(&token));

    let engine = Arc::new(ReminderEngine::with_database_collaborators(
        db.clone(),
        &app_config,
        transport,
    ));

    // 6. Built-in rules, attributed to the first administrator
    let mut admin_ids: Vec<&String> = admins.iter().collect();
    admin_ids.sort();
    if let Some(admin_id) = admin_ids.first() {
        defaults::seed_default_rules(&db, admin_id).await?;
    }

    // 7. Background ticks
    let every = Duration::from_secs(app_config.engine.tick_interval_minutes * 60);
    let mut scheduler = ReminderScheduler::spawn(Arc::clone(&engine), every);

    // 8. Admin surface until the client stops or Ctrl-C
    let data = BotData::new(db, engine, admins);
    let outcome = tokio::select! {
        result = bot::run_bot(token, data) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    };

    scheduler.stop().await;
    outcome
}
