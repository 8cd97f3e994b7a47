use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use clinicbot::config::{AppConfig, CalendarBackend};
use clinicbot::db;
use clinicbot::handlers;
use clinicbot::services::calendar::google::GoogleCalendar;
use clinicbot::services::calendar::local::LocalCalendar;
use clinicbot::services::calendar::CalendarGateway;
use clinicbot::services::clock::{Clock, SystemClock};
use clinicbot::services::conversation::{BookingSettings, ConversationEngine};
use clinicbot::services::messaging::twilio::TwilioWhatsAppProvider;
use clinicbot::services::messaging::{LogMessaging, MessagingProvider};
use clinicbot::services::reminders::ReminderScanner;
use clinicbot::services::sessions::SessionStore;
use clinicbot::state::AppState;

const SESSION_SWEEP_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        clinic = %config.clinic_name,
        hours = %config.hours.to_human_readable(),
        "configuration loaded"
    );

    let calendar: Arc<dyn CalendarGateway> = match config.calendar_backend {
        CalendarBackend::Google => {
            anyhow::ensure!(
                !config.google_access_token.is_empty(),
                "GOOGLE_ACCESS_TOKEN must be set when CALENDAR_BACKEND=google"
            );
            tracing::info!(calendar_id = %config.calendar_id, "using Google Calendar");
            Arc::new(GoogleCalendar::new(
                config.calendar_id.clone(),
                config.google_access_token.clone(),
                config.utc_offset,
            ))
        }
        CalendarBackend::Local => {
            tracing::info!(database = %config.database_url, "using local calendar");
            let conn = db::init_db(&config.database_url)?;
            Arc::new(LocalCalendar::new(Arc::new(Mutex::new(conn)), config.utc_offset))
        }
    };

    let messaging: Arc<dyn MessagingProvider> = if config.twilio_account_sid.is_empty() {
        tracing::warn!("TWILIO_ACCOUNT_SID not set, outgoing messages will only be logged");
        Arc::new(LogMessaging)
    } else {
        Arc::new(TwilioWhatsAppProvider::new(
            config.twilio_account_sid.clone(),
            config.twilio_auth_token.clone(),
            config.twilio_whatsapp_number.clone(),
        ))
    };

    if config.webhook_token.is_empty() {
        tracing::warn!("WEBHOOK_TOKEN not set, POST /webhook accepts unauthenticated senders");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.utc_offset));
    let sessions = Arc::new(SessionStore::new(Duration::minutes(config.session_ttl_minutes)));

    let engine = ConversationEngine::new(
        Arc::clone(&sessions),
        Arc::clone(&calendar),
        Arc::clone(&clock),
        BookingSettings::from_config(&config),
    );

    let shutdown = Arc::new(Notify::new());

    let reminders = Arc::new(ReminderScanner::new(
        calendar,
        Arc::clone(&messaging),
        clock,
        config.clinic_name.clone(),
    ));
    let reminder_task = tokio::spawn(reminders.run(
        StdDuration::from_secs(config.reminder_interval_secs),
        Arc::clone(&shutdown),
    ));

    let sweeper = {
        let sessions = Arc::clone(&sessions);
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(StdDuration::from_secs(SESSION_SWEEP_SECS)) => {
                        let evicted = sessions.evict_expired(Utc::now().naive_utc());
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = sessions.len(), "expired sessions evicted");
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
        })
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        engine,
        messaging,
    });

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    shutdown.notify_waiters();
    let background = async { tokio::join!(reminder_task, sweeper) };
    if tokio::time::timeout(StdDuration::from_secs(5), background).await.is_err() {
        tracing::warn!("background tasks did not stop in time");
    }

    Ok(())
}
