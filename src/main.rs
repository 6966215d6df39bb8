use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use gigmatch::config::Settings;
use gigmatch::core::{ListingRanker, MatchFinder};
use gigmatch::notifications::{
    DispatcherConfig, EmailChannel, InAppChannel, MatchNotifier, NotificationDispatcher, ProviderClient, SmsChannel,
    VoiceActionHandler, VoiceCallChannel,
};
use gigmatch::routes::{self, handle_json_payload_error, handle_query_payload_error, AppState};
use gigmatch::services::PostgresClient;
use gigmatch::shutdown::install_shutdown_handler;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(settings: &Settings) {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| settings.logging.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| settings.logging.format.clone());

    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn build_dispatcher(settings: &Settings, postgres: &Arc<PostgresClient>) -> std::io::Result<NotificationDispatcher> {
    let config = DispatcherConfig::new(settings.notifications.enabled_set());

    let mut dispatcher = NotificationDispatcher::new(config, postgres.clone(), postgres.clone(), postgres.clone())
        .with_channel(Arc::new(InAppChannel));

    match &settings.provider {
        Some(provider) => {
            let client = ProviderClient::new(provider).map_err(|e| {
                error!("Failed to create provider client: {}", e);
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;
            let client = Arc::new(client);

            dispatcher = dispatcher
                .with_channel(Arc::new(SmsChannel::new(client.clone())))
                .with_channel(Arc::new(VoiceCallChannel::new(client.clone())))
                .with_channel(Arc::new(EmailChannel::new(client)));

            info!("Delivery provider configured at {}", provider.base_url);
        }
        None if dispatcher.config().has_outbound() => {
            warn!("Outbound channels enabled but no provider configured; those notifications will stay pending");
        }
        None => {}
    }

    Ok(dispatcher)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_logging(&settings);

    info!("Starting gigmatch service...");

    let postgres = Arc::new(PostgresClient::from_settings(&settings.database).await.map_err(|e| {
        error!("Failed to connect to PostgreSQL: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?);

    info!(
        "PostgreSQL client initialized (max: {} connections)",
        settings.database.max_connections
    );

    let finder = MatchFinder::new()
        .with_max_candidates(settings.matching.max_candidates)
        .with_batch_size(settings.matching.scan_batch_size)
        .with_parallelism(settings.matching.scan_parallelism);

    let dispatcher = Arc::new(build_dispatcher(&settings, &postgres)?);

    info!(
        "Notification dispatcher initialized with channels: {:?}",
        settings.notifications.enabled_channels
    );

    let notifier = MatchNotifier::new(dispatcher.clone(), postgres.clone(), finder.clone())
        .with_min_score(settings.matching.min_match_score_for_notification)
        .with_concurrency(settings.notifications.fanout_concurrency)
        .with_default_delivery(settings.notifications.job_match_delivery);

    let voice_actions = VoiceActionHandler::new(dispatcher.clone(), postgres.clone(), postgres.clone(), postgres.clone());

    let shutdown = install_shutdown_handler();

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    let app_state = AppState {
        postings: postgres.clone(),
        workers: postgres.clone(),
        notifications: postgres.clone(),
        dispatcher,
        notifier: Arc::new(notifier),
        voice_actions: Arc::new(voice_actions),
        ranker: ListingRanker::new(),
        finder,
        settings: Arc::new(settings),
        postgres: Some(postgres),
        shutdown: shutdown.clone(),
    };

    info!("Starting HTTP server on {}:{}", host, port);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .disable_signals()
    .bind((host, port))?
    .run();

    let handle = server.handle();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        handle.stop(true).await;
    });

    server.await
}
