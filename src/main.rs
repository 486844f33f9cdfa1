use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use minder::config::{self, Cli};
use minder::db::Database;
use minder::models::{StreamEvent, TaskMessage};
use minder::pipeline::{DEFAULT_CAPACITY, EventQueue};
use minder::prices::PriceTable;
use minder::stream::MarketStream;
use minder::supervisor::Supervisor;
use minder::telegram::Notifier;
use minder::{reconciler, scheduler, sink, tls};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let app_config = match config::load(&cli) {
        Ok(app_config) => app_config,
        Err(e) => {
            error!(error = %e, "Cannot load configuration");
            std::process::exit(1);
        }
    };

    let db = match Database::connect(&app_config.db).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!(error = %e, "Cannot establish initial database connection");
            std::process::exit(1);
        }
    };
    db.spawn_keepalive();

    let tls_config = Arc::new(tls::build_tls_config());
    let http = match reqwest::Client::builder()
        .use_preconfigured_tls((*tls_config).clone())
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(20))
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            error!(error = %e, "Cannot build HTTP client");
            std::process::exit(1);
        }
    };

    let prices = Arc::new(PriceTable::new());
    let stream_events: Arc<EventQueue<StreamEvent>> = Arc::new(EventQueue::new(DEFAULT_CAPACITY));
    let host_events = Arc::new(EventQueue::new(DEFAULT_CAPACITY));
    let task_queue: Arc<EventQueue<TaskMessage>> = Arc::new(EventQueue::new(DEFAULT_CAPACITY));

    info!(
        ip = %app_config.ip_address,
        port = app_config.port,
        "Bridge starting; control plane expected on the configured endpoint"
    );

    // market data feeding the shared price table
    let market = MarketStream::new(Arc::clone(&prices), http.clone(), Arc::clone(&tls_config));
    tokio::spawn(market.run());

    // one user stream per stored account, kept in sync by the reconciler
    let mut supervisor = Supervisor::new(
        Arc::clone(&stream_events),
        http.clone(),
        Arc::clone(&tls_config),
    );
    match db.fetch_accounts().await {
        Ok(accounts) => {
            info!(accounts = accounts.len(), "Starting stored account streams");
            supervisor.start_initial(accounts);
        }
        Err(e) => error!(error = %e, "Cannot enumerate stored accounts"),
    }
    tokio::spawn(supervisor.run(Arc::clone(&host_events)));
    tokio::spawn(reconciler::run(Arc::clone(&db), Arc::clone(&host_events)));

    // persistence + notification consumer
    let notifier = Notifier::new(
        Arc::clone(&db),
        http.clone(),
        Arc::clone(&tls_config),
        app_config.bot_token.clone(),
    )
    .await;
    tokio::spawn(sink::run(
        Arc::clone(&stream_events),
        Arc::clone(&db),
        notifier,
    ));

    // periodic sampler watcher
    {
        let db = Arc::clone(&db);
        let prices = Arc::clone(&prices);
        let task_queue = Arc::clone(&task_queue);
        tokio::spawn(async move {
            if let Err(e) = scheduler::run_watcher(db, prices, task_queue).await {
                error!(error = %e, "Scheduler watcher exited");
            }
        });
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for shutdown signal");
    }
    info!("Shutting down");
}
