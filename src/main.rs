use std::{future::IntoFuture, net::SocketAddr, process, sync::Arc};

use marketlens::{
    application::{
        audit::{AuditSink, AuditWorker},
        error::AppError,
        repos::{AuditRepo, ScheduleRepo},
        scheduler::Scheduler,
    },
    cache::{Cache, CacheConfig, KvStore, MemoryStore, RedisStore},
    config::{self, CacheBackend},
    infra::{
        cdn::CloudflareImages,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, Backends, SecurityConfig},
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const TARGET: &str = "marketlens::server";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::internal(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!(target: TARGET, "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let security = SecurityConfig::from_settings(&settings)?;
    let repositories = init_repositories(&settings).await?;
    let cache = init_cache(&settings).await?;
    let cdn = CloudflareImages::new(&settings.cdn)?;
    if !cdn.is_configured() {
        warn!(target: TARGET, "CDN credentials missing; image uploads will fail");
    }

    let audit_repo: Arc<dyn AuditRepo> = repositories.clone();
    let (audit, audit_worker) =
        AuditSink::spawn(audit_repo, settings.audit.queue_capacity.max(1));

    let backends = Backends::postgres(repositories.clone(), Arc::new(cdn));
    let state = ApiState::new(backends, cache.clone(), audit, security)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = if settings.scheduler.enabled {
        let schedule_repo: Arc<dyn ScheduleRepo> = repositories.clone();
        let scheduler = Scheduler::new(schedule_repo, cache, settings.scheduler.cadence);
        Some(scheduler.spawn(shutdown_rx))
    } else {
        info!(target: TARGET, "scheduled publishing disabled");
        None
    };

    let result = serve_http(&settings, state).await;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle
        && let Err(err) = handle.await
    {
        warn!(target: TARGET, error = %err, "scheduler task ended abnormally");
    }
    drain_audit(audit_worker, &settings).await;

    result
}

async fn drain_audit(worker: AuditWorker, settings: &config::Settings) {
    worker.shutdown(settings.audit.flush_deadline).await;
    info!(target: TARGET, "audit queue drained");
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, &settings.database)
        .await
        .map_err(InfraError::from)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn init_cache(settings: &config::Settings) -> Result<Cache, AppError> {
    let store: Arc<dyn KvStore> = match settings.cache.backend {
        CacheBackend::Redis => Arc::new(
            RedisStore::connect(&settings.cache.url)
                .await
                .map_err(InfraError::from)?,
        ),
        CacheBackend::Memory => {
            warn!(target: TARGET, "using the process-local cache backend");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(Cache::new(store, CacheConfig::from(&settings.cache)))
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state, settings.server.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(target: TARGET, addr = %settings.server.addr, "listening");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = stop_rx.changed().await;
    });
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        _ = shutdown_signal() => {}
    }

    let grace = settings.server.graceful_shutdown;
    info!(target: TARGET, grace_secs = grace.as_secs(), "shutdown signal received; draining connections");
    let _ = stop_tx.send(true);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(target: TARGET, "graceful shutdown deadline elapsed; closing remaining connections");
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::internal(format!("server error: {err}"))),
        Err(err) => Err(AppError::internal(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: TARGET, error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: TARGET, error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
