use std::{process, sync::Arc, time::Duration};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use coursehub::{
    application::{
        admin::{
            articles::AdminArticleService, categories::AdminCategoryService,
            chapters::AdminChapterService, courses::AdminCourseService,
            memberships::AdminMembershipService, orders::AdminOrderService,
            settings::AdminSettingsService, users::AdminUserService,
        },
        auth::{AuthOptions, AuthService, TokenIssuer},
        catalog::{CatalogRepos, CatalogService},
        error::AppError,
        index_sync::IndexSync,
        jobs::{JobWorkerContext, MailJobPayload, process_mail_job},
        orders::OrderService,
        repos::{
            ArticlesRepo, CategoriesRepo, ChaptersRepo, CoursesRepo, JobsRepo, MembershipsRepo,
            OrdersRepo, SettingsRepo, UsersRepo,
        },
        search::SearchService,
        wechat::WechatService,
    },
    cache::{
        CacheAside, CacheConfig, CacheConsumer, CacheStore, CacheTrigger, MemoryStore, RedisStore,
    },
    config::{self, CacheBackend, SearchBackend},
    domain::types::JobType,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, PublicState},
        mailer::build_mailer,
        telemetry,
        wechat::HttpWechatClient,
    },
    search::{MeiliIndex, MemoryIndex, SearchIndex},
};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

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
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Reindex(_) => run_reindex(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (http_repositories, job_repositories) = init_repositories(&settings).await?;
    let app = build_application_context(http_repositories, &settings).await?;

    if matches!(settings.search.backend, SearchBackend::Memory) {
        let summary = app.sync.reindex().await?;
        info!(
            courses = summary.courses,
            chapters = summary.chapters,
            "In-memory search indexes loaded from the database"
        );
    }

    let monitor_handle = spawn_job_monitor(job_repositories, app.job_context, &settings.jobs);

    let result = serve_http(&settings, app.public_state, app.admin_state).await;

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings, settings.database.http_max_connections.get()).await?;
    apply_migrations(&pool).await?;
    info!(target = "coursehub::migrate", "Migrations applied");
    Ok(())
}

async fn run_reindex(settings: config::Settings) -> Result<(), AppError> {
    if matches!(settings.search.backend, SearchBackend::Memory) {
        warn!(
            target = "coursehub::reindex",
            "search backend is in-memory; the rebuilt index is discarded on exit"
        );
    }
    let pool = connect_pool(&settings, settings.database.http_max_connections.get()).await?;
    let repositories = Arc::new(PostgresRepositories::new(pool));
    let app = build_application_context(repositories, &settings).await?;

    info!(target = "coursehub::reindex", "Starting reindex");
    let summary = app.sync.reindex().await?;
    info!(
        target = "coursehub::reindex",
        courses = summary.courses,
        chapters = summary.chapters,
        "Reindex completed"
    );
    Ok(())
}

struct ApplicationContext {
    public_state: PublicState,
    admin_state: AdminState,
    job_context: JobWorkerContext,
    sync: IndexSync,
}

async fn connect_pool(
    settings: &config::Settings,
    max_connections: u32,
) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(
        database_url,
        max_connections,
        settings.database.acquire_timeout,
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn apply_migrations(pool: &sqlx::PgPool) -> Result<(), AppError> {
    PostgresRepositories::run_migrations(pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresStorage::setup(pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let http_pool = connect_pool(settings, settings.database.http_max_connections.get()).await?;
    apply_migrations(&http_pool).await?;
    let jobs_pool = connect_pool(settings, settings.database.jobs_max_connections.get()).await?;

    Ok((
        Arc::new(PostgresRepositories::new(http_pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}

async fn build_cache_store(settings: &config::Settings) -> Result<Arc<dyn CacheStore>, AppError> {
    let store: Arc<dyn CacheStore> = match settings.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new(settings.cache.memory_capacity)),
        CacheBackend::Redis => {
            let url = settings
                .cache
                .redis_url
                .as_deref()
                .ok_or_else(|| InfraError::configuration("cache.redis_url is not configured"))?;
            Arc::new(
                RedisStore::connect(url)
                    .await
                    .map_err(|err| InfraError::cache(err.to_string()))?,
            )
        }
    };
    Ok(store)
}

async fn build_search_index(
    settings: &config::Settings,
) -> Result<Arc<dyn SearchIndex>, AppError> {
    let index: Arc<dyn SearchIndex> = match &settings.search.backend {
        SearchBackend::Memory => Arc::new(MemoryIndex::new()),
        SearchBackend::Meilisearch { url, api_key } => Arc::new(
            MeiliIndex::new(url.as_str(), api_key.clone(), settings.search.timeout)
                .map_err(|err| InfraError::search(err.to_string()))?,
        ),
    };
    index
        .configure()
        .await
        .map_err(|err| InfraError::search(err.to_string()))?;
    Ok(index)
}

async fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let categories_repo: Arc<dyn CategoriesRepo> = repositories.clone();
    let courses_repo: Arc<dyn CoursesRepo> = repositories.clone();
    let chapters_repo: Arc<dyn ChaptersRepo> = repositories.clone();
    let articles_repo: Arc<dyn ArticlesRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let settings_repo: Arc<dyn SettingsRepo> = repositories.clone();
    let memberships_repo: Arc<dyn MembershipsRepo> = repositories.clone();
    let orders_repo: Arc<dyn OrdersRepo> = repositories.clone();
    let jobs_repo: Arc<dyn JobsRepo> = repositories.clone();

    let store = build_cache_store(settings).await?;
    let cache_config = CacheConfig::from(&settings.cache);
    let consumer = Arc::new(CacheConsumer::new(store.clone()));
    let trigger = Arc::new(CacheTrigger::new(&cache_config, consumer));
    let reader = CacheAside::new(store.clone());

    let search_index = build_search_index(settings).await?;
    let sync = IndexSync::new(
        search_index.clone(),
        courses_repo.clone(),
        chapters_repo.clone(),
        trigger.clone(),
    );

    let jwt_secret = settings
        .auth
        .jwt_secret
        .as_deref()
        .ok_or_else(|| InfraError::configuration("auth.jwt_secret is not configured"))?;
    let tokens = TokenIssuer::new(jwt_secret, settings.auth.token_ttl_days);

    let auth = Arc::new(AuthService::new(
        users_repo.clone(),
        jobs_repo,
        store,
        trigger.clone(),
        tokens.clone(),
        AuthOptions {
            require_captcha: settings.auth.require_captcha,
        },
    ));

    let catalog = Arc::new(CatalogService::new(
        CatalogRepos {
            categories: categories_repo.clone(),
            courses: courses_repo.clone(),
            chapters: chapters_repo.clone(),
            articles: articles_repo.clone(),
            users: users_repo.clone(),
            settings: settings_repo.clone(),
            memberships: memberships_repo.clone(),
        },
        reader.clone(),
    ));
    let wechat_client = Arc::new(HttpWechatClient::new(&settings.wechat)?);
    let wechat = Arc::new(WechatService::new(wechat_client, users_repo.clone(), tokens));
    let orders = Arc::new(OrderService::new(
        orders_repo.clone(),
        memberships_repo.clone(),
    ));

    let public_state = PublicState {
        catalog,
        search: Arc::new(SearchService::new(search_index)),
        auth: auth.clone(),
        wechat,
        orders,
    };

    let admin_state = AdminState {
        auth,
        categories: Arc::new(AdminCategoryService::new(
            categories_repo.clone(),
            trigger.clone(),
        )),
        courses: Arc::new(AdminCourseService::new(
            courses_repo.clone(),
            categories_repo,
            sync.clone(),
            trigger.clone(),
        )),
        chapters: Arc::new(AdminChapterService::new(
            chapters_repo,
            courses_repo,
            sync.clone(),
        )),
        articles: Arc::new(AdminArticleService::new(
            articles_repo,
            reader.clone(),
            trigger.clone(),
        )),
        users: Arc::new(AdminUserService::new(users_repo, trigger.clone())),
        settings: Arc::new(AdminSettingsService::new(
            settings_repo,
            sync.clone(),
            trigger.clone(),
        )),
        memberships: Arc::new(AdminMembershipService::new(
            memberships_repo,
            reader,
            trigger,
        )),
        orders: Arc::new(AdminOrderService::new(orders_repo)),
        health: repositories,
    };

    let job_context = JobWorkerContext {
        mailer: build_mailer(&settings.mailer)?,
    };

    Ok(ApplicationContext {
        public_state,
        admin_state,
        job_context,
        sync,
    })
}

fn spawn_job_monitor(
    repositories: Arc<PostgresRepositories>,
    context: JobWorkerContext,
    jobs: &config::JobsSettings,
) -> tokio::task::JoinHandle<()> {
    let mail_storage: PostgresStorage<MailJobPayload> = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::SendMail.as_str()),
    );

    let mail_worker = WorkerBuilder::new("send-mail-worker")
        .concurrency(jobs.mail_concurrency.get() as usize)
        .data(context)
        .backend(mail_storage)
        .build_fn(process_mail_job);

    let monitor = Monitor::new().register(mail_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(
    settings: &config::Settings,
    public_state: PublicState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let max_body_bytes = settings.server.max_body_bytes;
    let public_router = http::build_public_router(public_state, max_body_bytes);
    let admin_router = http::build_admin_router(admin_state, max_body_bytes);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = async { try_join!(public_server, admin_server) } => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = drain_deadline(shutdown_rx, grace) => {
            warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out");
        }
    }

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Resolves once shutdown was requested and `grace` has elapsed since.
async fn drain_deadline(rx: watch::Receiver<bool>, grace: Duration) {
    wait_for_shutdown(rx).await;
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
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
                error!(error = %err, "failed to listen for SIGTERM");
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
