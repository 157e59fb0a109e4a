use std::{process, sync::Arc};

use pressroom::{
    application::{
        document::DocumentTransformer,
        error::AppError,
        generation::Generator,
        images::{HttpImageResolver, ImageResolver},
        jobs::{JobWorkerContext, Pipeline, enqueue_and_attach, spawn_scheduler, start_pipeline},
        publish::{Integrations, PublishOrchestrator},
        repos::{ArticlesRepo, JobQueue},
    },
    config,
    domain::entities::ArticleId,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        integrations::HttpIntegrations,
        openai::{OpenAiGenerator, OpenAiSettings},
        shutdown::ShutdownSignal,
        telemetry,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info};
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
        .unwrap_or(config::Command::Work(Box::<config::WorkArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Work(_) => run_work(settings).await,
        config::Command::EnqueueGenerate(args) => {
            run_enqueue(settings, Pipeline::GenerateArticle, ArticleId(args.article_id)).await
        }
        config::Command::EnqueuePublish(args) => {
            run_enqueue(settings, Pipeline::PublishArticle, ArticleId(args.article_id)).await
        }
        config::Command::Migrate(_) => {
            init_repositories(&settings).await?;
            info!(target = "pressroom::migrate", "database migrations applied");
            Ok(())
        }
    }
}

async fn run_work(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err)))?;
    let context = build_job_context(repositories.clone(), &settings)?;
    let shutdown_signal = ShutdownSignal::install().map_err(InfraError::Io)?;

    let generate = start_pipeline(
        Pipeline::GenerateArticle,
        context.clone(),
        settings.jobs.generate.concurrency,
        settings.jobs.generate.poll_interval,
    );
    let publish = start_pipeline(
        Pipeline::PublishArticle,
        context.clone(),
        settings.jobs.publish.concurrency,
        settings.jobs.publish.poll_interval,
    );

    let shutdown = CancellationToken::new();
    let scheduler = spawn_scheduler(context, settings.scheduler.cadence, shutdown.clone());

    info!(
        target = "pressroom::work",
        worker_id = repositories.worker_id(),
        environment = settings.jobs.environment.as_str(),
        policy = %settings.publish.policy,
        "pressroom worker running"
    );

    let signal = shutdown_signal.recv().await;
    if let Err(err) = &signal {
        error!(target = "pressroom::work", error = %err, "failed to listen for shutdown signal");
    }

    info!(target = "pressroom::work", "shutting down, waiting for in-flight jobs");
    shutdown.cancel();
    if let Err(err) = scheduler.await {
        error!(target = "pressroom::work", error = %err, "publish scheduler task failed");
    }
    generate.shutdown().await;
    publish.shutdown().await;

    signal
        .map(|_| ())
        .map_err(|err| AppError::from(InfraError::Io(err)))
}

async fn run_enqueue(
    settings: config::Settings,
    pipeline: Pipeline,
    article_id: ArticleId,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let articles: Arc<dyn ArticlesRepo> = repositories.clone();
    let queue: Arc<dyn JobQueue> = repositories;

    if articles.find_article(article_id).await?.is_none() {
        return Err(AppError::validation(format!(
            "article {article_id} does not exist"
        )));
    }

    let job_id = enqueue_and_attach(
        queue.as_ref(),
        articles.as_ref(),
        pipeline,
        &settings.jobs.environment,
        article_id,
        settings.jobs.max_attempts,
    )
    .await?;

    println!("{job_id}");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_job_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<JobWorkerContext, AppError> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("pressroom/", env!("CARGO_PKG_VERSION")))
        .timeout(settings.publish.http_timeout)
        .build()
        .map_err(InfraError::from)?;

    let api_key = settings
        .generator
        .api_key
        .clone()
        .ok_or_else(|| InfraError::configuration("generator.api_key is not configured"))?;
    let generator: Arc<dyn Generator> = Arc::new(
        OpenAiGenerator::new(
            http.clone(),
            OpenAiSettings {
                api_url: settings.generator.api_url.clone(),
                api_key,
                text_model: settings.generator.text_model.clone(),
                image_model: settings.generator.image_model.clone(),
                image_size: settings.generator.image_size.clone(),
            },
        )
        .map_err(InfraError::from)?,
    );

    let images: Arc<dyn ImageResolver> =
        Arc::new(HttpImageResolver::new(generator.clone(), http.clone()));
    let integrations: Arc<dyn Integrations> = Arc::new(HttpIntegrations::new(
        http,
        settings.publish.github_api_url.clone(),
    ));

    Ok(JobWorkerContext {
        articles: repositories.clone(),
        queue: repositories,
        generator,
        transformer: Arc::new(DocumentTransformer::new(images.clone())),
        orchestrator: Arc::new(PublishOrchestrator::new(
            integrations,
            images,
            settings.publish.branch_naming,
        )),
        policy: settings.publish.policy,
        environment: settings.jobs.environment.clone(),
        max_attempts: settings.jobs.max_attempts,
    })
}
