//! acs-batch CLI
//!
//! Crawls AtCoder, generates search documents and uploads them to Solr.

use std::path::PathBuf;
use std::sync::Arc;

use acs_batch::{
    error::{AppError, Result},
    models::{Config, Domain},
    pipeline::{
        self, ChunkWriter, DocumentBuilder, GenerateSummary, ProblemBuilder, RowSource,
        SubmissionBuilder, UploadOptions, UploadSummary, UserBuilder,
        crawl::{self, CrawlOptions, ProblemCrawler},
    },
    services::{AtCoderClient, AtCoderProblemsClient, IndexCore, SolrCore},
    storage::{HistoryStore, RowFilter, SqliteStore, StoredRow},
    utils::{http, retry::RetryPolicy},
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// AtCoder search batch
#[derive(Parser, Debug)]
#[command(name = "acs-batch", version, about = "AtCoder search batch")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl one domain into the local database
    Crawl {
        /// problem, user or submission
        domain: Domain,

        /// Ignore stored ids and watermarks
        #[arg(long)]
        all: bool,

        /// AtCoder account used for submission lists
        #[arg(long, env = "ATCODER_USER_NAME")]
        user: Option<String>,

        #[arg(long, env = "ATCODER_USER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Write chunk files for one domain
    Generate {
        domain: Domain,

        /// Include every stored submission, not only those since the last update
        #[arg(long)]
        all: bool,
    },

    /// Upload existing chunk files for one domain
    Upload {
        domain: Domain,

        #[arg(long)]
        optimize: bool,

        #[arg(long)]
        truncate: bool,
    },

    /// Generate and upload one domain as a recorded run
    Update {
        domain: Domain,

        #[arg(long)]
        all: bool,

        #[arg(long)]
        optimize: bool,

        #[arg(long)]
        truncate: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Show the status of a domain's core
    Ping { domain: Domain },
}

/// Initialize logging from the verbosity flag or the configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, cancelling...");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(&cli.config);
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let mut config = match loaded {
        Ok(config) => {
            log::info!("Loaded configuration from {}", cli.config.display());
            config
        }
        Err(e) => {
            log::warn!(
                "Config load failed from {}: {}. Using defaults.",
                cli.config.display(),
                e
            );
            Config::default()
        }
    };

    let token = CancellationToken::new();
    cancel_on_interrupt(token.clone());

    match cli.command {
        Command::Crawl {
            domain,
            all,
            user,
            password,
        } => {
            let store = SqliteStore::open(&config.database.path)?;
            let options = json!({ "domain": domain, "all": all, "crawler": &config.crawler });
            pipeline::run_batch(&store, &domain.crawl_history_name(), options, || {
                run_crawl(&token, &config, &store, domain, all, user, password)
            })
            .await?;
        }

        Command::Generate { domain, all } => {
            let store = SqliteStore::open(&config.database.path)?;
            run_generate(&token, &config, &store, domain, all).await?;
        }

        Command::Upload {
            domain,
            optimize,
            truncate,
        } => {
            config.upload.optimize |= optimize;
            config.upload.truncate |= truncate;
            run_upload(&token, &config, domain).await?;
        }

        Command::Update {
            domain,
            all,
            optimize,
            truncate,
        } => {
            config.upload.optimize |= optimize;
            config.upload.truncate |= truncate;
            let store = SqliteStore::open(&config.database.path)?;
            let options = json!({
                "domain": domain,
                "all": all,
                "generate": &config.generate,
                "upload": &config.upload,
            });
            pipeline::run_batch(&store, &domain.update_history_name(), options, || async {
                let generated = run_generate(&token, &config, &store, domain, all).await?;
                let uploaded = run_upload(&token, &config, domain).await?;
                log::info!(
                    "Updated {}: {} documents in {} chunks, {} uploaded",
                    domain,
                    generated.documents,
                    generated.chunks,
                    uploaded.files
                );
                Ok::<_, AppError>(())
            })
            .await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("Config OK");
        }

        Command::Ping { domain } => {
            let core = solr_core(&config, domain)?;
            let status = core.ping().await?;
            log::info!("Core {}: {}", core.name(), status);
        }
    }

    log::info!("Done!");
    Ok(())
}

fn crawl_options(config: &Config, all: bool) -> CrawlOptions {
    CrawlOptions {
        duration: config.crawler.duration(),
        retry: RetryPolicy::new(config.crawler.retry_limit, config.crawler.retry_delay()),
        all,
    }
}

async fn run_crawl(
    token: &CancellationToken,
    config: &Config,
    store: &SqliteStore,
    domain: Domain,
    all: bool,
    user: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let client = http::create_async_client(&config.crawler)?;
    let atcoder = AtCoderClient::new(client.clone())?;
    let options = crawl_options(config, all);

    match domain {
        Domain::Problem => {
            let problems = AtCoderProblemsClient::new(client)?;
            ProblemCrawler::new(&problems, &atcoder, store, options)?
                .crawl(token)
                .await?;
        }
        Domain::User => {
            crawl::crawl_users(token, &atcoder, store, options).await?;
        }
        Domain::Submission => {
            match (user, password) {
                (Some(user), Some(password)) => atcoder.login(&user, &password).await?,
                _ => log::warn!("No AtCoder credentials given; crawling submissions anonymously"),
            }
            crawl::crawl_submissions(
                token,
                &atcoder,
                store,
                config.crawler.submission_targets.clone(),
                options,
            )
            .await?;
        }
    }
    Ok(())
}

async fn run_generate(
    token: &CancellationToken,
    config: &Config,
    store: &SqliteStore,
    domain: Domain,
    all: bool,
) -> Result<GenerateSummary> {
    let writer = ChunkWriter::new(
        config.generate.domain_dir(domain.as_str()),
        config.generate.chunk_size,
    );
    writer.prepare().await?;
    let concurrency = config.generate.concurrency;

    match domain {
        Domain::Problem => {
            let builder = ProblemBuilder::new()?;
            generate_rows(token, store, RowFilter::all(), builder, writer, concurrency).await
        }
        Domain::User => {
            generate_rows(token, store, RowFilter::all(), UserBuilder, writer, concurrency).await
        }
        Domain::Submission => {
            let filter = if all {
                RowFilter::all()
            } else {
                match store.latest_finished(&domain.update_history_name()).await? {
                    Some(last) => {
                        log::info!("Generating submissions stored since {}", last.started_at);
                        RowFilter::since(last.started_at)
                    }
                    None => RowFilter::all(),
                }
            };
            generate_rows(token, store, filter, SubmissionBuilder, writer, concurrency).await
        }
    }
}

async fn generate_rows<B>(
    token: &CancellationToken,
    store: &SqliteStore,
    filter: RowFilter,
    builder: B,
    writer: ChunkWriter,
    concurrency: usize,
) -> Result<GenerateSummary>
where
    B: DocumentBuilder + 'static,
    B::Row: StoredRow,
{
    let source: Arc<dyn RowSource<B::Row>> = Arc::new(store.clone());
    pipeline::generate(token, source, filter, Arc::new(builder), writer, concurrency).await
}

fn solr_core(config: &Config, domain: Domain) -> Result<SolrCore> {
    let client = http::create_async_client(&config.crawler)?;
    SolrCore::new(client, &config.solr.host, config.solr.core_name(domain))
}

async fn run_upload(
    token: &CancellationToken,
    config: &Config,
    domain: Domain,
) -> Result<UploadSummary> {
    let core: Arc<dyn IndexCore> = Arc::new(solr_core(config, domain)?);
    let save_dir = config.generate.domain_dir(domain.as_str());
    if !save_dir.is_dir() {
        return Err(AppError::config(format!(
            "no chunk directory at {}; run generate first",
            save_dir.display()
        )));
    }

    let options = UploadOptions {
        concurrency: config.upload.concurrency,
        optimize: config.upload.optimize,
        truncate: config.upload.truncate,
    };
    pipeline::upload(token, core, &save_dir, options).await
}
