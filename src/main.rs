use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use likesync::{
    CacheKeys, CounterStore, DedupCache, JobClient, MemoryCredentialStore, MemoryStore,
    NoopReporter, ProgressEvent, ProgressReporter, ProviderConfig, ProviderTokens,
    ReconnectPolicy, RedisStore, ReqwestClient, RetentionPolicy, RetryPolicy,
    SharedProgressReporter, SyncContext, SyncOptions, UserCredential, exchange_code,
    fetch_account, read_media_list, sync_liked_media, unlink_user,
};

// Emoji with fallback for terminals without Unicode support
static CAMERA: Emoji<'_, '_> = Emoji("📷 ", "");
static HEART: Emoji<'_, '_> = Emoji("💜 ", "[i] ");
static UPLOAD: Emoji<'_, '_> = Emoji("📤 ", "[^] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Mirror liked photos into cloud storage
#[derive(Parser, Debug)]
#[command(name = "likesync")]
#[command(about = "Mirror liked photos into cloud storage")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    provider: ProviderArgs,

    /// Log debug output (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Redis URL for the dedup cache and counters; in-memory when absent
    #[arg(long, env = "LIKESYNC_REDIS_URL", global = true)]
    redis_url: Option<String>,

    /// Prefix for every cache key
    #[arg(long, default_value = likesync::store::DEFAULT_KEY_PREFIX, global = true)]
    key_prefix: String,

    /// Keep only the N most recently synced ids per user
    #[arg(long, global = true)]
    keep_recent: Option<usize>,
}

#[derive(Args, Debug)]
struct ProviderArgs {
    /// Base URL of the storage provider API
    #[arg(long, env = "LIKESYNC_API_BASE", default_value = likesync::provider::DEFAULT_API_BASE, global = true)]
    api_base: String,

    /// OAuth access token for the storage provider
    #[arg(long, env = "LIKESYNC_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    /// OAuth application key
    #[arg(long, env = "LIKESYNC_CLIENT_ID", default_value = "", global = true)]
    client_id: String,

    /// OAuth application secret
    #[arg(long, env = "LIKESYNC_CLIENT_SECRET", hide_env_values = true, default_value = "", global = true)]
    client_secret: String,

    /// Redirect URI registered with the provider
    #[arg(long, env = "LIKESYNC_REDIRECT_URI", default_value = "", global = true)]
    redirect_uri: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit every not-yet-synced item of a liked-media list
    Sync {
        /// JSON file with the user's liked media
        media_list: PathBuf,

        /// User whose likes are synced
        #[arg(short, long)]
        user: String,

        /// Destination folder in the user's storage
        #[arg(short, long, default_value = "/Likes")]
        folder: String,

        /// Maximum number of concurrent submissions
        #[arg(short = 'c', long, default_value = "3")]
        concurrent: usize,

        /// Maximum number of items to submit
        #[arg(short, long)]
        limit: Option<usize>,

        /// Give up on a locked job after this many retries
        #[arg(long, default_value = "5")]
        max_retries: u32,

        /// Quiet mode - suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show saved counters
    Stats {
        /// Also show this user's count and most recent items
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Forget a user's sync history
    Unlink {
        #[arg(short, long)]
        user: String,
    },

    /// Verify the access token against the provider
    Account,

    /// Print the URL that grants this application access
    AuthorizeUrl,

    /// Exchange an authorization code for an access token
    Exchange {
        /// Code returned to the redirect URI
        code: String,
    },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn get_or_create_bar(&self, slot_id: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap();

        if let Some(bar) = bars.get(&slot_id) {
            return bar.clone();
        }

        let style = ProgressStyle::default_spinner()
            .template(&format!("  {UPLOAD}{{spinner:.cyan}} {{wide_msg}}"))
            .unwrap();

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        bars.insert(slot_id, bar.clone());
        bar
    }

    fn finish_bar(&self, slot_id: usize) {
        let mut bars = self.bars.lock().unwrap();
        if let Some(bar) = bars.remove(&slot_id) {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::SyncPlanReady {
                user_id,
                total_items,
                new_items,
                to_submit,
            } => {
                self.main_bar.set_message(format!(
                    "{HEART}{} • {} liked, {} new, submitting {}",
                    user_id.bold().green(),
                    total_items.to_string().cyan(),
                    new_items.to_string().yellow(),
                    to_submit.to_string().cyan()
                ));
            }

            ProgressEvent::SubmissionStarting {
                slot_id,
                media_id,
                item_index,
                path,
                caption,
            } => {
                let bar = self.get_or_create_bar(slot_id);
                let label = match caption {
                    Some(caption) => format!("{media_id} \"{caption}\""),
                    None => media_id,
                };
                bar.set_message(format!(
                    "[{}] {} → {}",
                    (item_index + 1).to_string().cyan(),
                    label,
                    path.dimmed()
                ));
            }

            ProgressEvent::SubmissionAccepted {
                slot_id,
                media_id,
                job_id,
                retries,
            } => {
                let bar = self.get_or_create_bar(slot_id);
                let retried = if retries > 0 {
                    format!(" after {retries} retries")
                } else {
                    String::new()
                };
                bar.set_message(format!(
                    "{SUCCESS}{} (job {}){}",
                    media_id.green(),
                    job_id,
                    retried
                ));
                self.finish_bar(slot_id);
            }

            ProgressEvent::SubmissionFailed {
                slot_id,
                media_id,
                error,
            } => {
                let bar = self.get_or_create_bar(slot_id);
                bar.abandon_with_message(format!("{FAILURE}{} - {}", media_id.red(), error.red()));
                self.bars.lock().unwrap().remove(&slot_id);
            }

            ProgressEvent::SyncCompleted {
                submitted_count,
                skipped_count,
                failed_count,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} submitted, {} already synced, {} failed",
                    "Sync complete:".bold().green(),
                    submitted_count.to_string().green().bold(),
                    skipped_count.to_string().yellow(),
                    if failed_count > 0 {
                        failed_count.to_string().red().bold()
                    } else {
                        failed_count.to_string().green()
                    }
                );
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "likesync=debug"
    } else {
        "likesync=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn open_store(args: &StoreArgs) -> Result<(Arc<dyn DedupCache>, Arc<dyn CounterStore>)> {
    let retention = args
        .keep_recent
        .map(RetentionPolicy::MostRecent)
        .unwrap_or_default();

    match &args.redis_url {
        Some(url) => {
            let store = Arc::new(
                RedisStore::connect(
                    url,
                    CacheKeys::new(args.key_prefix.clone()),
                    retention,
                    ReconnectPolicy::default(),
                )
                .await
                .context("Failed to connect to Redis")?,
            );
            Ok((store.clone(), store))
        }
        None => {
            warn!("No Redis URL configured; sync history lasts only for this run");
            let store = Arc::new(MemoryStore::with_retention(retention));
            Ok((store.clone(), store))
        }
    }
}

fn provider_config(args: &ProviderArgs) -> Result<ProviderConfig> {
    let mut config =
        ProviderConfig::with_api_base(&args.api_base).context("Invalid provider API base")?;
    config.client_id = args.client_id.clone();
    config.client_secret = args.client_secret.clone();
    config.redirect_uri = args.redirect_uri.clone();
    Ok(config)
}

fn require_token(args: &ProviderArgs) -> Result<String> {
    args.access_token
        .clone()
        .filter(|token| !token.is_empty())
        .context("An access token is required (--access-token or LIKESYNC_ACCESS_TOKEN)")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let client = ReqwestClient::new();
    let config = provider_config(&cli.provider)?;

    match cli.command {
        Command::Sync {
            media_list,
            user,
            folder,
            concurrent,
            limit,
            max_retries,
            quiet,
        } => {
            let access_token = require_token(&cli.provider)?;
            let items = read_media_list(&media_list)
                .with_context(|| format!("Failed to load {}", media_list.display()))?;
            let (cache, counters) = open_store(&cli.store).await?;

            if !quiet {
                println!(
                    "\n{}{} {}\n",
                    CAMERA,
                    "likesync".bold().magenta(),
                    "- Liked Media Mirror".dimmed()
                );
            }

            let credentials = MemoryCredentialStore::with_users([UserCredential {
                id: user.clone(),
                email: String::new(),
                password_hash: String::new(),
                provider_tokens: Some(ProviderTokens {
                    access_token,
                    token_type: "bearer".to_string(),
                    uid: String::new(),
                }),
            }]);

            let reporter: SharedProgressReporter = if quiet {
                NoopReporter::shared()
            } else {
                Arc::new(IndicatifReporter::new())
            };

            let ctx = SyncContext {
                jobs: JobClient::new(client, config),
                credentials: Arc::new(credentials),
                cache,
                counters,
                reporter,
            };

            let options = SyncOptions {
                folder,
                limit,
                max_concurrent: concurrent,
                continue_on_error: true,
                retry: RetryPolicy {
                    max_retries,
                    ..Default::default()
                },
            };

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let report = sync_liked_media(&ctx, &user, items, &options, cancel)
                .await
                .context("Failed to sync liked media")?;

            if !quiet && !report.failed_items.is_empty() {
                println!("\n{}", "Failed items:".red().bold());
                for (media_id, error) in &report.failed_items {
                    println!("  {}{} - {}", CROSS, media_id.yellow(), error.dimmed());
                }
            }

            if !quiet {
                println!(
                    "\n{} {}\n",
                    "Saved for this user:".dimmed(),
                    report.user_total.to_string().cyan()
                );
            }

            if report.failed > 0 && report.submitted == 0 {
                std::process::exit(1);
            }
        }

        Command::Stats { user } => {
            let (cache, counters) = open_store(&cli.store).await?;
            println!("Total saved: {}", counters.total().await?.to_string().cyan());

            if let Some(user) = user {
                println!(
                    "Saved by {}: {}",
                    user.bold(),
                    counters.user_total(&user).await?.to_string().cyan()
                );
                for entry in cache.saved(&user).await?.into_iter().take(20) {
                    println!(
                        "  {} {}",
                        entry.synced_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                        entry.media_id
                    );
                }
            }
        }

        Command::Unlink { user } => {
            let (cache, _) = open_store(&cli.store).await?;
            unlink_user(cache.as_ref(), &user)
                .await
                .context("Failed to clear sync history")?;
            println!("{SUCCESS}Cleared sync history for {}", user.bold());
        }

        Command::Account => {
            let access_token = require_token(&cli.provider)?;
            let account = fetch_account(&client, &config, &access_token)
                .await
                .context("Account check failed")?;
            println!(
                "{SUCCESS}Linked to account {} {}",
                account.uid.bold(),
                account.display_name.unwrap_or_default().dimmed()
            );
        }

        Command::AuthorizeUrl => {
            if config.client_id.is_empty() {
                bail!("A client id is required (--client-id or LIKESYNC_CLIENT_ID)");
            }
            println!("{}", config.authorize_link());
        }

        Command::Exchange { code } => {
            let tokens = exchange_code(&client, &config, &code)
                .await
                .context("Authorization code exchange failed")?;
            println!("{SUCCESS}Access token for account {}:", tokens.uid.bold());
            println!("{}", tokens.access_token);
        }
    }

    Ok(())
}
