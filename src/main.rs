use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{ArgGroup, Parser};
use log::{info, warn};

use tubescraper_rs::batch::BatchRunner;
use tubescraper_rs::browser::{BrowserHandle, CdpBrowser, LaunchOptions};
use tubescraper_rs::captcha::{CaptchaConfig, CaptchaSolver, TwoCaptchaClient};
use tubescraper_rs::config::{ScraperConfig, expand_channel_url};
use tubescraper_rs::export::DataExporter;
use tubescraper_rs::scraper::ProfileScraper;
use tubescraper_rs::session::StorageState;

/// Extract public metadata and gated contact emails from channel About
/// pages.
#[derive(Parser)]
#[command(name = "tubescraper", version, about)]
#[command(group(ArgGroup::new("target").required(true).args(["url", "input"])))]
struct Cli {
    /// Single channel URL or @handle to scrape.
    #[arg(long)]
    url: Option<String>,

    /// File with one channel URL or @handle per line. Blank lines and
    /// lines starting with `#` are skipped.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Base filename for the exported .json/.csv pair.
    #[arg(long, default_value = "results")]
    output: String,

    /// Directory the export files are written into.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Run the browser with a visible window.
    #[arg(long)]
    no_headless: bool,

    /// Saved session state to load cookies from (overrides SESSION_FILE).
    #[arg(long)]
    session: Option<PathBuf>,

    /// Browser-extension cookie export to convert into session state
    /// before the run.
    #[arg(long)]
    import_cookies: Option<PathBuf>,

    /// Verbose logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut config = ScraperConfig::from_env();
    if cli.no_headless {
        config.headless = false;
    }
    if let Some(path) = &cli.session {
        config.session_file = Some(path.clone());
    }

    let urls = collect_urls(&cli)?;
    info!("{} profile(s) queued", urls.len());

    let session = load_session(&cli, &config)?;

    let solver = build_solver(&config).await?;
    if solver.is_none() {
        warn!("no CAPTCHA_API_KEY set; gated emails will stay gated");
    }

    let had_session = session.is_some();
    let browser = Arc::new(
        CdpBrowser::launch(
            LaunchOptions {
                headless: config.headless,
                ..LaunchOptions::default()
            },
            session,
        )
        .await?,
    );

    if had_session {
        // Non-fatal: an expired session still allows metadata-only scraping.
        tubescraper_rs::session::verify_session(browser.as_ref(), config.navigation_timeout).await;
    }

    let mut builder = ProfileScraper::builder(browser.clone() as Arc<dyn BrowserHandle>)
        .config(config.clone());
    if let Some(solver) = solver {
        builder = builder.solver(solver);
    }

    let runner = BatchRunner::new(builder.build(), DataExporter::new(&cli.output_dir))
        .with_delay(config.delay_between_profiles)
        .with_filename(&cli.output);

    let summary = runner.run(&urls).await;
    summary.log();

    browser.close().await;
    Ok(())
}

fn collect_urls(cli: &Cli) -> anyhow::Result<Vec<String>> {
    if let Some(url) = &cli.url {
        return Ok(vec![expand_channel_url(url)]);
    }
    let path = cli.input.as_ref().context("either --url or --input is required")?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let urls: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(expand_channel_url)
        .collect();
    if urls.is_empty() {
        bail!("no channel URLs found in {}", path.display());
    }
    Ok(urls)
}

fn load_session(cli: &Cli, config: &ScraperConfig) -> anyhow::Result<Option<StorageState>> {
    if let Some(export) = &cli.import_cookies {
        let target = config
            .session_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("session.json"));
        let state = StorageState::import_from_export_file(export, &target)
            .with_context(|| format!("could not import cookies from {}", export.display()))?;
        info!("imported cookies from {}", export.display());
        return Ok(Some(state));
    }
    match &config.session_file {
        Some(path) if path.exists() => Ok(Some(StorageState::load(path)?)),
        Some(path) => {
            warn!("session file {} does not exist, continuing without", path.display());
            Ok(None)
        }
        None => Ok(None),
    }
}

async fn build_solver(
    config: &ScraperConfig,
) -> anyhow::Result<Option<Arc<dyn CaptchaSolver>>> {
    let Some(api_key) = &config.captcha_api_key else {
        return Ok(None);
    };

    let client = TwoCaptchaClient::with_config(
        api_key.clone(),
        CaptchaConfig {
            timeout: config.captcha_timeout,
            ..CaptchaConfig::default()
        },
    )?;

    let balance = client.balance().await;
    if balance < 0.01 {
        warn!("solving-service balance is {balance:.2}; challenges are likely to fail");
    } else {
        info!("solving-service balance: {balance:.2}");
    }

    Ok(Some(Arc::new(client)))
}
