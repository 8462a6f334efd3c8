use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use supports_color::Stream as ColorStream;
use url::Url;

use pagefetch::config::{ConfigManager, Settings};
use pagefetch::downloader::ACCEPT_LANGUAGE;
use pagefetch::{DownloadError, Downloader, Fetcher};

const COOKIE_ENV: &str = "PAGEFETCH_COOKIE";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Download web pages as text with a browser identity and session cookie."
)]
struct Cli {
    /// Log request details to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a page and print its body.
    Get(GetArgs),
    /// Manage the session cookie sent with every request.
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(Args)]
struct GetArgs {
    /// URL of the page to download.
    url: Url,
    /// Preferred language sent as Accept-Language (defaults to the stored setting).
    #[arg(short, long)]
    language: Option<String>,
    /// Extra request header in `Name: value` form. May be repeated.
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
    /// Request timeout in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum CookieAction {
    /// Store a cookie string, e.g. one obtained after solving a challenge.
    Set { value: String },
    /// Print the stored cookie string.
    Show,
    /// Forget the stored cookie string.
    Clear,
}

fn main() -> Result<()> {
    let Cli { verbose, command } = Cli::parse();
    init_logging(verbose);
    let config = ConfigManager::new()?;

    match command {
        Commands::Get(args) => handle_get(args, &config),
        Commands::Cookies { action } => handle_cookies(action, &config),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "pagefetch=debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn handle_get(args: GetArgs, config: &ConfigManager) -> Result<()> {
    let settings = config.load().context("failed to load settings")?;

    let mut fetcher_config = settings.fetcher_config();
    if let Some(secs) = args.timeout {
        fetcher_config = fetcher_config.with_read_timeout(Duration::from_secs(secs));
    }
    let fetcher = Fetcher::new(fetcher_config).context("failed to initialize HTTP client")?;
    if let Some(cookies) = load_cookies(&settings) {
        fetcher.set_cookies(cookies);
    }

    let headers: HashMap<String, String> = args.headers.into_iter().collect();
    // The stored language only fills in when no Accept-Language was given.
    let language = args.language.or_else(|| {
        if has_accept_language(&headers) {
            None
        } else {
            settings.language
        }
    });

    let spinner = create_spinner(&args.url);
    let result = fetch(&fetcher, args.url.as_str(), language, headers);
    spinner.finish_and_clear();

    match result {
        Ok(Some(body)) => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(body.as_bytes())
                .and_then(|()| stdout.flush())
                .context("failed to write page body")?;
            Ok(())
        }
        Ok(None) => {
            eprintln!("{} {}", label("No content:"), args.url);
            Ok(())
        }
        Err(DownloadError::ChallengeRequired { url }) => Err(anyhow!(
            "{url} requested a reCaptcha challenge. Solve it in a browser, then store the \
             resulting cookie with `pagefetch cookies set <cookie>`."
        )),
        Err(err) => Err(anyhow!(err).context(format!("failed to download {}", args.url))),
    }
}

fn fetch(
    downloader: &dyn Downloader,
    url: &str,
    language: Option<String>,
    mut headers: HashMap<String, String>,
) -> Result<Option<String>, DownloadError> {
    match language {
        Some(language) if headers.is_empty() => downloader.download_with_language(url, &language),
        Some(language) => {
            headers.retain(|name, _| !name.eq_ignore_ascii_case(ACCEPT_LANGUAGE));
            headers.insert(ACCEPT_LANGUAGE.to_string(), language);
            downloader.download_with_headers(url, &headers)
        }
        None if headers.is_empty() => downloader.download(url),
        None => downloader.download_with_headers(url, &headers),
    }
}

fn has_accept_language(headers: &HashMap<String, String>) -> bool {
    headers
        .keys()
        .any(|name| name.eq_ignore_ascii_case(ACCEPT_LANGUAGE))
}

fn handle_cookies(action: CookieAction, config: &ConfigManager) -> Result<()> {
    match action {
        CookieAction::Set { value } => {
            let value = value.trim();
            if value.is_empty() {
                return Err(anyhow!("cookie must not be empty"));
            }
            config
                .save_cookies(Some(value))
                .context("failed to save cookie")?;
            println!("Cookie saved to {}", config.config_file().display());
        }
        CookieAction::Show => {
            let settings = config.load().context("failed to load settings")?;
            match settings.cookies {
                Some(cookies) => println!("{cookies}"),
                None => println!("No cookie stored."),
            }
        }
        CookieAction::Clear => {
            config.save_cookies(None).context("failed to clear cookie")?;
            println!("Cookie cleared.");
        }
    }
    Ok(())
}

fn load_cookies(settings: &Settings) -> Option<String> {
    if let Ok(cookies) = std::env::var(COOKIE_ENV) {
        if !cookies.trim().is_empty() {
            return Some(cookies);
        }
    }
    settings.cookies.clone()
}

fn create_spinner(url: &Url) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {wide_msg}")
            .unwrap()
            .tick_chars("⠁⠃⠇⡇⣇⣧⣷⣿"),
    );
    pb.set_message(format!("Downloading {url}"));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn label(text: &str) -> String {
    let use_color = supports_color::on_cached(ColorStream::Stderr)
        .map(|level| level.has_basic)
        .unwrap_or(false);
    if use_color {
        format!("{}", text.yellow().bold())
    } else {
        text.to_string()
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name missing in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingDownloader {
        headers: RefCell<Vec<HashMap<String, String>>>,
    }

    impl Downloader for RecordingDownloader {
        fn download_with_headers(
            &self,
            _url: &str,
            headers: &HashMap<String, String>,
        ) -> Result<Option<String>, DownloadError> {
            self.headers.borrow_mut().push(headers.clone());
            Ok(None)
        }
    }

    #[test]
    fn language_flag_replaces_header_in_any_case() {
        let recorder = RecordingDownloader::default();
        let headers = HashMap::from([
            ("accept-language".to_string(), "x".to_string()),
            ("Referer".to_string(), "https://example.com/".to_string()),
        ]);

        fetch(&recorder, "https://example.com", Some("de".to_string()), headers).unwrap();

        let sent = recorder.headers.borrow();
        let languages: Vec<_> = sent[0]
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(ACCEPT_LANGUAGE))
            .map(|(_, value)| value.as_str())
            .collect();
        assert_eq!(languages, ["de"]);
        assert_eq!(sent[0].len(), 2);
    }

    #[test]
    fn header_without_language_is_sent_unchanged() {
        let recorder = RecordingDownloader::default();
        let headers = HashMap::from([("ACCEPT-LANGUAGE".to_string(), "fr".to_string())]);
        assert!(has_accept_language(&headers));

        fetch(&recorder, "https://example.com", None, headers.clone()).unwrap();

        assert_eq!(recorder.headers.borrow()[0], headers);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = Cli::try_parse_from([
            "pagefetch",
            "get",
            "https://example.com",
            "--timeout",
            "0",
        ]);
        assert!(result.is_err());

        let result = Cli::try_parse_from([
            "pagefetch",
            "get",
            "https://example.com",
            "--timeout",
            "5",
        ]);
        assert!(result.is_ok());
    }

    #[test]
    fn parses_header_arguments() {
        assert_eq!(
            parse_header("X-Extra:  1 ").unwrap(),
            ("X-Extra".to_string(), "1".to_string())
        );
        assert!(parse_header(": value").is_err());
        assert!(parse_header("no-colon").is_err());
    }
}
