//! Entry point for the iosmon TUI. Parses args, resolves the endpoint and runs the App.

mod app;
mod ui;

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use app::{App, AppOptions};
use iosmon::persist::{config_dir, load_settings, save_settings, validate_ws_url, ThemeMode};
use iosmon::state::DEFAULT_WS_URL;
use iosmon::ws::ClientConfig;

const USAGE: &str = "[--tls-ca CERT_PEM|-t CERT_PEM] [--device UDID|-d UDID] \
[--process NAME|-p NAME] [--stackshot] [--theme system|light|dark] [--forget URL] \
[--dry-run] [ws://HOST:PORT]";

#[derive(Debug, Default)]
struct ParsedArgs {
    url: Option<String>,
    tls_ca: Option<String>,
    device: Option<String>,
    process: Option<String>,
    stackshot: bool,
    theme: Option<ThemeMode>,
    forget: Option<String>,
    dry_run: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "iosmon".into());
    let mut parsed = ParsedArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                return Err(format!("Usage: {prog} {USAGE}"));
            }
            "--tls-ca" | "-t" => {
                parsed.tls_ca = it.next();
            }
            "--device" | "-d" => {
                parsed.device = it.next();
            }
            "--process" | "-p" => {
                parsed.process = it.next();
            }
            "--stackshot" => {
                parsed.stackshot = true;
            }
            "--theme" => {
                let v = it.next().unwrap_or_default();
                parsed.theme = Some(
                    ThemeMode::parse(&v)
                        .ok_or_else(|| format!("Unknown theme '{v}'. Usage: {prog} {USAGE}"))?,
                );
            }
            "--forget" => {
                parsed.forget = it.next();
            }
            "--dry-run" => {
                parsed.dry_run = true;
            }
            _ if arg.starts_with("--tls-ca=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.tls_ca = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--device=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.device = Some(v.to_string());
                    }
                }
            }
            _ => {
                if parsed.url.is_none() {
                    parsed.url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument. Usage: {prog} {USAGE}"));
                }
            }
        }
    }
    Ok(parsed)
}

/// The terminal belongs to the TUI, so logs go to `<config dir>/iosmon.log`.
fn init_logging() -> anyhow::Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("iosmon.log"))
        .context("opening log file")?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("installing log subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let mut settings = load_settings();

    if let Some(url) = parsed.forget.as_deref() {
        if settings.forget(url) {
            save_settings(&settings).context("saving history")?;
            eprintln!("Removed {url} from history.");
        } else {
            eprintln!("{url} is not in history.");
        }
        if parsed.url.is_none() {
            return Ok(());
        }
    }

    let raw_url = parsed
        .url
        .clone()
        .or_else(|| settings.most_recent().map(String::from))
        .unwrap_or_else(|| DEFAULT_WS_URL.to_string());
    let url = match validate_ws_url(&raw_url) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("{e}");
            return Ok(());
        }
    };

    if let Some(theme) = parsed.theme {
        settings.theme = theme;
    }
    settings.remember(&url, chrono::Utc::now().timestamp_millis());
    save_settings(&settings).context("saving history")?;

    if parsed.dry_run {
        eprintln!("Would connect to {url}");
        return Ok(());
    }

    init_logging()?;
    info!("iosmon starting, endpoint {url}");

    let mut app = App::new(AppOptions {
        url,
        device: parsed.device,
        target_process: parsed.process,
        stackshot: parsed.stackshot,
        theme: settings.theme,
        client: ClientConfig {
            tls_ca: parsed.tls_ca.map(PathBuf::from),
            ..ClientConfig::default()
        },
    });
    app.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ParsedArgs, String> {
        parse_args(
            std::iter::once("iosmon")
                .chain(args.iter().copied())
                .map(String::from),
        )
    }

    #[test]
    fn flags_and_url() {
        let p = parse(&[
            "-t", "/tmp/ca.pem", "--device", "abc", "-p", "Safari", "--stackshot", "--theme",
            "light", "ws://host:1",
        ])
        .unwrap();
        assert_eq!(p.tls_ca.as_deref(), Some("/tmp/ca.pem"));
        assert_eq!(p.device.as_deref(), Some("abc"));
        assert_eq!(p.process.as_deref(), Some("Safari"));
        assert!(p.stackshot);
        assert_eq!(p.theme, Some(ThemeMode::Light));
        assert_eq!(p.url.as_deref(), Some("ws://host:1"));
    }

    #[test]
    fn help_and_errors() {
        assert!(parse(&["--help"]).unwrap_err().starts_with("Usage:"));
        assert!(parse(&["a", "b"]).unwrap_err().contains("Unexpected argument"));
        assert!(parse(&["--theme", "neon"]).unwrap_err().contains("Unknown theme"));
        assert_eq!(parse(&["--device=xyz"]).unwrap().device.as_deref(), Some("xyz"));
    }
}
