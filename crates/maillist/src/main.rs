//! `maillist` - mailing list relay daemon
//!
//! Polls an IMAP folder or a Maildir, routes every new message through the
//! subscription engine and relays posts to their hashtag audience over SMTP.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod imap;
mod maildir;
mod parse;
mod smtp;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use maillist_core::{
    Engine, MailFetch, MailSend, Message, Relay, RelayOutcome, SubscriberList, SubscriptionStore,
};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, RunOptions, validate_config};
use imap::ImapFetch;
use maildir::MaildirFetch;
use smtp::SmtpSend;

/// Simple mailing list with hashtag audiences.
#[derive(Debug, Parser)]
#[command(name = "maillist", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "./config.json")]
    config: PathBuf,

    /// Subscriber list file
    #[arg(short, long, default_value = "./maillist.json")]
    maillist: PathBuf,

    /// Also write logs to this file
    #[arg(short, long)]
    logfile: Option<PathBuf>,

    /// Seconds between mail checks in daemon mode
    #[arg(short, long, default_value_t = 60)]
    sleep: u64,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    /// Send a test mail on startup
    #[arg(short, long)]
    test: bool,

    /// Keep polling instead of processing the mailbox once
    #[arg(short, long)]
    daemon: bool,

    /// Log errors only, and with a log file nothing on the terminal
    #[arg(short, long)]
    reduce_logs: bool,

    /// Print the subscriber list and exit
    #[arg(long)]
    list_subscribers: bool,
}

impl Args {
    const fn run_options(&self) -> RunOptions {
        RunOptions {
            daemon: self.daemon,
            send_test_mail: self.test,
            sleep: self.sleep,
        }
    }

    /// Default log filter when `RUST_LOG` is not set.
    const fn default_filter(&self) -> &'static str {
        if self.reduce_logs {
            "maillist=error,maillist_core=error"
        } else if self.verbose {
            "maillist=debug,maillist_core=debug"
        } else {
            "maillist=info,maillist_core=info"
        }
    }

    /// Terminal logging is dropped only when errors go to a log file.
    const fn log_to_terminal(&self) -> bool {
        self.logfile.is_none() || !self.reduce_logs
    }
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let file_layer = match &args.logfile {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_logfile(path)?)),
        ),
        None => None,
    };
    let terminal_layer = args
        .log_to_terminal()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.default_filter().into()),
        )
        .with(file_layer)
        .with(terminal_layer)
        .init();
    Ok(())
}

fn open_logfile(path: &Path) -> anyhow::Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot open log file {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded environment from {}", path.display());
    }

    info!("Starting maillist");
    debug!("running as daemon: {}", args.daemon);

    let store = SubscriptionStore::load(args.maillist.clone())
        .with_context(|| format!("Cannot load subscriber list {}", args.maillist.display()))?;

    if args.list_subscribers {
        print_subscribers(store.list());
        return Ok(());
    }

    let config = Config::load(&args.config)?;
    if let Err(errors) = validate_config(&config, &args.run_options()) {
        for e in &errors {
            error!("{e}");
        }
        bail!(
            "Invalid configuration in {} ({} problem(s))",
            args.config.display(),
            errors.len()
        );
    }

    let sender = SmtpSend::from_config(&config).context("Cannot set up SMTP transport")?;

    if args.test {
        send_test_mail(&sender, config.test.receiver.as_deref().unwrap_or_default())
            .await
            .context("Cannot send test mail")?;
    }

    let engine = Engine::new(store, config.snippets());
    if config.mailbox.uses_imap() {
        let fetch = ImapFetch::from_config(&config.mailbox);
        serve(Relay::new(engine, fetch, sender), &args).await;
    } else {
        let fetch = MaildirFetch::new(config.mailbox.maildir.clone().unwrap_or_default());
        serve(Relay::new(engine, fetch, sender), &args).await;
    }

    Ok(())
}

/// Process the mailbox once, or keep polling in daemon mode until Ctrl-C.
async fn serve<F: MailFetch, S: MailSend>(mut relay: Relay<F, S>, args: &Args) {
    loop {
        run_cycle(&mut relay).await;

        if !args.daemon {
            break;
        }

        info!("Sleeping for {} seconds", args.sleep);
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(args.sleep)) => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Cannot listen for shutdown signal: {e}");
                }
                info!("Shutting down");
                break;
            }
        }
    }
}

async fn send_test_mail(sender: &SmtpSend, receiver: &str) -> anyhow::Result<()> {
    info!("Sending a test mail to {receiver}");
    let message =
        Message::to(receiver, "Maillist started!").text("The maillist service was started!");
    sender.send(&message).await?;
    Ok(())
}

async fn run_cycle<F: MailFetch, S: MailSend>(relay: &mut Relay<F, S>) {
    match relay.process_mails().await {
        Ok(outcomes) => {
            let forwarded = outcomes
                .iter()
                .filter(|o| matches!(o, RelayOutcome::Forwarded { .. }))
                .count();
            info!(
                "Processed {} message(s), forwarded {forwarded}",
                outcomes.len()
            );
        }
        Err(e) => error!("Failed to fetch mail: {e}"),
    }
}

fn print_subscribers(list: &SubscriberList) {
    for (key, addresses) in list.iter() {
        println!("{key} ({})", addresses.len());
        for address in addresses {
            println!("  {address}");
        }
    }
}
