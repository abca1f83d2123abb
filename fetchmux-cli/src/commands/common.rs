//! Common types and utilities shared across CLI commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use fetchmux::config::DEFAULT_TIMEOUT_SECS;
use fetchmux::Bytes;
use fetchmux::{
    DownloadManager, FormFields, HeaderFields, LogIndicator, NetworkResult, NetworkService,
    ProgressCallback, ReqwestTransport, SerialDispatcher, ServiceConfig, TransportConfig,
    PRIORITY_DEFAULT,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::error::CliError;

/// Progress bar resolution (steps per completed download).
const PROGRESS_STEPS: u64 = 1000;

const PROGRESS_TEMPLATE: &str = "{spinner:.green} {msg:40!} [{bar:40.cyan/blue}] {percent:>3}%";

/// One response delivered to a command, tagged with its URL.
pub type Outcome = (String, NetworkResult<Bytes>);

/// Request options shared by every command.
#[derive(Debug, Clone, Args)]
pub struct RequestOptions {
    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Scheduling priority hint, higher is more urgent
    #[arg(short, long, default_value_t = PRIORITY_DEFAULT)]
    pub priority: f32,

    /// Write the response body to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Treat non-2xx responses as errors
    #[arg(long)]
    pub fail: bool,
}

impl RequestOptions {
    /// Parse the `--header` values.
    pub fn header_fields(&self) -> Result<HeaderFields, CliError> {
        self.headers.iter().map(|h| parse_header(h)).collect()
    }
}

/// Parse a `Name: value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String), CliError> {
    let (name, value) = raw.split_once(':').ok_or_else(|| {
        CliError::InvalidArgument(format!("header '{}' must look like 'Name: value'", raw))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "header '{}' has an empty name",
            raw
        )));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse `key=value` form arguments. Later duplicates win.
pub fn parse_form_fields(raw: &[String]) -> Result<FormFields, CliError> {
    raw.iter()
        .map(|field| {
            field
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| {
                    CliError::InvalidArgument(format!(
                        "form field '{}' must look like key=value",
                        field
                    ))
                })
        })
        .collect()
}

/// A request service wired to a real HTTP transport.
///
/// Fields drop in declaration order: the service before the notification
/// thread, and the runtime last.
pub struct Session {
    service: NetworkService,
    dispatcher: Arc<SerialDispatcher>,
    bars: MultiProgress,
    _runtime: Runtime,
}

impl Session {
    pub fn new(options: &RequestOptions) -> Result<Self, CliError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("fetchmux-io")
            .build()?;

        let config = TransportConfig::default()
            .with_timeout(Duration::from_secs(options.timeout))
            .with_error_for_status(options.fail);
        let transport = Arc::new(ReqwestTransport::with_runtime(
            config,
            runtime.handle().clone(),
        )?);

        let dispatcher = Arc::new(SerialDispatcher::new());
        let manager = DownloadManager::builder(transport)
            .dispatcher(dispatcher.clone())
            .indicator(Arc::new(LogIndicator::default()))
            .build();
        let service = NetworkService::with_config(
            manager,
            ServiceConfig::default().with_default_priority(options.priority),
        );

        Ok(Self {
            service,
            dispatcher,
            bars: MultiProgress::new(),
            _runtime: runtime,
        })
    }

    pub fn service(&self) -> &NetworkService {
        &self.service
    }

    /// Adds a progress bar for `url` and returns it with a callback feeding it.
    pub fn progress_bar(&self, url: &str) -> (ProgressBar, ProgressCallback) {
        let bar = self.bars.add(ProgressBar::new(PROGRESS_STEPS));
        if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(url.to_string());

        let feed = bar.clone();
        let callback: ProgressCallback = Arc::new(move |fraction: f64| {
            feed.set_position((fraction * PROGRESS_STEPS as f64).round() as u64);
        });
        (bar, callback)
    }

    /// Waits for `expected` outcomes, then for every pending notification.
    pub fn collect(&self, outcomes: Receiver<Outcome>, expected: usize) -> Vec<Outcome> {
        let collected: Vec<Outcome> = outcomes.iter().take(expected).collect();
        if collected.len() < expected {
            warn!(
                expected,
                received = collected.len(),
                "some requests never completed"
            );
        }
        self.dispatcher.flush();
        debug!(idle = self.service.manager().is_idle(), "session settled");
        collected
    }
}

/// Writes `body` to `path`, or to stdout when no path is given.
pub fn write_output(path: Option<&Path>, body: &[u8]) -> Result<(), CliError> {
    match path {
        Some(path) => std::fs::write(path, body)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(body)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Prints or writes every outcome and returns the first failure, if any.
///
/// With a single distinct URL the body is written out; otherwise a size
/// summary line is printed per request.
pub fn report(outcomes: Vec<Outcome>, output: Option<&Path>, single: bool) -> Result<(), CliError> {
    let mut first_error = None;

    for (url, result) in outcomes {
        match result {
            Ok(body) if single => {
                write_output(output, &body)?;
                // Coalesced duplicates carry the same body.
                break;
            }
            Ok(body) => println!("{}\t{} bytes", url, body.len()),
            Err(error) => {
                warn!(url = %url, error = %error, "request failed");
                if first_error.is_none() {
                    first_error = Some(CliError::Network { url, error });
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
