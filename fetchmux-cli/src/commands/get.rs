//! Get command - download one or more URLs concurrently.
//!
//! Every URL is submitted as its own request. Repeated URLs are coalesced by
//! the download manager into one transfer and share one progress bar.

use std::collections::HashMap;
use std::sync::mpsc;

use tracing::info;

use super::common::{report, RequestOptions, Session};
use crate::error::CliError;

/// Arguments for the get command.
pub struct GetArgs {
    pub urls: Vec<String>,
    pub options: RequestOptions,
}

/// Run the get command.
pub fn run(args: GetArgs) -> Result<(), CliError> {
    let mut distinct: Vec<&str> = Vec::new();
    for url in &args.urls {
        if !distinct.contains(&url.as_str()) {
            distinct.push(url);
        }
    }
    match distinct.len() {
        0 => return Err(CliError::InvalidArgument("no URL given".to_string())),
        1 => {}
        _ if args.options.output.is_some() => {
            return Err(CliError::InvalidArgument(
                "--output needs exactly one distinct URL".to_string(),
            ))
        }
        _ => {}
    }

    let session = Session::new(&args.options)?;
    let headers = args.options.header_fields()?;
    let (tx, rx) = mpsc::channel();
    let mut bars = HashMap::new();

    for url in &args.urls {
        let (bar, progress) = bars
            .entry(url.as_str())
            .or_insert_with(|| session.progress_bar(url))
            .clone();
        let tx = tx.clone();
        let tag = url.clone();
        session.service().get(
            url,
            headers.clone(),
            args.options.priority,
            Some(progress),
            move |result| {
                bar.finish_and_clear();
                let _ = tx.send((tag, result));
            },
        );
    }
    drop(tx);

    info!(
        requests = args.urls.len(),
        distinct = distinct.len(),
        "requests submitted"
    );

    let outcomes = session.collect(rx, args.urls.len());
    report(outcomes, args.options.output.as_deref(), distinct.len() == 1)
}
