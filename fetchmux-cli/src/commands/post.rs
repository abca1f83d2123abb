//! Post command - send a POST request with an optional JSON or form body.

use std::sync::mpsc;

use super::common::{parse_form_fields, report, RequestOptions, Session};
use crate::error::CliError;

/// Arguments for the post command.
pub struct PostArgs {
    pub url: String,
    pub json: Option<String>,
    pub form: Vec<String>,
    pub options: RequestOptions,
}

/// Run the post command.
pub fn run(args: PostArgs) -> Result<(), CliError> {
    if args.json.is_some() && !args.form.is_empty() {
        return Err(CliError::InvalidArgument(
            "--json and --form cannot be combined".to_string(),
        ));
    }
    let json = args
        .json
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| CliError::InvalidArgument(format!("--json is not valid JSON: {}", e)))?;
    let form = parse_form_fields(&args.form)?;

    let session = Session::new(&args.options)?;
    let headers = args.options.header_fields()?;
    let priority = args.options.priority;
    let (tx, rx) = mpsc::channel();
    let tag = args.url.clone();

    if let Some(body) = json {
        let (bar, progress) = session.progress_bar(&args.url);
        session.service().post_json(
            &args.url,
            headers,
            &body,
            priority,
            Some(progress),
            move |result| {
                bar.finish_and_clear();
                let _ = tx.send((tag, result));
            },
        );
    } else if !form.is_empty() {
        // Form posts report no progress.
        session
            .service()
            .post_form(&args.url, headers, &form, priority, move |result| {
                let _ = tx.send((tag, result));
            });
    } else {
        let (bar, progress) = session.progress_bar(&args.url);
        session.service().post(
            &args.url,
            headers,
            priority,
            Some(progress),
            move |result| {
                bar.finish_and_clear();
                let _ = tx.send((tag, result));
            },
        );
    }

    let outcomes = session.collect(rx, 1);
    report(outcomes, args.options.output.as_deref(), true)
}
