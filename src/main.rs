use dotenv::dotenv;
use futures::future::join_all;
use std::env;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rusty_resolver::{MediaRequest, ResolutionPolicy, ResolverConfig, ResolverError, ResolverResult};

const USAGE: &str = "usage:
  rusty-resolver <audio|video> <query-or-link>...
  rusty-resolver <song-audio|song-video> <link> <format-id> <title>";

/// Turns the command line into one or more requests.
fn parse_args(args: &[String]) -> ResolverResult<Vec<MediaRequest>> {
    let invalid = || ResolverError::InvalidRequest(USAGE.to_string());
    let (mode, rest) = args.split_first().ok_or_else(invalid)?;

    match (mode.as_str(), rest) {
        (_, []) => Err(invalid()),
        ("audio", queries) => Ok(queries.iter().map(|q| MediaRequest::audio(q)).collect()),
        ("video", links) => Ok(links.iter().map(|l| MediaRequest::video(l)).collect()),
        ("song-audio", [link, format_id, title @ ..]) if !title.is_empty() => {
            Ok(vec![MediaRequest::song_audio(link, format_id, &title.join(" "))])
        }
        ("song-video", [link, format_id, title @ ..]) if !title.is_empty() => {
            Ok(vec![MediaRequest::song_video(link, format_id, &title.join(" "))])
        }
        _ => Err(invalid()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rusty_resolver=debug,warn")),
        )
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();

    dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let requests = match parse_args(&args) {
        Ok(requests) => requests,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    let config = match ResolverConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let policy = ResolutionPolicy::from_config(&config);

    // Requests are independent; resolve them concurrently
    let results = join_all(requests.iter().map(|request| policy.resolve(request))).await;

    let mut resolved_all = true;
    for (request, result) in requests.iter().zip(results) {
        match result {
            Some(source) => println!("{}\t{}", request.query, source),
            None => {
                resolved_all = false;
                println!("{}\t(none, none)", request.query);
            }
        }
    }

    if resolved_all {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
