use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use ghdata_core::sync::{self, ProgressCallback};
use ghdata_core::{
    Context, FailurePolicy, GitHubClient, IssueSyncOptions, Storage, SyncProgress,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod report;

fn cli() -> Command {
    Command::new("ghdata")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sync GitHub repositories and issues into SQLite and report on them")
        .subcommand_required(true)
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("SQLite DB path (default: $GHDATA_DB or ghdata.sqlite)"),
        )
        .arg(
            Arg::new("per-page")
                .long("per-page")
                .global(true)
                .value_parser(value_parser!(u32).range(1..=100))
                .help("Items per API page"),
        )
        .subcommand(Command::new("ping").about("Sanity check the CLI"))
        .subcommand(Command::new("me").about("Show the authenticated GitHub user"))
        .subcommand(Command::new("rate-limit").about("Show rate limit status"))
        .subcommand(Command::new("sync-repos").about("Fetch all repos and store them"))
        .subcommand(
            Command::new("sync-issues")
                .about("Fetch issues and PRs for the top repos and store them")
                .arg(
                    Arg::new("top-n")
                        .long("top-n")
                        .value_parser(value_parser!(usize))
                        .help("How many repos (by stars, then forks) to sync"),
                )
                .arg(
                    Arg::new("incremental")
                        .long("incremental")
                        .action(ArgAction::SetTrue)
                        .help("Only fetch items updated since the last sync of each repo"),
                )
                .arg(
                    Arg::new("keep-going")
                        .long("keep-going")
                        .action(ArgAction::SetTrue)
                        .help("Continue with the next repo when one fails"),
                ),
        )
        .subcommand(
            Command::new("list-repos").about("List top repos from the DB").arg(
                Arg::new("limit")
                    .long("limit")
                    .default_value("10")
                    .value_parser(value_parser!(usize)),
            ),
        )
        .subcommand(Command::new("metrics").about("Print issue and PR metrics"))
        .subcommand(
            Command::new("report").about("Write a Markdown report").arg(
                Arg::new("out")
                    .long("out")
                    .default_value("report.md")
                    .value_parser(value_parser!(PathBuf)),
            ),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let Some((name, sub)) = matches.subcommand() else {
        anyhow::bail!("no command given");
    };

    if name == "ping" {
        println!("pong");
        return Ok(());
    }

    check_dotenv(dotenvy::dotenv())?;
    let ctx = load_context(matches)?;
    info!("Context: {:?}", ctx);

    match name {
        "me" => {
            let client = GitHubClient::new(&ctx)?;
            let user = client.fetch_authenticated_user().await?;
            match user.get("login").and_then(|l| l.as_str()) {
                Some(login) => println!("{}", login),
                None => println!("<no login field>"),
            }
        }
        "rate-limit" => {
            let client = GitHubClient::new(&ctx)?;
            let status = client.fetch_rate_limit_status().await?;
            println!("core remaining: {}/{}", status.remaining, status.limit);
        }
        "sync-repos" => {
            let client = GitHubClient::new(&ctx)?;
            let storage = open_storage(&ctx).await?;
            let n = sync::sync_repositories(&client, &storage, ctx.per_page).await?;
            println!("synced repos: {}", n);
        }
        "sync-issues" => {
            let client = GitHubClient::new(&ctx)?;
            let storage = open_storage(&ctx).await?;
            let options = IssueSyncOptions {
                top_n: sub.get_one::<usize>("top-n").copied().unwrap_or(ctx.top_n),
                per_page: ctx.per_page,
                incremental: sub.get_flag("incremental"),
                failure_policy: if sub.get_flag("keep-going") {
                    FailurePolicy::Isolate
                } else {
                    FailurePolicy::Abort
                },
            };

            let on_progress: ProgressCallback = Box::new(|event| match event {
                SyncProgress::RepoSynced { repo, count, .. } => println!("{}: {}", repo, count),
                SyncProgress::RepoFailed { repo, error } => eprintln!("{}: failed: {}", repo, error),
                _ => {}
            });
            let summary = sync::sync_issues(&client, &storage, &options, Some(&on_progress)).await?;
            println!("synced issues: {}", summary.total);
            if !summary.failures.is_empty() {
                anyhow::bail!("{} repositories failed to sync", summary.failures.len());
            }
        }
        "list-repos" => {
            let storage = open_storage(&ctx).await?;
            let limit = sub.get_one::<usize>("limit").copied().unwrap_or(10);
            for repo in storage.list_repos(limit).await? {
                let pushed_at = repo
                    .pushed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{} | ⭐ {} | forks {} | {}",
                    repo.full_name, repo.stargazers_count, repo.forks_count, pushed_at
                );
            }
        }
        "metrics" => {
            let storage = open_storage(&ctx).await?;
            let m = storage.metrics().await?;
            println!("total: {}", m.total);
            println!("issues: open {}, closed {}", m.issues_open, m.issues_closed);
            println!("prs: open {}, closed {}", m.prs_open, m.prs_closed);
            for repo in &m.top_open_issues {
                println!("{} | {}", repo.full_name, repo.open_issues);
            }
        }
        "report" => {
            let storage = open_storage(&ctx).await?;
            let out = sub
                .get_one::<PathBuf>("out")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("report.md"));
            let metrics = storage.metrics().await?;
            let text = report::render_markdown(&metrics, chrono::Utc::now());
            std::fs::write(&out, text)
                .with_context(|| format!("cannot write report to {}", out.display()))?;
            println!("wrote report: {}", out.display());
        }
        other => anyhow::bail!("unknown command: {}", other),
    }

    Ok(())
}

fn load_context(matches: &ArgMatches) -> anyhow::Result<Context> {
    let mut ctx = Context::from_env()?;
    if let Some(db) = matches.get_one::<PathBuf>("db") {
        ctx.db_path = db.clone();
    }
    if let Some(per_page) = matches.get_one::<u32>("per-page") {
        ctx.per_page = *per_page;
    }
    ctx.validate()?;
    Ok(ctx)
}

async fn open_storage(ctx: &Context) -> anyhow::Result<Storage> {
    Storage::open(&ctx.db_path)
        .await
        .with_context(|| format!("cannot open database {}", ctx.db_path.display()))
}

/// A missing .env is fine, the real environment still applies. Anything else is reported.
fn check_dotenv<T>(result: Result<T, dotenvy::Error>) -> anyhow::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(anyhow::Error::new(err).context("cannot load .env")),
    }
}
