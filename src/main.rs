//! prbot CLI: review a PR headlessly, post a comment, manage tokens.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use prbot::config::ConfigStore;
use prbot::review::{CommentDraft, ReviewService};
use prbot::types::Severity;

#[derive(Parser)]
#[command(name = "prbot", version, about = "Local PR review & suggestion bot.")]
struct Cli {
    /// Config dir (defaults to the platform config directory).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a review headlessly and print a markdown report.
    Review {
        /// Pull request URL (GitHub/GitLab/Bitbucket/Azure DevOps/Gitea).
        pr_url: String,
        /// Language override (e.g. python, typescript).
        #[arg(long)]
        language: Option<String>,
        /// Engine provider override (heuristic|openai). Enables strict mode.
        #[arg(long)]
        llm_provider: Option<String>,
        /// Model/deployment override. Enables strict mode.
        #[arg(long)]
        llm_model: Option<String>,
    },
    /// Post a formatted suggestion as a PR comment.
    PostComment {
        pr_url: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        file: Option<String>,
        /// info|warn|error (defaults to info).
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        suggestion: Option<String>,
        #[arg(long)]
        code_example: Option<String>,
        #[arg(long)]
        start_line: Option<u64>,
        #[arg(long)]
        end_line: Option<u64>,
        /// Link to the discussion comment this responds to.
        #[arg(long)]
        related_url: Option<String>,
    },
    /// Manage forge tokens.
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
}

#[derive(Subcommand)]
enum TokenCommand {
    /// Store a token for a platform + host
    /// (for Bitbucket use username:app_password).
    Set {
        /// github|gitlab|bitbucket|azure|gitea
        platform: String,
        /// e.g. github.com, dev.azure.com, gitea.example.com:3000
        host: String,
        token: String,
    },
    /// List configured tokens (values redacted).
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let store = ConfigStore::new(cli.config_dir)?;

    match cli.command {
        Command::Review {
            pr_url,
            language,
            llm_provider,
            llm_model,
        } => {
            let service = ReviewService::new(store.load()?);
            let result = service
                .review(
                    &pr_url,
                    language.as_deref(),
                    llm_provider.as_deref(),
                    llm_model.as_deref(),
                )
                .await?;
            println!("{}", result.as_markdown());
        }
        Command::PostComment {
            pr_url,
            message,
            file,
            severity,
            suggestion,
            code_example,
            start_line,
            end_line,
            related_url,
        } => {
            let service = ReviewService::new(store.load()?);
            let draft = CommentDraft {
                file_path: file,
                severity: severity.as_deref().map(Severity::parse),
                message,
                suggestion,
                code_example,
                start_line,
                end_line,
                related_url,
            };
            let locator = service.post_comment(&pr_url, &draft).await?;
            if locator.is_empty() {
                println!("Comment posted.");
            } else {
                println!("Comment posted: {locator}");
            }
        }
        Command::Token { command } => match command {
            TokenCommand::Set {
                platform,
                host,
                token,
            } => {
                let mut cfg = store.load()?;
                cfg.set_token(&platform, &host, &token);
                store.save(&cfg)?;
                println!("Token stored for {platform} at {host}.");
            }
            TokenCommand::List => {
                let cfg = store.load()?;
                if cfg.tokens.is_empty() {
                    println!("No tokens configured.");
                }
                let mut platforms: Vec<_> = cfg.tokens.iter().collect();
                platforms.sort_by_key(|(p, _)| p.as_str());
                for (platform, hosts) in platforms {
                    let mut hosts: Vec<_> = hosts.keys().collect();
                    hosts.sort();
                    for host in hosts {
                        println!("{platform}  {host}  ********");
                    }
                }
            }
        },
    }

    Ok(())
}
