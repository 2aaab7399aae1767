//! jjdeck - terminal dashboard for jj
//!
//! Without a subcommand opens the interactive log and diff view. The
//! `comment` and `hunks` subcommands expose the same comment store to
//! scripts and coding agents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jjdeck::comments::{CommentAnchor, CommentService, CommentStore, NewComment};
use jjdeck::config::Config;
use jjdeck::export::{export, ExportFormat};
use jjdeck::gateway::{Gateway, JjGateway};
use jjdeck::process::ProcessRunner;
use jjdeck::revlog::{strip_ansi, LogQuery, LogRequests};
use jjdeck::{logging, tui};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "jjdeck")]
#[command(about = "Terminal dashboard for jj with hunk-anchored review comments")]
#[command(version)]
struct Cli {
    /// Repository to operate on (default: current directory)
    #[arg(short = 'R', long, global = true)]
    repo: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive dashboard (default)
    Ui,

    /// Print one page of the revision log
    Log {
        /// Revset to show (default: jj's default log revset)
        #[arg(short = 'r', long)]
        revisions: Option<String>,

        /// Maximum number of revisions
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Manage comments
    Comment {
        #[command(subcommand)]
        command: CommentCommand,
    },

    /// List the hunks of a revision with their ids
    Hunks {
        #[arg(short = 'r', long, default_value = "@")]
        revisions: String,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum CommentCommand {
    /// List comments
    List {
        /// Target revisions to show
        #[arg(short = 'r', long, default_value = "@")]
        revisions: String,

        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a comment to a hunk
    Set {
        #[arg(short = 'r', long, default_value = "@")]
        revisions: String,

        /// Hunk ID (h1, h2, ...)
        #[arg(long)]
        hunk: String,

        /// Comment text
        #[arg(short = 'm', long)]
        message: String,

        /// Comment author label (default: from config)
        #[arg(long)]
        author: Option<String>,

        /// Comment type
        #[arg(long = "type", default_value = jjdeck::comments::DEFAULT_KIND)]
        kind: String,

        /// Mark as explanation
        #[arg(long)]
        explanation: bool,
    },

    /// Delete a comment by id, or every comment on a hunk
    Delete {
        /// Comment ID
        id: Option<String>,

        #[arg(short = 'r', long, default_value = "@")]
        revisions: String,

        /// Hunk ID
        #[arg(long)]
        hunk: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a default config file
    Init,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let command = cli.command.unwrap_or(Commands::Ui);

    if let Commands::Config {
        command: ConfigCommand::Init,
    } = command
    {
        return cmd_config_init();
    }

    let config = Config::load()?;
    if let Err(err) = logging::init(&config.state_root()) {
        eprintln!("warning: logging disabled: {err:#}");
    }

    let cwd = match cli.repo {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let runner = ProcessRunner::new(config.jj.binary.clone());
    let gateway: Arc<dyn Gateway> = Arc::new(JjGateway::new(runner, cwd, config.jj.timeout()));

    match command {
        Commands::Ui => {
            let service = open_service(&gateway, &config)?;
            tui::run(gateway, service, config)
        }
        Commands::Log { revisions, limit } => cmd_log(gateway.as_ref(), &config, revisions, limit),
        Commands::Comment { command } => {
            let mut service = open_service(&gateway, &config)?;
            cmd_comment(&mut service, &config, command)
        }
        Commands::Hunks { revisions } => {
            let mut service = open_service(&gateway, &config)?;
            cmd_hunks(&mut service, &revisions)
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn open_service(gateway: &Arc<dyn Gateway>, config: &Config) -> Result<CommentService> {
    let repo_root = gateway
        .repo_root()
        .context("Not inside a jj repository")?;
    let store = CommentStore::open(&config.state_root(), &repo_root);
    Ok(CommentService::new(Arc::clone(gateway), store))
}

fn cmd_config_init() -> Result<()> {
    let path = Config::default_path().context("Could not determine the config directory")?;
    Config::create_default(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_log(gateway: &dyn Gateway, config: &Config, revisions: Option<String>, limit: Option<usize>) -> Result<()> {
    let mut query = LogQuery::new(limit.unwrap_or(config.log.limit).max(1));
    if let Some(revset) = revisions {
        query = query.with_revset(revset);
    }
    let page = LogRequests::fetch_page(gateway, &query)?;

    for commit in &page.commits {
        for line in &commit.display_lines {
            println!("{}", strip_ansi(line));
        }
    }
    if page.has_more {
        println!("(more revisions available; raise --limit to see them)");
    }
    Ok(())
}

fn cmd_comment(service: &mut CommentService, config: &Config, command: CommentCommand) -> Result<()> {
    match command {
        CommentCommand::List { revisions, json } => {
            let reports = service.list(&revisions)?;
            let format = if json { ExportFormat::Json } else { ExportFormat::Text };
            let output = export(&reports, format)?;
            if output.ends_with('\n') {
                print!("{output}");
            } else {
                println!("{output}");
            }
        }
        CommentCommand::Set {
            revisions,
            hunk,
            message,
            author,
            kind,
            explanation,
        } => {
            let comment = NewComment {
                hunk_id: hunk.clone(),
                text: message,
                author: author.unwrap_or_else(|| config.comments.author.clone()),
                kind: if explanation { "explanation".to_string() } else { kind },
            };
            let id = service.add(&revisions, comment)?;
            println!("Added comment {id} on {hunk}");
        }
        CommentCommand::Delete { id, revisions, hunk } => match (id, hunk) {
            (Some(id), _) => {
                service.delete_comment(&id)?;
                println!("Deleted comment {id}");
            }
            (None, Some(hunk)) => {
                let count = service.delete_hunk(&revisions, &hunk)?;
                println!("Deleted {count} comments from {hunk}");
            }
            (None, None) => anyhow::bail!("Provide a comment ID or --hunk"),
        },
    }
    Ok(())
}

fn cmd_hunks(service: &mut CommentService, revisions: &str) -> Result<()> {
    let (revision, hunks) = service.hunks(revisions)?;
    println!("{} - \"{}\"", revision.change_id, revision.description);
    if hunks.is_empty() {
        println!("  No hunks");
        return Ok(());
    }
    for hunk in hunks {
        let range = CommentAnchor::from_entry(&hunk.entry).line_range.display();
        let comments = match hunk.comments {
            0 => String::new(),
            1 => " (1 comment)".to_string(),
            n => format!(" ({n} comments)"),
        };
        println!("  {} {} lines {}{}", hunk.entry.id, hunk.entry.file_path, range, comments);
    }
    Ok(())
}
