use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

use git_handler::cache::GitCli;
use git_handler::protocol::{ErrorResponse, FileResponse, UpdateResponse};
use git_handler::{Enrichment, FileCheck, Handler, RepoLocator, Settings, TreePath};

#[derive(Parser)]
#[command(
    name = "git-handler",
    about = "Serve branches, trees and files from local mirrors of git repositories"
)]
struct Cli {
    /// Use the isolated test root (/tmp/test_repositories)
    #[arg(long, global = true)]
    test_mode: bool,

    /// Root directory for mirrors (overrides GIT_HANDLER_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Credential passed to the authorization check
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RepoArgs {
    /// Repository URL, e.g. https://github.com/owner/repo
    url: String,

    /// Branch to check out (defaults to DEFAULT_GIT_BRANCH)
    #[arg(long, short)]
    branch: Option<String>,

    /// Fetch and pull again after the mirror is ready
    #[arg(long)]
    force_update: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone the repository if missing, otherwise update it
    Update {
        #[command(flatten)]
        repo: RepoArgs,
    },

    /// List remote branch names
    Branches {
        #[command(flatten)]
        repo: RepoArgs,
    },

    /// Print the directory tree of a branch
    Tree {
        #[command(flatten)]
        repo: RepoArgs,

        /// Only descend into this path, e.g. resources/templates
        #[arg(long)]
        path: Option<String>,

        /// Content processor applied to every file (repeatable)
        #[arg(long = "processor")]
        processors: Vec<Enrichment>,
    },

    /// Print the content of a file
    File {
        #[command(flatten)]
        repo: RepoArgs,

        /// Path of the file inside the repository
        filename: String,
    },

    /// Check that files contain the given phrases
    Contains {
        #[command(flatten)]
        repo: RepoArgs,

        /// JSON list of file checks, or - for stdin
        checks: PathBuf,
    },

    /// Check dependencies and configuration
    Doctor,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if cli.test_mode {
        settings = settings.with_test_root();
    }
    if let Some(root) = &cli.root {
        settings = settings.with_root(root);
    }
    let handler = Handler::new(settings);
    let token = cli.token.as_deref();

    let result = match cli.command {
        Commands::Update { repo } => cmd_update(&handler, &repo, token),
        Commands::Branches { repo } => cmd_branches(&handler, &repo, token),
        Commands::Tree {
            repo,
            path,
            processors,
        } => cmd_tree(&handler, &repo, token, path, &processors),
        Commands::File { repo, filename } => cmd_file(&handler, &repo, token, &filename),
        Commands::Contains { repo, checks } => cmd_contains(&handler, &repo, token, &checks),
        Commands::Doctor => cmd_doctor(&handler),
    };

    if let Err(e) = result {
        log::debug!("Request failed: {:?}", e);
        let response = ErrorResponse::from(&e);
        match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{}", json),
            Err(_) => eprintln!("Error: {}", e),
        }
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(value: &T) -> git_handler::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{}", json);
    Ok(())
}

fn parse_locator(
    handler: &Handler,
    repo: &RepoArgs,
    token: Option<&str>,
) -> git_handler::Result<RepoLocator> {
    let locator: RepoLocator = repo.url.parse()?;
    handler.authorize(&locator, token)?;
    Ok(locator)
}

fn cmd_update(handler: &Handler, repo: &RepoArgs, token: Option<&str>) -> git_handler::Result<()> {
    let locator = parse_locator(handler, repo, token)?;
    let outcome = handler.sync(&locator, repo.branch.as_deref(), repo.force_update)?;
    print_json(&UpdateResponse::from(&outcome))
}

fn cmd_branches(
    handler: &Handler,
    repo: &RepoArgs,
    token: Option<&str>,
) -> git_handler::Result<()> {
    let locator = parse_locator(handler, repo, token)?;
    let mirror = handler.ensure_mirror(&locator, repo.branch.as_deref(), repo.force_update)?;
    print_json(&handler.list_branches(&mirror)?)
}

fn cmd_tree(
    handler: &Handler,
    repo: &RepoArgs,
    token: Option<&str>,
    path: Option<String>,
    processors: &[Enrichment],
) -> git_handler::Result<()> {
    let locator = parse_locator(handler, repo, token)?;
    let mirror = handler.ensure_mirror(&locator, repo.branch.as_deref(), repo.force_update)?;
    let path = path.map(TreePath::from);
    let tree = handler.materialize_tree(&mirror, repo.branch.as_deref(), path.as_ref(), processors)?;
    print_json(&tree)
}

fn cmd_file(
    handler: &Handler,
    repo: &RepoArgs,
    token: Option<&str>,
    filename: &str,
) -> git_handler::Result<()> {
    let locator = parse_locator(handler, repo, token)?;
    let mirror = handler.ensure_mirror(&locator, repo.branch.as_deref(), repo.force_update)?;
    let content = handler.read_file(&mirror, filename)?;
    print_json(&FileResponse {
        filename: filename.to_string(),
        content,
    })
}

fn cmd_contains(
    handler: &Handler,
    repo: &RepoArgs,
    token: Option<&str>,
    checks: &Path,
) -> git_handler::Result<()> {
    let raw = if checks.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(checks)?
    };
    let checks: Vec<FileCheck> = serde_json::from_str(&raw).map_err(std::io::Error::from)?;

    let locator = parse_locator(handler, repo, token)?;
    let mirror = handler.ensure_mirror(&locator, repo.branch.as_deref(), repo.force_update)?;
    handler.verify_file_checks(&mirror, &checks)?;
    print_json(&UpdateResponse {
        success: true,
        detail: String::new(),
    })
}

fn cmd_doctor(handler: &Handler) -> git_handler::Result<()> {
    println!("git-handler System Check\n");

    let git_ok = GitCli::new().is_available();
    println!(
        "[{}] git: {}",
        if git_ok { "OK" } else { "FAIL" },
        if git_ok { "available" } else { "not found" }
    );

    let settings = handler.settings();
    let repositories = settings.paths().repositories_dir();
    println!(
        "[{}] Mirrors: {}",
        if repositories.exists() { "OK" } else { "INFO" },
        repositories.display()
    );

    let lock = settings.lock();
    println!(
        "[{}] Lock marker: {}",
        if lock.is_locked() { "BUSY" } else { "OK" },
        lock.marker_path().display()
    );

    println!("[INFO] Default branch: {}", settings.default_branch);

    if !git_ok {
        println!();
        println!("Install git and make sure it is on PATH.");
    }

    Ok(())
}
