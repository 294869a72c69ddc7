use clap::error::ErrorKind as ClapErrorKind;
use clap::{Args, CommandFactory, Parser};
use cloudstore_core::{load_config, ErrorKind, LoggingConfig};
use color_eyre::config::HookBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod handlers;
mod wizard;

use handlers::Context;

/// cloudstore - diagnostics and maintenance for S3 object stores
#[derive(Parser, Debug)]
#[command(name = "cloudstore")]
#[command(version)]
#[command(about = "Diagnose and maintain S3 buckets from your terminal", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/cloudstore/config.toml)
    #[arg(long, global = true, env = "CLOUDSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List objects under a path
    Ls(LsArgs),

    /// List object versions and delete markers, optionally pruning old versions
    Listversions(ListVersionsArgs),

    /// Remove delete markers so the previous version becomes visible again
    Undelete(UndeleteArgs),

    /// Copy the newest real version back over deleted objects
    Restore(RestoreArgs),

    /// List pending multipart uploads, optionally aborting them
    Listmultiparts(ListMultipartsArgs),

    /// Create a bucket
    Mkbucket(MkBucketArgs),

    /// Show where a bucket lives and how the client region was chosen
    Region(RegionArgs),

    /// Delete the keys listed in a file
    Bulkdelete(BulkDeleteArgs),

    /// Print an IAM policy granting the access these tools need
    Iampolicy(IamPolicyArgs),

    /// Request temporary session credentials from STS
    Sessionkeys(SessionKeysArgs),

    /// Diagnose configuration and connectivity for a path
    Storediag(StoreDiagArgs),

    /// Check whether the store supports a capability
    Pathcapability(PathCapabilityArgs),

    /// Upload a local directory tree in parallel
    Cloudup(CloudUpArgs),

    /// Initial setup (interactive wizard)
    Init,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Shell completion
    Completion {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the current configuration, secrets masked
    Show,
    /// Edit the configuration in $EDITOR
    Edit,
    /// Validate the configuration and credentials
    Validate,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// s3:// or s3a:// path
    path: String,
    /// Stop after this many entries
    #[arg(long)]
    limit: Option<usize>,
    /// List every object under the path instead of one level
    #[arg(short, long)]
    recursive: bool,
    /// Write the listing to a file
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListVersionsArgs {
    path: String,
    #[arg(long)]
    limit: Option<usize>,
    /// Only entries at least this many seconds old
    #[arg(long, value_name = "SECONDS")]
    age: Option<u64>,
    /// Only entries modified within this many seconds
    #[arg(long, value_name = "SECONDS")]
    since: Option<u64>,
    /// Include directory markers
    #[arg(long)]
    dirs: bool,
    /// Print only the summary
    #[arg(short, long)]
    quiet: bool,
    #[arg(long)]
    out: Option<PathBuf>,
    /// Also write the listing as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
    /// CSV field separator (default from config)
    #[arg(long)]
    separator: Option<String>,
    /// Delete every listed entry that is not the latest version, and every listed delete marker
    #[arg(long)]
    delete: bool,
    /// Log deletions without performing them
    #[arg(long)]
    dry_run: bool,
    /// Entries per bulk delete request
    #[arg(long)]
    page_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct UndeleteArgs {
    path: String,
    /// Only markers created within this many seconds
    #[arg(long, value_name = "SECONDS")]
    since: Option<u64>,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    page_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    path: String,
    /// Only objects deleted within this many seconds
    #[arg(long, value_name = "SECONDS")]
    since: Option<u64>,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ListMultipartsArgs {
    path: String,
    /// Only uploads started at least this many seconds ago
    #[arg(long, value_name = "SECONDS")]
    age: Option<u64>,
    /// Abort the listed uploads
    #[arg(long)]
    purge: bool,
    /// Show the parts of each upload
    #[arg(long)]
    parts: bool,
}

#[derive(Args, Debug)]
pub struct MkBucketArgs {
    /// Bucket name or s3:// URI
    bucket: String,
    #[arg(long)]
    region: Option<String>,
}

#[derive(Args, Debug)]
pub struct RegionArgs {
    /// Bucket name or s3:// URI
    bucket: String,
}

#[derive(Args, Debug)]
pub struct BulkDeleteArgs {
    /// Path the listed keys are relative to
    path: String,
    /// File with one key per line
    file: PathBuf,
    #[arg(long)]
    page_size: Option<usize>,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
pub struct IamPolicyArgs {
    path: String,
    /// Grant read access only
    #[arg(long)]
    read_only: bool,
    /// Leave out multipart upload permissions
    #[arg(long)]
    no_multipart: bool,
}

#[derive(Args, Debug)]
pub struct SessionKeysArgs {
    /// Assume this role instead of requesting a session token
    #[arg(long, value_name = "ARN")]
    role: Option<String>,
    /// Session name when assuming a role
    #[arg(long)]
    session_name: Option<String>,
    /// Lifetime in seconds
    #[arg(long, default_value_t = cloudstore_core::session::DEFAULT_DURATION_SECS)]
    duration: i32,
    /// Print JSON instead of shell exports
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
pub struct StoreDiagArgs {
    path: String,
}

#[derive(Args, Debug)]
pub struct PathCapabilityArgs {
    /// Capability name, e.g. bulk-delete
    capability: String,
    path: String,
}

#[derive(Args, Debug)]
pub struct CloudUpArgs {
    /// Local directory
    src: PathBuf,
    /// Destination s3:// path
    dest: String,
    /// Parallel uploads (default from config)
    #[arg(long)]
    threads: Option<usize>,
    /// Upload this many of the biggest files first (default from config)
    #[arg(long)]
    largest: Option<usize>,
    /// Keep going after a failed upload
    #[arg(long)]
    ignore_failures: bool,
    /// Replace objects that already exist
    #[arg(long)]
    overwrite: bool,
    /// Seed for the upload order shuffle
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Setup error handling
    if let Err(e) = HookBuilder::default().install() {
        eprintln!("Warning: Failed to install error handler: {}", e);
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => ErrorKind::SUCCESS,
                _ => ErrorKind::Usage.exit_code(),
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let logging = load_config(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(cli.verbose, &logging);

    let ctx = Context {
        config_path: cli.config.clone(),
    };

    match run(&ctx, cli.command).await {
        Ok(()) => ExitCode::from(ErrorKind::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(ctx: &Context, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ls(args) => handlers::handle_ls(ctx, &args).await,
        Commands::Listversions(args) => handlers::handle_listversions(ctx, &args).await,
        Commands::Undelete(args) => handlers::handle_undelete(ctx, &args).await,
        Commands::Restore(args) => handlers::handle_restore(ctx, &args).await,
        Commands::Listmultiparts(args) => handlers::handle_listmultiparts(ctx, &args).await,
        Commands::Mkbucket(args) => handlers::handle_mkbucket(ctx, &args).await,
        Commands::Region(args) => handlers::handle_region(ctx, &args).await,
        Commands::Bulkdelete(args) => handlers::handle_bulkdelete(ctx, &args).await,
        Commands::Iampolicy(args) => handlers::handle_iampolicy(&args),
        Commands::Sessionkeys(args) => handlers::handle_sessionkeys(ctx, &args).await,
        Commands::Storediag(args) => handlers::handle_storediag(ctx, &args).await,
        Commands::Pathcapability(args) => handlers::handle_pathcapability(ctx, &args).await,
        Commands::Cloudup(args) => handlers::handle_cloudup(ctx, &args).await,
        Commands::Init => wizard::run_init_wizard(ctx).await,
        Commands::Config { action } => {
            let action_str = match action {
                ConfigAction::Show => "show",
                ConfigAction::Edit => "edit",
                ConfigAction::Validate => "validate",
            };
            handlers::handle_config(ctx, action_str).await
        }
        Commands::Completion { shell } => handlers::handle_completion(&shell, &mut Cli::command()),
    }
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`, which wins over the config level
fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match logging.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };
    if let Err(e) = result {
        eprintln!("Warning: Failed to initialise logging: {}", e);
    }
}

/// Exit code for an error: the kind of the first library error in the chain
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<cloudstore_core::Error>())
        .map(|e| e.kind())
        .unwrap_or(ErrorKind::ExceptionThrown)
        .exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exit_code_from_library_error() {
        let err = anyhow::Error::from(cloudstore_core::Error::NotFound("x".to_string()));
        assert_eq!(exit_code(&err), 44);

        let err: anyhow::Error = Err::<(), _>(cloudstore_core::Error::PermissionDenied("x".to_string()))
            .context("while listing")
            .unwrap_err();
        assert_eq!(exit_code(&err), 41);
    }

    #[test]
    fn test_exit_code_for_other_errors() {
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 50);
    }
}
