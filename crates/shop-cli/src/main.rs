use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "shop")]
#[command(about = "Work-order stage resolution and reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved stage of every work order in a snapshot (read-only)
    Resolve {
        /// Snapshot JSON: {"work_orders": [...], "quotes": [...]}
        #[arg(long)]
        snapshot: String,

        /// Only this work order
        #[arg(long = "work-order")]
        work_order: Option<String>,
    },

    /// Compare stored stages with resolved stages and (with --apply) correct them
    Reconcile {
        #[arg(long)]
        snapshot: String,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Persist corrections (overrides reconcile.apply)
        #[arg(long, default_value_t = false)]
        apply: bool,

        /// Audit log path (overrides audit.path). Required with --apply
        #[arg(long)]
        audit: Option<String>,

        /// Fail instead of warn on config keys this mode does not read
        #[arg(long = "strict-config", default_value_t = false)]
        strict_config: bool,
    },

    /// Set a work order's stage by hand. The only way to move a stage backwards.
    Override {
        #[arg(long)]
        snapshot: String,

        #[arg(long = "work-order")]
        work_order: String,

        /// Target stage (e.g. in_repair, quality_control)
        #[arg(long)]
        stage: String,

        /// Why (stored in the audit log)
        #[arg(long)]
        reason: String,

        #[arg(long, default_value = "operator")]
        actor: String,

        /// Audit log path
        #[arg(long)]
        audit: String,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Audit log utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of an audit log
    Verify {
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Resolve {
            snapshot,
            work_order,
        } => commands::resolve::run_resolve(&snapshot, work_order.as_deref())?,

        Commands::Reconcile {
            snapshot,
            config_paths,
            apply,
            audit,
            strict_config,
        } => {
            commands::reconcile::run_reconcile(commands::reconcile::ReconcileArgs {
                snapshot,
                config_paths,
                apply,
                audit,
                strict_config,
            })
            .await?
        }

        Commands::Override {
            snapshot,
            work_order,
            stage,
            reason,
            actor,
            audit,
        } => {
            commands::reconcile::run_override(commands::reconcile::OverrideArgs {
                snapshot,
                work_order,
                stage,
                reason,
                actor,
                audit,
            })
            .await?
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = shop_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => commands::verify_audit(&path)?,
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
