//! curator CLI entry point

use clap::{Parser, Subcommand};
use curator::{
    commands::{
        cmd_add_document, cmd_analyze_work, cmd_create_project, cmd_enqueue,
        cmd_enqueue_analysis, cmd_import_guide, cmd_init, cmd_list_documents,
        cmd_list_projects, cmd_requeue, cmd_status, cmd_work_drain, cmd_work_once,
        print_documents, print_enqueue_outcome, print_projects, print_status,
        print_work_stats, resolve_project,
    },
    config::Config,
    error::Result,
    server::run_server,
    store::Store,
    worker::Pipeline,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "curator")]
#[command(version, about = "Ingestion and analysis job pipeline for research transcripts", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize curator configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage documents
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Manage discussion guides
    Guide {
        #[command(subcommand)]
        action: GuideAction,
    },

    /// Enqueue ingest jobs for a project's documents
    Enqueue {
        /// Project id or name
        project: String,

        /// Delete existing jobs and enqueue everything fresh
        #[arg(long)]
        force: bool,
    },

    /// Claim and process ingest jobs
    Work {
        /// Keep claiming until the queue is empty
        #[arg(long)]
        drain: bool,
    },

    /// Content analysis
    Analyze {
        #[command(subcommand)]
        action: AnalyzeAction,
    },

    /// Reset a project's failed ingest jobs back to queued
    Requeue {
        /// Project id or name
        project: String,
    },

    /// Show ingest and analysis status for a project
    Status {
        /// Project id or name
        project: String,
    },

    /// Start the HTTP trigger server
    Serve,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a new project
    Create {
        /// Project name
        name: String,
    },

    /// List projects
    List,
}

#[derive(Subcommand)]
enum DocAction {
    /// Add a local file as a project document
    Add {
        /// Project id or name
        project: String,

        /// Path to the transcript file
        file: PathBuf,
    },

    /// List a project's documents
    List {
        /// Project id or name
        project: String,
    },
}

#[derive(Subcommand)]
enum GuideAction {
    /// Import a guide file (lines starting with '#' open a section)
    Import {
        /// Project id or name
        project: String,

        /// Path to the guide file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum AnalyzeAction {
    /// Enqueue the project's analysis job
    Enqueue {
        /// Project id or name
        project: String,
    },

    /// Claim and process one analysis job
    Work,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Init doesn't need an existing config
    if let Commands::Init { force } = cli.command {
        let base_dir = cli.config.as_deref().and_then(|p| p.parent()).map(PathBuf::from);
        let config = cmd_init(base_dir, force).await?;
        println!("✓ curator initialized");
        println!("  Config: {}", config.paths.config_file.display());
        println!("  Database: {}", config.paths.db_file.display());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let store = Store::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Project { action } => match action {
            ProjectAction::Create { name } => {
                let project = cmd_create_project(&store, &name).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&project)?);
                } else {
                    println!("✓ Created project '{}' ({})", project.name, project.id);
                }
            }
            ProjectAction::List => {
                let projects = cmd_list_projects(&store).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&projects)?);
                } else {
                    print_projects(&projects);
                }
            }
        },

        Commands::Doc { action } => match action {
            DocAction::Add { project, file } => {
                let project = resolve_project(&store, &project).await?;
                let doc = cmd_add_document(&store, &project, &file).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                } else {
                    println!("✓ Added document '{}' ({})", doc.name, doc.id);
                }
            }
            DocAction::List { project } => {
                let project = resolve_project(&store, &project).await?;
                let docs = cmd_list_documents(&store, &project).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&docs)?);
                } else {
                    print_documents(&docs);
                }
            }
        },

        Commands::Guide { action } => match action {
            GuideAction::Import { project, file } => {
                let project = resolve_project(&store, &project).await?;
                let count = cmd_import_guide(&store, &project, &file).await?;
                println!("✓ Imported {} question(s)", count);
            }
        },

        Commands::Enqueue { project, force } => {
            let project = resolve_project(&store, &project).await?;
            let outcome = cmd_enqueue(&store, &config, &project, force).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_enqueue_outcome(&outcome);
            }
        }

        Commands::Work { drain } => {
            let pipeline = Pipeline::from_config(config, store)?;
            if drain {
                let stats = cmd_work_drain(&pipeline).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    print_work_stats(&stats);
                }
            } else {
                match cmd_work_once(&pipeline).await? {
                    Some(outcome) => {
                        if cli.json {
                            println!("{}", serde_json::to_string_pretty(&outcome)?);
                        } else {
                            println!(
                                "✓ Processed job {} ({} chunks, {} embeddings)",
                                outcome.job_id, outcome.chunks_created, outcome.embeddings_created
                            );
                        }
                    }
                    None => println!("No claimable jobs."),
                }
            }
        }

        Commands::Analyze { action } => match action {
            AnalyzeAction::Enqueue { project } => {
                let project = resolve_project(&store, &project).await?;
                let outcome = cmd_enqueue_analysis(&store, &config, &project).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    print_enqueue_outcome(&outcome);
                }
            }
            AnalyzeAction::Work => {
                let pipeline = Pipeline::from_config(config, store)?;
                match cmd_analyze_work(&pipeline).await? {
                    Some(outcome) => {
                        if cli.json {
                            println!("{}", serde_json::to_string_pretty(&outcome)?);
                        } else {
                            println!(
                                "✓ Analyzed {} document(s), {} result(s) written, {} degraded",
                                outcome.documents_processed,
                                outcome.results_written,
                                outcome.degraded_results
                            );
                        }
                    }
                    None => println!("No claimable jobs."),
                }
            }
        },

        Commands::Requeue { project } => {
            let project = resolve_project(&store, &project).await?;
            let requeued = cmd_requeue(&store, &project).await?;
            println!("✓ Requeued {} failed job(s)", requeued);
        }

        Commands::Status { project } => {
            let project = resolve_project(&store, &project).await?;
            let report = cmd_status(&store, &project).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&report);
            }
        }

        Commands::Serve => {
            let pipeline = Arc::new(Pipeline::from_config(config, store)?);
            run_server(pipeline)
                .await
                .map_err(|e| curator::error::Error::Other(e.to_string()))?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'curator init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
