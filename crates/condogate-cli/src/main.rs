use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod proxy;

use proxy::GateProxy;

#[derive(Parser)]
#[command(name = "condogate", about = "Condogate access control CLI")]
struct Cli {
    /// Talk to the daemon on the session bus (also CONDOGATE_BUS=session)
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide on a face image
    Decide {
        /// Image file (JPEG, PNG, ...)
        image: PathBuf,
        /// Only compare against this category
        #[arg(short, long, default_value = "")]
        category: String,
    },
    /// Decide on a posted attendance embedding
    DecideEmbedding {
        /// JSON file holding an array of floats, or {"embedding": [...]}; "-" reads stdin
        file: PathBuf,
        #[arg(short, long, default_value = "")]
        category: String,
    },
    /// Open the gate manually (logged as a security officer grant)
    Override {
        /// Security officer performing the override
        #[arg(long)]
        officer: Option<i64>,
    },
    /// Enroll a face image for an existing identity
    Enroll {
        category: String,
        reference_id: i64,
        image: PathBuf,
    },
    /// Enroll an attendance embedding for an existing identity
    EnrollEmbedding {
        category: String,
        reference_id: i64,
        file: PathBuf,
    },
    /// Register a person and print their reference id
    AddIdentity { category: String, full_name: String },
    /// Set the work window of a temporary staff member (YYYY-MM-DD)
    SetWindow {
        temp_id: i64,
        #[arg(long, default_value = "")]
        start: String,
        #[arg(long, default_value = "")]
        end: String,
    },
    /// Remove a person and their enrolled faces
    DeleteIdentity { category: String, reference_id: i64 },
    /// Show access log entries, newest first
    Logs {
        #[arg(short, long, default_value_t = 50)]
        limit: u32,
        /// Only today's entries (UTC)
        #[arg(long)]
        today: bool,
    },
    /// Show granted/denied counts
    Stats {
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let session = cli.session
        || std::env::var("CONDOGATE_BUS")
            .map(|v| v.eq_ignore_ascii_case("session"))
            .unwrap_or(false);

    let conn = if session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("connecting to D-Bus")?;
    let gate = GateProxy::new(&conn)
        .await
        .context("condogated is not reachable")?;

    match cli.command {
        Commands::Decide { image, category } => {
            let bytes = read_file(&image)?;
            print_json(&gate.decide(&bytes, &category).await?)?;
        }
        Commands::DecideEmbedding { file, category } => {
            let values = read_embedding(&file)?;
            print_json(&gate.decide_embedding(&values, &category).await?)?;
        }
        Commands::Override { officer } => {
            print_json(&gate.manual_override(officer.unwrap_or(0)).await?)?;
        }
        Commands::Enroll {
            category,
            reference_id,
            image,
        } => {
            let bytes = read_file(&image)?;
            let id = gate.enroll(&category, reference_id, &bytes).await?;
            println!("enrolled embedding {id}");
        }
        Commands::EnrollEmbedding {
            category,
            reference_id,
            file,
        } => {
            let values = read_embedding(&file)?;
            let id = gate.enroll_embedding(&category, reference_id, &values).await?;
            println!("enrolled embedding {id}");
        }
        Commands::AddIdentity {
            category,
            full_name,
        } => {
            let id = gate.add_identity(&category, &full_name).await?;
            println!("{id}");
        }
        Commands::SetWindow {
            temp_id,
            start,
            end,
        } => {
            if !gate.set_work_window(temp_id, &start, &end).await? {
                bail!("no temporary staff member with id {temp_id}");
            }
        }
        Commands::DeleteIdentity {
            category,
            reference_id,
        } => {
            let removed = gate.delete_identity(&category, reference_id).await?;
            println!("removed {removed} embedding(s)");
        }
        Commands::Logs { limit, today } => {
            let logs = if today {
                gate.today_logs(limit).await?
            } else {
                gate.recent_logs(limit).await?
            };
            print_json(&logs)?;
        }
        Commands::Stats { days } => print_json(&gate.stats(days).await?)?,
        Commands::Status => print_json(&gate.status().await?)?,
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn read_embedding(path: &Path) -> Result<Vec<f64>> {
    let raw = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("reading stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    parse_embedding(&raw)
}

/// Accepts `[0.1, ...]` or `{"embedding": [0.1, ...]}`.
fn parse_embedding(raw: &str) -> Result<Vec<f64>> {
    let value: serde_json::Value = serde_json::from_str(raw).context("embedding is not valid JSON")?;
    let array = match &value {
        serde_json::Value::Object(map) => map.get("embedding"),
        other => Some(other),
    };
    let Some(serde_json::Value::Array(items)) = array else {
        bail!("expected a JSON array of numbers");
    };
    items
        .iter()
        .map(|v| v.as_f64().context("embedding contains a non-number"))
        .collect()
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon sent invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
