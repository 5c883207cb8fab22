use std::io::Read;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use rota_assign::Workspace;
use rota_core::{Assignment, MissionFilter, UserId, UserStatus};
use rota_storage::Storage;

#[derive(Parser)]
#[command(name = "rota", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a workspace in the current directory (creates .rota/, config, db)
    Init,

    /// Manage the users missions rotate over
    #[command(subcommand)]
    User(UserCommand),

    /// Show who would get the next mission, without assigning anything
    Next,

    /// Assign one batch of customers and print the result
    Assign {
        /// Batch label for customers given as arguments
        #[arg(long, required_unless_present = "stdin")]
        batch: Option<String>,
        customers: Vec<String>,
        /// Read tab-separated `batch<TAB>customer` records from stdin instead
        #[arg(long, conflicts_with_all = ["batch", "customers"])]
        stdin: bool,
        /// The first stdin record is a header
        #[arg(long, requires = "stdin")]
        header: bool,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// List missions, optionally filtered (exact match)
    Missions {
        #[arg(long)]
        batch: Option<String>,
        #[arg(long)]
        customer: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value_t = Status::Active)]
        status: Status,
    },
    /// Rename a user or change its status
    Set {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum)]
        status: Option<Status>,
    },
    Rm {
        #[arg(long)]
        id: i64,
    },
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    /// Header row then one tab-separated line per assignment
    Tsv,
}

#[derive(Clone, Copy, ValueEnum)]
enum Status {
    Active,
    Inactive,
}

impl From<Status> for UserStatus {
    fn from(s: Status) -> Self {
        match s {
            Status::Active => UserStatus::Active,
            Status::Inactive => UserStatus::Inactive,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Workspace::init(&root)?;
            println!("Initialized rota in {}", root.display());
        }
        Command::User(cmd) => {
            let ws = Workspace::open(root)?;
            run_user(ws.storage(), cmd)?;
        }
        Command::Next => {
            let ws = Workspace::open(root)?;
            match ws.assigner.peek_next()? {
                Some(u) => println!("{}", u.name),
                None => println!("(no active users)"),
            }
        }
        Command::Assign { batch, customers, stdin, header, format } => {
            let records = if stdin {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                records_from_tsv(&text)
            } else {
                let batch = batch.ok_or_else(|| anyhow!("--batch is required"))?;
                customers.into_iter().map(|c| vec![batch.clone(), c]).collect()
            };
            let ws = Workspace::open(root)?;
            let out = ws.assigner.assign_records(&records, stdin && header)?;
            println!("{}", render(&out, format)?);
        }
        Command::Missions { batch, customer, user } => {
            let ws = Workspace::open(root)?;
            let filter = MissionFilter { batch, customer, user_name: user };
            let missions = ws.storage().find_missions(&filter)?;
            println!("Missions: {}", missions.len());
            for m in missions {
                println!("- #{} [{}] {} -> {}", m.id, m.batch, m.customer, m.user_name);
            }
        }
    }

    Ok(())
}

/// One record per non-blank line, fields split on tabs.
fn records_from_tsv(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect()
}

fn render(out: &[Assignment], format: Format) -> Result<String> {
    match format {
        Format::Json => Ok(serde_json::to_string_pretty(out)?),
        Format::Tsv => {
            let mut lines = vec![Assignment::HEADER.join("\t")];
            lines.extend(out.iter().map(|a| a.to_record().join("\t")));
            Ok(lines.join("\n"))
        }
    }
}

fn run_user<S: Storage>(storage: &S, cmd: UserCommand) -> Result<()> {
    match cmd {
        UserCommand::Add { name, status } => {
            let u = storage.add_user(&name, status.into())?;
            println!("Added user {} ({})", u.name, u.id);
        }
        UserCommand::Set { id, name, status } => {
            let id = UserId(id);
            let current = storage
                .list_users()?
                .into_iter()
                .find(|u| u.id == id)
                .ok_or_else(|| anyhow!("user {} not found", id))?;
            let name = name.unwrap_or(current.name);
            let status = status.map(UserStatus::from).unwrap_or(current.status);
            let u = storage.update_user(id, &name, status)?;
            println!("Updated user {} -> {} [{}]", u.id, u.name, u.status.as_str());
        }
        UserCommand::Rm { id } => {
            if storage.remove_user(UserId(id))? {
                println!("Removed user {}", id);
            } else {
                println!("No user {}", id);
            }
        }
        UserCommand::List => {
            let users = storage.list_users()?;
            println!("Users: {}", users.len());
            for u in users {
                println!("- {} {} [{}]", u.id, u.name, u.status.as_str());
            }
        }
    }
    Ok(())
}
