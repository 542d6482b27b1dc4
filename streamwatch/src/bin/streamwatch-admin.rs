//! Operator CLI for accounts, streams, assignments, detector rules and events.
//!
//! Talks to the same database as the daemon. Rule and assignment changes are
//! picked up by a running daemon on its next periodic refresh.

use anyhow::Context;
use clap::{Parser, Subcommand};

use streamwatch::admin::{AdminRepositories, AdminService, Dashboard};
use streamwatch::config::{AppConfig, ConfigEventBroadcaster};
use streamwatch::config::settings::DEFAULT_DATABASE_URL;
use streamwatch::database;
use streamwatch::logging;
use streamwatch::notification::NotificationService;

#[derive(Parser, Debug)]
#[command(author, version, about = "streamwatch administration", long_about = None)]
struct Args {
    /// Database URL
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage agent accounts
    #[command(subcommand)]
    Agents(AgentCommand),
    /// Manage monitored streams
    #[command(subcommand)]
    Streams(StreamCommand),
    /// Assign a stream to an agent
    Assign { agent_id: String, stream_id: String },
    /// Remove an assignment
    Unassign { assignment_id: String },
    /// Manage chat keywords
    #[command(subcommand)]
    Keywords(RuleCommand),
    /// Manage flagged visual objects
    #[command(subcommand)]
    Objects(RuleCommand),
    /// Show the admin dashboard, or one agent's view
    Dashboard {
        #[arg(long)]
        agent: Option<String>,
    },
    /// Inspect or purge recorded events
    #[command(subcommand)]
    Events(EventCommand),
    /// Check the configured notification channels
    #[command(subcommand)]
    Notify(NotifyCommand),
}

#[derive(Subcommand, Debug)]
enum AgentCommand {
    List,
    Create {
        username: String,
        password: String,
    },
    Update {
        id: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum StreamCommand {
    List,
    Add { url: String },
    /// Edit display fields; the URL cannot be changed
    Update {
        id: String,
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum RuleCommand {
    List,
    Add { value: String },
    Update { id: String, value: String },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum EventCommand {
    /// Most recent events, optionally for one stream
    List {
        #[arg(long)]
        stream: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Delete events older than N days
    Purge {
        #[arg(long)]
        days: u32,
    },
}

#[derive(Subcommand, Debug)]
enum NotifyCommand {
    /// Send a test message through every enabled channel
    Test,
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn test_notifications() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let notifier = NotificationService::from_settings(&config.notify);

    let mut failed = 0;
    for (channel, result) in notifier.test_channels().await {
        match result {
            Ok(()) => println!("{:<10} ok", channel),
            Err(e) => {
                failed += 1;
                println!("{:<10} failed: {}", channel, e);
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} notification channel(s) failed", failed);
    }
    Ok(())
}

fn print_dashboard(dashboard: &Dashboard) {
    println!("Ongoing streams: {}", dashboard.ongoing_streams);
    for entry in &dashboard.assignments {
        let agent = entry.agent_username.as_deref().unwrap_or("-");
        println!(
            "{}  {:<10} {:<20} {:<12} {}",
            entry.assignment_id, entry.platform, entry.streamer_username, agent, entry.stream_url
        );
    }
}

async fn run(admin: &AdminService, command: Command, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Agents(cmd) => match cmd {
            AgentCommand::List => {
                for agent in admin.list_agents().await? {
                    println!("{}  {}", agent.id, agent.username);
                }
            }
            AgentCommand::Create { username, password } => {
                let agent = admin.create_agent(&username, &password).await?;
                println!("Created agent {} ({})", agent.username, agent.id);
            }
            AgentCommand::Update {
                id,
                username,
                password,
            } => {
                let agent = admin
                    .update_agent(&id, username.as_deref(), password.as_deref())
                    .await?;
                println!("Updated agent {} ({})", agent.username, agent.id);
            }
            AgentCommand::Delete { id } => {
                admin.delete_agent(&id).await?;
                println!("Deleted agent {}", id);
            }
        },
        Command::Streams(cmd) => match cmd {
            StreamCommand::List => {
                let streams = admin.list_streams().await?;
                if json {
                    return print_json(&streams);
                }
                for stream in streams {
                    println!(
                        "{}  {:<10} {:<20} {}",
                        stream.id, stream.platform, stream.streamer_username, stream.room_url
                    );
                }
            }
            StreamCommand::Add { url } => {
                let stream = admin.create_stream(&url).await?;
                println!("Added stream {} ({})", stream.room_url, stream.id);
            }
            StreamCommand::Update {
                id,
                platform,
                username,
            } => {
                let stream = admin
                    .update_stream(&id, platform.as_deref(), username.as_deref())
                    .await?;
                println!("Updated stream {} ({})", stream.room_url, stream.id);
            }
            StreamCommand::Delete { id } => {
                admin.delete_stream(&id).await?;
                println!("Deleted stream {}", id);
            }
        },
        Command::Assign {
            agent_id,
            stream_id,
        } => {
            let assignment = admin.assign(&agent_id, &stream_id).await?;
            println!("Created assignment {}", assignment.id);
        }
        Command::Unassign { assignment_id } => {
            admin.unassign(&assignment_id).await?;
            println!("Removed assignment {}", assignment_id);
        }
        Command::Keywords(cmd) => match cmd {
            RuleCommand::List => {
                for keyword in admin.list_keywords().await? {
                    println!("{}  {}", keyword.id, keyword.keyword);
                }
            }
            RuleCommand::Add { value } => {
                let keyword = admin.add_keyword(&value).await?;
                println!("Added keyword {} ({})", keyword.keyword, keyword.id);
            }
            RuleCommand::Update { id, value } => {
                admin.update_keyword(&id, &value).await?;
                println!("Updated keyword {}", id);
            }
            RuleCommand::Delete { id } => {
                admin.delete_keyword(&id).await?;
                println!("Deleted keyword {}", id);
            }
        },
        Command::Objects(cmd) => match cmd {
            RuleCommand::List => {
                for object in admin.list_objects().await? {
                    println!("{}  {}", object.id, object.object_name);
                }
            }
            RuleCommand::Add { value } => {
                let object = admin.add_object(&value).await?;
                println!("Added object {} ({})", object.object_name, object.id);
            }
            RuleCommand::Update { id, value } => {
                admin.update_object(&id, &value).await?;
                println!("Updated object {}", id);
            }
            RuleCommand::Delete { id } => {
                admin.delete_object(&id).await?;
                println!("Deleted object {}", id);
            }
        },
        Command::Dashboard { agent } => {
            let dashboard = match agent {
                Some(agent_id) => admin.agent_dashboard(&agent_id).await?,
                None => admin.admin_dashboard().await?,
            };
            if json {
                return print_json(&dashboard);
            }
            print_dashboard(&dashboard);
        }
        Command::Events(cmd) => match cmd {
            EventCommand::List { stream, limit } => {
                let events = match stream {
                    Some(url) => admin.stream_events(&url, limit).await?,
                    None => admin.recent_events(limit).await?,
                };
                if json {
                    return print_json(&events);
                }
                for event in events {
                    println!(
                        "{}  {:<6} {}  {}",
                        event.get_timestamp().to_rfc3339(),
                        event.category,
                        event.room_url,
                        event.finding
                    );
                }
            }
            EventCommand::Purge { days } => {
                let removed = admin.purge_events(days).await?;
                println!("Purged {} event(s) older than {} day(s)", removed, days);
            }
        },
        Command::Notify(NotifyCommand::Test) => test_notifications().await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    logging::init_console_logging()?;

    let pool = database::init_pool(&args.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", args.database_url))?;
    database::run_migrations(&pool)
        .await
        .context("Failed to apply migrations")?;

    let admin = AdminService::new(AdminRepositories::sqlx(&pool), ConfigEventBroadcaster::new());
    let result = run(&admin, args.command, args.json).await;
    pool.close().await;
    result
}
