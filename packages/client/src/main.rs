use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use common::{Resource, TurnEvent};
use console::style;
use futures::StreamExt;
use parley_client::types::ChatQuery;
use parley_client::{ApiClient, ChatSession, Outcome};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "parley", author, version, about = "Talk to a Parley chat server", long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(long, env = "PARLEY_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Bearer token from `parley login`
    #[arg(long, env = "PARLEY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print results as `{success, data|error}` JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and print a token
    Register {
        email: String,
        #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign in and print a token
    Login {
        email: String,
        #[arg(long, env = "PARLEY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List chats, most recent first
    Chats {
        /// Case-insensitive title filter
        #[arg(long)]
        search: Option<String>,
    },
    /// Show a chat's messages
    History { chat: Uuid },
    /// Send a message and stream the reply
    Send {
        /// Chat to continue (a new chat when omitted)
        #[arg(long)]
        chat: Option<Uuid>,
        #[arg(long)]
        model: Option<String>,
        text: String,
    },
    /// Attach a file and stream the analysis
    Attach {
        #[arg(long)]
        chat: Option<Uuid>,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Local upload limit in bytes
        #[arg(long, default_value_t = parley_client::session::DEFAULT_UPLOAD_LIMIT)]
        max_bytes: u64,
        path: PathBuf,
    },
    /// Print change events as they happen
    Watch {
        /// Comma-separated subset of users,chats,message,generations
        #[arg(long, value_delimiter = ',')]
        resources: Vec<Resource>,
    },
    /// List available models
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut api = ApiClient::new(&cli.server);
    if let Some(token) = &cli.token {
        api = api.with_token(token);
    }
    let json = cli.json;

    match cli.command {
        Commands::Register {
            email,
            password,
            name,
        } => {
            let mut session = ChatSession::new(api);
            let outcome = session.register(&email, &password, name.as_deref()).await;
            let token = session.api().token().map(str::to_string);
            report(json, outcome, |user| {
                println!("Registered {}", style(&user.email).bold());
                print_token(token.as_deref());
            })
        }
        Commands::Login { email, password } => {
            let mut session = ChatSession::new(api);
            let outcome = session.sign_in(&email, &password).await;
            let token = session.api().token().map(str::to_string);
            report(json, outcome, |user| {
                println!("Signed in as {}", style(&user.email).bold());
                print_token(token.as_deref());
            })
        }
        Commands::Chats { search } => {
            let query = ChatQuery {
                search,
                ..ChatQuery::recent(100)
            };
            let outcome: Outcome<_> = api.list_chats(&query).await.map(|p| p.data).into();
            report(json, outcome, |chats| {
                for chat in chats {
                    println!(
                        "{}  {}  {}",
                        style(chat.id).dim(),
                        style(chat.updated_at.format("%Y-%m-%d %H:%M")).cyan(),
                        chat.title
                    );
                }
            })
        }
        Commands::History { chat } => {
            let outcome: Outcome<_> = api.list_messages(chat).await.into();
            report(json, outcome, |messages| {
                for message in messages {
                    let role = if message.role == "user" {
                        style(message.role.as_str()).green()
                    } else {
                        style(message.role.as_str()).magenta()
                    };
                    if message.content_type == "text" {
                        println!("{role}: {}", message.content);
                    } else {
                        println!("{role}: [{}] {}", message.content_type, message.content);
                    }
                }
            })
        }
        Commands::Send { chat, model, text } => {
            let mut session = signed_in(api).await?;
            if let Some(chat) = chat {
                exit_on_failure(session.switch_chat(chat).await)?;
            }
            let outcome = session
                .send_message_with(&text, model.as_deref(), |e| print_turn_event(e, json))
                .await;
            finish_turn(json, outcome, session.store().active_chat_id())
        }
        Commands::Attach {
            chat,
            prompt,
            model,
            max_bytes,
            path,
        } => {
            let mut session = signed_in(api).await?.with_upload_limit(max_bytes);
            if let Some(chat) = chat {
                exit_on_failure(session.switch_chat(chat).await)?;
            }
            let outcome = session
                .attach_file_with(&path, prompt.as_deref(), model.as_deref(), |e| {
                    print_turn_event(e, json)
                })
                .await;
            finish_turn(json, outcome, session.store().active_chat_id())
        }
        Commands::Watch { resources } => {
            let mut stream = api
                .events(&resources)
                .await
                .context("Failed to open the event stream")?;
            while let Some(event) = stream.next().await {
                let event = event?;
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!(
                        "{} {} {}",
                        style(event.resource).cyan(),
                        style(format!("{:?}", event.kind).to_lowercase()).bold(),
                        event.data.get("id").and_then(|v| v.as_str()).unwrap_or("-")
                    );
                }
            }
            Ok(())
        }
        Commands::Models => {
            let outcome: Outcome<_> = api.models().await.into();
            report(json, outcome, |models| {
                for model in models {
                    let vision = if model.vision { " (vision)" } else { "" };
                    println!("{}  {}{}", model.id, style(&model.name).dim(), vision);
                }
            })
        }
    }
}

async fn signed_in(api: ApiClient) -> anyhow::Result<ChatSession> {
    if api.token().is_none() {
        bail!("No token; run `parley login` and set PARLEY_TOKEN");
    }
    let mut session = ChatSession::new(api);
    exit_on_failure(session.resume().await)?;
    Ok(session)
}

fn exit_on_failure<T>(outcome: Outcome<T>) -> anyhow::Result<T> {
    match outcome {
        Outcome::Success(data) => Ok(data),
        Outcome::Failure(failure) => bail!("{} ({})", failure.message, failure.code),
    }
}

fn print_token(token: Option<&str>) {
    if let Some(token) = token {
        println!("export PARLEY_TOKEN={token}");
    }
}

fn report<T: serde::Serialize>(json: bool, outcome: Outcome<T>, render: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return match outcome {
            Outcome::Success(_) => Ok(()),
            Outcome::Failure(failure) => bail!("{}", failure.code),
        };
    }
    match &outcome {
        Outcome::Success(data) => {
            render(data);
            Ok(())
        }
        Outcome::Failure(failure) => {
            eprintln!("{} {}", style("error:").red().bold(), failure.message);
            bail!("{}", failure.code)
        }
    }
}

fn print_turn_event(event: &TurnEvent, json: bool) {
    if json {
        return;
    }
    match event {
        TurnEvent::Delta { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        TurnEvent::ModelSwitched { notice, .. } => {
            eprintln!("{}", style(notice).yellow());
        }
        TurnEvent::Generation { generation } => {
            if let Some(url) = generation.get("url").and_then(|u| u.as_str()) {
                println!("\n{} {url}", style("image:").cyan());
            }
        }
        TurnEvent::Title { chat } => {
            if let Some(title) = chat.get("title").and_then(|t| t.as_str()) {
                eprintln!("{} {title}", style("title:").dim());
            }
        }
        TurnEvent::Error { message } => {
            eprintln!("\n{} {message}", style("error:").red().bold());
        }
        TurnEvent::Done => println!(),
        TurnEvent::UserMessage { .. } | TurnEvent::AssistantMessage { .. } => {}
    }
}

fn finish_turn(
    json: bool,
    outcome: Outcome<parley_client::TurnSummary>,
    chat: Option<Uuid>,
) -> anyhow::Result<()> {
    if json {
        let outcome = outcome.map(|summary| {
            serde_json::json!({
                "chat_id": chat,
                "replies": summary.replies,
                "generations": summary.generations,
                "switched_model": summary.switched_model,
            })
        });
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match outcome {
        Outcome::Success(_) => {
            if let Some(chat) = chat {
                eprintln!("{} {chat}", style("chat:").dim());
            }
            Ok(())
        }
        Outcome::Failure(failure) => bail!("{}", failure.code),
    }
}
