use anyhow::{anyhow, Context, Result};
use clap::Parser;
use qalamx::chat_api::{ChatClient, ChatConfig, ModelType};
use qalamx::history::build_request_messages;
use qalamx::logging::{init_logging, LoggingConfig};
use qalamx::session::{Attachment, ChatMessage, ChatSession, SessionStore};
use qalamx::settings::{detect_direction, Language, Theme};
use qalamx::terminal::StreamPrinter;
use qalamx::turn::{FinishedTurn, Turn};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Base URL of the Ollama-compatible API
    #[arg(long, default_value = "http://localhost:11434")]
    host: String,

    /// Model tier (a continued session keeps its own tier otherwise)
    #[arg(long, value_enum)]
    model: Option<ModelType>,

    /// Backend model id, overriding the tier default
    #[arg(long)]
    model_id: Option<String>,

    /// System instruction, overriding the tier default
    #[arg(long)]
    system: Option<String>,

    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    #[arg(long)]
    max_tokens: Option<u32>,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 600)]
    timeout_seconds: u64,

    /// Native reasoning hint sent to the backend (low, medium, high)
    #[arg(long)]
    reasoning_effort: Option<String>,

    /// Directory holding sessions and settings
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Continue this session instead of the current one
    #[arg(long, conflicts_with = "new")]
    session: Option<String>,

    /// Start a new session
    #[arg(long, default_value_t = false)]
    new: bool,

    /// List stored sessions
    #[arg(long, default_value_t = false)]
    list: bool,

    /// Delete a stored session
    #[arg(long)]
    delete: Option<String>,

    /// Delete every stored session
    #[arg(long, default_value_t = false)]
    clear: bool,

    /// Interface language, saved in settings
    #[arg(long, value_enum)]
    lang: Option<Language>,

    /// Color theme, saved in settings
    #[arg(long, value_enum)]
    theme: Option<Theme>,

    /// File sent along with the prompt
    #[arg(long)]
    attach: Option<PathBuf>,

    /// Show a placeholder instead of the reasoning trace
    #[arg(long, default_value_t = false)]
    hide_thinking: bool,

    /// Wait for the full answer instead of streaming (/v1/chat/completions)
    #[arg(long, default_value_t = false)]
    no_stream: bool,

    /// Do not persist this exchange
    #[arg(long, default_value_t = false)]
    no_save: bool,

    #[arg(long, default_value_t = Level::WARN)]
    log_level: Level,

    /// User prompt
    prompt: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(LoggingConfig {
        level: args.log_level,
        ..LoggingConfig::default()
    });

    let root = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => SessionStore::default_root()
            .ok_or_else(|| anyhow!("No data directory available; pass --data-dir"))?,
    };
    let store = SessionStore::open(root)?;

    let mut settings = store.settings();
    if settings.apply(args.lang, args.theme) {
        store.save_settings(&settings)?;
        eprintln!(
            "Settings saved: language={} theme={}",
            settings.language.as_str(),
            settings.theme.as_str()
        );
    }

    if args.clear {
        store.clear_all()?;
        println!("All sessions deleted.");
        return Ok(());
    }

    if let Some(id) = &args.delete {
        if store.delete(id)? {
            println!("Deleted session {id}.");
        } else {
            println!("No session {id}.");
        }
        return Ok(());
    }

    if args.list {
        list_sessions(&store);
        return Ok(());
    }

    let Some(prompt) = args.prompt.clone() else {
        println!("{}", settings.language.greeting());
        return Ok(());
    };

    run_prompt(&args, &store, &prompt)
}

fn list_sessions(store: &SessionStore) {
    let current = store.current_session_id();
    let sessions = store.sessions();
    if sessions.is_empty() {
        println!("No sessions.");
    }
    for session in sessions {
        let marker = if current.as_deref() == Some(session.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}  {:<10}  {:>3} msgs  {} [{}]",
            session.id,
            session.model.display_name(),
            session.messages.len(),
            session.title,
            detect_direction(&session.title).as_str(),
        );
    }
}

fn resolve_session(args: &Args, store: &SessionStore) -> Result<ChatSession> {
    if args.new {
        return Ok(ChatSession::new(args.model.unwrap_or_default()));
    }
    if let Some(id) = &args.session {
        return store
            .get(id)
            .ok_or_else(|| anyhow!("Unknown session: {id}"));
    }
    let current = store
        .current_session_id()
        .and_then(|id| store.get(&id))
        .filter(|session| args.model.map_or(true, |model| model == session.model));
    Ok(current.unwrap_or_else(|| ChatSession::new(args.model.unwrap_or_default())))
}

fn build_config(args: &Args, model: ModelType) -> ChatConfig {
    let mut config = ChatConfig::for_model(model);
    config.host = args.host.clone();
    config.temperature = args.temperature;
    config.timeout_seconds = args.timeout_seconds;
    config.reasoning_effort = args.reasoning_effort.clone();
    if let Some(model_id) = &args.model_id {
        config.model = model_id.clone();
    }
    if let Some(system) = &args.system {
        config.system = system.clone();
    }
    if let Some(max_tokens) = args.max_tokens {
        config.max_tokens = max_tokens;
    }
    config
}

fn run_prompt(args: &Args, store: &SessionStore, prompt: &str) -> Result<()> {
    let mut session = resolve_session(args, store)?;
    let config = build_config(args, session.model);
    info!(session_id = %session.id, model = %config.model, "sending prompt");

    let attachment = args.attach.as_ref().map(Attachment::from_path).transpose()?;
    session.push(ChatMessage::user(prompt, attachment));
    let messages = build_request_messages(&config.system, &session.messages);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;
    let client = ChatClient::new(config)?;
    let mut printer = StreamPrinter::stdio(!args.hide_thinking);

    let finished: FinishedTurn = if args.no_stream {
        let text = runtime.block_on(client.oneshot_with_messages(messages))?;
        let mut turn = Turn::new();
        turn.push(&text);
        turn.finish()
    } else {
        let mut print_error = None;
        let finished = runtime.block_on(client.stream_turn(messages, |result, _delta| {
            if print_error.is_none() {
                print_error = printer.update(result).err();
            }
        }))?;
        if let Some(err) = print_error {
            return Err(err).context("Failed to write to terminal");
        }
        finished
    };
    printer
        .finish(&finished.result)
        .context("Failed to write to terminal")?;

    if !finished.is_complete() {
        eprintln!("(the response ended before the reasoning trace was closed)");
    }

    session.push(ChatMessage::from_turn(&finished));
    if !args.no_save {
        store.save(&session)?;
        store.set_current_session_id(&session.id)?;
    }

    Ok(())
}
