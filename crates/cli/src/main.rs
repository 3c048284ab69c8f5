#![deny(warnings)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use emotion2poem_core::archive::{
    clipboard_text, preview, write_download, PoemArchive, RECENT_LIMIT,
};
use emotion2poem_core::config::{
    resolve_api_key, resolve_store_path, resolve_string_with_default, ApiKey, Env,
    FallbackDelay, RemoteConfig, StdEnv, DEFAULT_BASE_URL, DEFAULT_FALLBACK_DELAY_MS,
    DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS, ENV_OPENAI_API_KEY, ENV_OPENAI_BASE_URL,
    ENV_STORE_PATH,
};
use emotion2poem_core::credential::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use emotion2poem_core::poem::OpenAiPoemClient;
use emotion2poem_core::resolver::PoemResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emotion2poem")]
#[command(about = "Turn a feeling into a short free-verse poem")]
struct Args {
    /// API key for this run only; never written to the store.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Key-value file holding the saved API key.
    #[arg(long, global = true, env = ENV_STORE_PATH)]
    store: Option<String>,

    #[arg(long, global = true, env = ENV_OPENAI_BASE_URL)]
    base_url: Option<String>,

    #[arg(long, global = true, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, global = true, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Pause before a banked poem is shown (0-1500).
    #[arg(long, global = true, default_value_t = DEFAULT_FALLBACK_DELAY_MS)]
    fallback_delay_ms: u64,

    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a poem for the given emotion.
    Generate {
        #[arg(required = true, num_args = 1..)]
        emotion: Vec<String>,

        /// Also save the poem as a text file in this directory.
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Print the clipboard form (emotion heading, then the poem).
        #[arg(long, conflicts_with = "json")]
        copy_format: bool,

        #[arg(long)]
        json: bool,
    },
    /// List the most recent poems saved with `generate --save-dir`.
    Archive {
        dir: PathBuf,

        #[arg(long, default_value_t = RECENT_LIMIT)]
        limit: usize,
    },
    /// Manage the saved API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    Set { key: String },
    Clear,
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let store_path = resolve_store_path(args.store.clone(), &env);
    tracing::debug!(store = %store_path.display(), "store resolved");

    match args.command {
        Command::Key { ref action } => run_key(action, FileCredentialStore::new(store_path)),
        Command::Archive { ref dir, limit } => {
            let listing = run_archive(dir, limit)?;
            print!("{listing}");
            Ok(())
        }
        Command::Generate {
            ref emotion,
            ref save_dir,
            copy_format,
            json,
        } => {
            let input = emotion.join(" ");
            let output = Output {
                save_dir: save_dir.clone(),
                copy_format,
                json,
            };
            run_generate(&args, &env, store_path, &input, output).await
        }
    }
}

struct Output {
    save_dir: Option<PathBuf>,
    copy_format: bool,
    json: bool,
}

async fn run_generate(
    args: &Args,
    env: &impl Env,
    store_path: PathBuf,
    input: &str,
    output: Output,
) -> anyhow::Result<()> {
    let credentials: Arc<dyn CredentialStore> =
        match resolve_api_key(args.api_key.clone(), ENV_OPENAI_API_KEY, env)? {
            Some(key) => Arc::new(MemoryCredentialStore::with_key(key)),
            None => Arc::new(FileCredentialStore::new(store_path)),
        };

    let base_url = resolve_string_with_default(
        args.base_url.clone(),
        ENV_OPENAI_BASE_URL,
        env,
        DEFAULT_BASE_URL,
    );
    let remote = RemoteConfig::new(&base_url, args.model.clone())?
        .with_timeout(Duration::from_secs(args.timeout_secs));
    let delay = FallbackDelay::new(args.fallback_delay_ms)?;

    tracing::info!(model = %remote.model, fallback_delay_ms = delay.millis, "config loaded");

    let resolver =
        PoemResolver::new(credentials, OpenAiPoemClient::new(remote)).with_fallback_delay(delay);

    let generated = resolver.generate_text(input).await?;

    if let Some(advisory) = &generated.advisory {
        eprintln!("note: {}", advisory.message);
    }

    let poem = &generated.result;
    if output.json {
        println!("{}", serde_json::to_string_pretty(poem)?);
    } else if output.copy_format {
        println!("{}", clipboard_text(poem));
    } else {
        println!("{}", poem.poem_text());
        eprintln!("\n({} poem)", poem.source());
    }

    if let Some(dir) = output.save_dir {
        let path = write_download(&dir, poem)
            .with_context(|| format!("failed to save poem into {}", dir.display()))?;
        eprintln!("saved to {}", path.display());
    }

    Ok(())
}

fn run_key(action: &KeyAction, store: FileCredentialStore) -> anyhow::Result<()> {
    match action {
        KeyAction::Set { key } => {
            store.set(ApiKey::new(key.as_str())?)?;
            println!("API key saved to {}", store.path().display());
        }
        KeyAction::Clear => {
            store.clear()?;
            println!("API key removed");
        }
        KeyAction::Status => match store.get()? {
            Some(_) => println!("API key configured ({})", store.path().display()),
            None => println!("no API key configured; poems come from the fallback bank"),
        },
    }
    Ok(())
}

fn run_archive(dir: &Path, limit: usize) -> anyhow::Result<String> {
    let archive = PoemArchive::read_dir(dir)
        .with_context(|| format!("failed to read saved poems from {}", dir.display()))?;
    if archive.is_empty() {
        return Ok(format!("no saved poems in {}\n", dir.display()));
    }

    let mut listing = String::new();
    for poem in archive.recent(limit) {
        listing.push_str(&format!(
            "{}  {}\n  {}\n",
            poem.saved_at().format("%Y-%m-%d"),
            poem.emotion_label(),
            preview(poem.poem_text()).replace('\n', " ")
        ));
    }
    Ok(listing)
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
