use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pqvault::config::Config;
use pqvault::file_ops::ContainerStore;
use pqvault::identity::IdentityManager;
use secrecy::{ExposeSecret, SecretString};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Password used instead of prompting, for scripted use
const ENV_PASSWORD: &str = "PQVAULT_PASSWORD";
const ENV_NEW_PASSWORD: &str = "PQVAULT_NEW_PASSWORD";

/// pqvault - post-quantum file encryption (Kyber1024 + AES-256-GCM)
#[derive(Parser)]
#[command(name = "pqvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "pqvault.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a key pair, seal it under a password and write the config
    Init {
        /// Storage directory path
        #[arg(short, long, default_value = "./storage")]
        storage_dir: String,

        /// Identity file path
        #[arg(short, long, default_value = "./pqvault.identity.json")]
        identity_path: String,
    },

    /// Encrypt a file into storage
    Encrypt {
        /// Input file to encrypt
        input: PathBuf,

        /// Container name in storage (defaults to input filename)
        #[arg(short, long)]
        output: Option<String>,

        /// Read the input incrementally instead of loading it whole
        #[arg(short, long)]
        stream: bool,
    },

    /// Decrypt a container from storage
    Decrypt {
        /// Container name in storage
        name: String,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-seal the private key under a new password
    RotatePassword,

    /// List all containers
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Remove a container
    Remove {
        /// Container name to remove
        name: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show storage status and statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls the level, e.g. RUST_LOG=info,pqvault=debug
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "pqvault starting");

    match cli.command {
        Commands::Init {
            storage_dir,
            identity_path,
        } => cmd_init(&cli.config, &storage_dir, &identity_path).await,

        Commands::Encrypt {
            input,
            output,
            stream,
        } => cmd_encrypt(&cli.config, &input, output.as_deref(), stream).await,

        Commands::Decrypt { name, output } => cmd_decrypt(&cli.config, &name, output.as_ref()).await,

        Commands::RotatePassword => cmd_rotate(&cli.config).await,

        Commands::List { verbose } => cmd_list(&cli.config, verbose).await,

        Commands::Remove { name, yes } => cmd_remove(&cli.config, &name, yes).await,

        Commands::Status => cmd_status(&cli.config).await,
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(config_path: &str) -> Result<Config> {
    Config::load_with_env(Some(config_path))
}

/// Reads a password from `PQVAULT_PASSWORD` or prompts on the terminal.
fn read_password(prompt: &str) -> Result<SecretString> {
    if let Ok(pw) = std::env::var(ENV_PASSWORD) {
        return Ok(SecretString::from(pw));
    }
    let pw = rpassword::prompt_password(prompt).context("reading password")?;
    Ok(SecretString::from(pw))
}

/// Prompts twice and requires both entries to match.
fn read_new_password(prompt: &str) -> Result<SecretString> {
    if let Ok(pw) = std::env::var(ENV_PASSWORD) {
        return Ok(SecretString::from(pw));
    }
    let first = rpassword::prompt_password(prompt).context("reading password")?;
    let second = rpassword::prompt_password("Confirm password: ").context("reading password")?;
    if first != second {
        anyhow::bail!("passwords do not match");
    }
    if first.is_empty() {
        anyhow::bail!("password cannot be empty");
    }
    Ok(SecretString::from(first))
}

async fn open_store(cfg: &Config) -> Result<(IdentityManager, ContainerStore)> {
    let identity = IdentityManager::load(cfg)
        .await
        .with_context(|| format!("loading identity '{}'", cfg.identity_path))?;
    let store = ContainerStore::for_identity(&identity, cfg.storage_dir.clone())?;
    Ok((identity, store))
}

async fn cmd_init(config_path: &str, storage_dir: &str, identity_path: &str) -> Result<()> {
    println!("Initializing pqvault...");

    let cfg = Config::new(identity_path, storage_dir);
    cfg.validate()?;

    if fs::try_exists(config_path).await.unwrap_or(false) {
        anyhow::bail!(
            "Configuration file '{}' already exists. Remove it first or use a different path.",
            config_path
        );
    }

    fs::create_dir_all(storage_dir)
        .await
        .with_context(|| format!("creating storage directory '{}'", storage_dir))?;

    let password = read_new_password("New identity password: ")?;
    let spinner = create_spinner("Generating Kyber1024 key pair...");
    let identity = IdentityManager::create(&cfg, password).await?;
    spinner.finish_with_message("Identity created");

    let config_json = serde_json::to_string_pretty(&cfg)?;
    fs::write(config_path, config_json)
        .await
        .with_context(|| format!("writing config to '{}'", config_path))?;

    println!("Initialization complete!");
    println!("Config:   {}", config_path);
    println!("Identity: {}", identity.path().display());
    println!("Storage:  {}", storage_dir);
    println!();
    println!("IMPORTANT: Back up the identity file and remember its password.");
    println!("Without both, your containers cannot be recovered.");

    Ok(())
}

async fn cmd_encrypt(config_path: &str, input: &PathBuf, output: Option<&str>, stream: bool) -> Result<()> {
    let cfg = load_config(config_path)?;
    let (_identity, store) = open_store(&cfg).await?;

    let output_name = match output {
        Some(name) => name.to_string(),
        None => input
            .file_name()
            .context("input file has no filename")?
            .to_string_lossy()
            .to_string(),
    };

    let mode_str = if stream { "streaming" } else { "buffer" };
    let spinner = create_spinner(&format!("Encrypting {}...", input.display()));

    let bytes = if stream {
        let mut file = fs::File::open(input)
            .await
            .with_context(|| format!("opening {:?}", input))?;
        store.write_encrypted_stream(&output_name, &mut file).await?
    } else {
        let data = fs::read(input)
            .await
            .with_context(|| format!("reading {:?}", input))?;
        store.write_encrypted(&output_name, &data).await?;
        data.len() as u64
    };

    spinner.finish_with_message(format!("Encrypted {} bytes ({})", bytes, mode_str));
    println!("  {} -> {}", input.display(), output_name);
    Ok(())
}

async fn cmd_decrypt(config_path: &str, name: &str, output: Option<&PathBuf>) -> Result<()> {
    let cfg = load_config(config_path)?;
    let (identity, store) = open_store(&cfg).await?;

    if !store.exists(name).await {
        anyhow::bail!("Container '{}' not found in storage", name);
    }

    let password = read_password("Identity password: ")?;
    let spinner = create_spinner(&format!("Decrypting {}...", name));
    let data = store
        .read_encrypted_with_password(name, &identity, password)
        .await?;

    match output {
        Some(output_path) => {
            fs::write(output_path, &data)
                .await
                .with_context(|| format!("writing to {:?}", output_path))?;
            spinner.finish_with_message(format!("Decrypted {} bytes -> {:?}", data.len(), output_path));
        }
        None => {
            spinner.finish_and_clear();
            io::stdout().write_all(&data)?;
            eprintln!("Decrypted {} bytes to stdout", data.len());
        }
    }

    Ok(())
}

async fn cmd_rotate(config_path: &str) -> Result<()> {
    let cfg = load_config(config_path)?;
    let mut identity = IdentityManager::load(&cfg).await?;

    let old = read_password("Current password: ")?;
    let new = if std::env::var(ENV_PASSWORD).is_ok() {
        let next = std::env::var(ENV_NEW_PASSWORD)
            .with_context(|| format!("{} must be set when {} is", ENV_NEW_PASSWORD, ENV_PASSWORD))?;
        SecretString::from(next)
    } else {
        read_new_password("New password: ")?
    };

    if old.expose_secret() == new.expose_secret() {
        anyhow::bail!("new password must differ from the current one");
    }

    let spinner = create_spinner("Re-sealing private key...");
    identity.rotate_password(old, new).await?;
    spinner.finish_with_message("Password rotated; stored containers are unchanged");
    Ok(())
}

async fn cmd_list(config_path: &str, verbose: bool) -> Result<()> {
    let cfg = load_config(config_path)?;
    let (_identity, store) = open_store(&cfg).await?;

    let files = store.list_files().await?;

    if files.is_empty() {
        println!("No containers found");
        return Ok(());
    }

    println!("Containers ({} total):", files.len());
    println!();

    if verbose {
        println!("{:<40} {:>12} {:>12} {:>8}", "NAME", "CONTAINER", "PLAINTEXT", "VERSION");
        println!("{}", "-".repeat(75));

        for (name, size, has_meta) in files {
            let (plain, version) = if has_meta {
                match store.get_metadata(&name).await {
                    Ok(meta) => (meta.plaintext_size.to_string(), meta.version),
                    Err(_) => ("?".to_string(), "?".to_string()),
                }
            } else {
                ("-".to_string(), "-".to_string())
            };
            println!("{:<40} {:>12} {:>12} {:>8}", name, size, plain, version);
        }
    } else {
        for (name, size, _) in files {
            println!("  {} ({} bytes)", name, size);
        }
    }

    Ok(())
}

async fn cmd_remove(config_path: &str, name: &str, yes: bool) -> Result<()> {
    let cfg = load_config(config_path)?;
    let (_identity, store) = open_store(&cfg).await?;

    if !store.exists(name).await {
        anyhow::bail!("Container '{}' not found in storage", name);
    }

    if !yes {
        print!("Delete '{}'? This cannot be undone. [y/N]: ", name);
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().read_line(&mut response)?;

        if !response.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.delete_file(name).await?;
    println!("Deleted '{}'", name);
    Ok(())
}

async fn cmd_status(config_path: &str) -> Result<()> {
    let cfg = load_config(config_path)?;

    println!("pqvault Status");
    println!();

    println!("Configuration:");
    println!("  Config file:   {}", config_path);
    println!("  Identity file: {}", cfg.identity_path);
    println!("  Storage dir:   {}", cfg.storage_dir);
    println!(
        "  Argon2id:      m={} KiB, t={}, p={}",
        cfg.kdf.mem_cost_kib, cfg.kdf.time_cost, cfg.kdf.parallelism
    );
    println!();

    let identity = match IdentityManager::load(&cfg).await {
        Ok(identity) => {
            println!("Identity:        Present (format {})", pqvault::FORMAT_VERSION);
            let kdf = identity.kdf();
            println!(
                "  Sealed with:   m={} KiB, t={}, p={}",
                kdf.mem_cost_kib, kdf.time_cost, kdf.parallelism
            );
            identity
        }
        Err(e) => {
            println!("Identity:        Unusable ({})", e);
            return Ok(());
        }
    };
    println!();

    let store = ContainerStore::for_identity(&identity, cfg.storage_dir.clone())?;
    let files = store.list_files().await?;

    let total_files = files.len();
    let total_size: u64 = files.iter().map(|(_, size, _)| size).sum();
    let files_with_meta = files.iter().filter(|(_, _, has_meta)| *has_meta).count();

    println!("Storage Statistics:");
    println!("  Total containers:  {}", total_files);
    println!("  Total size:        {} bytes ({:.2} MB)", total_size, total_size as f64 / 1_048_576.0);
    println!("  With metadata:     {}/{}", files_with_meta, total_files);

    let orphaned = total_files - files_with_meta;
    if orphaned > 0 {
        println!();
        println!("WARNING: {} container(s) missing metadata", orphaned);
    }

    Ok(())
}
