//! wolfs3fs - Hierarchical Filesystem over S3 Object Storage
//!
//! Command-line front end for bootstrapping a bucket and browsing it
//! through the filesystem adapter.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfs3fs::channel::{OpenOptions, SeekableChannel};
use wolfs3fs::config::{LoggingConfig, Wolfs3fsConfig};
use wolfs3fs::error::{Error, Result};
use wolfs3fs::factory::{FileSystemFactory, S3FileSystemFactory, SessionContext};
use wolfs3fs::fs::S3FileSystem;
use wolfs3fs::session::{LoggingEventListener, PathResolver, SessionEventListener};

/// Transfer chunk size for get/put/cat
const CHUNK_SIZE: usize = 64 * 1024;

/// wolfs3fs - Hierarchical Filesystem over S3 Object Storage
#[derive(Parser)]
#[command(name = "wolfs3fs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfs3fs.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// User whose home directory relative paths resolve against
    #[arg(short, long, default_value = "admin")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfs3fs.toml")]
        output: PathBuf,

        /// Bucket name
        #[arg(long, default_value = "customsftpfolderpath")]
        bucket: String,
    },

    /// Validate configuration file
    Validate,

    /// Show configuration summary
    Info,

    /// Create bootstrap and home directories
    Bootstrap,

    /// List a directory
    Ls {
        #[arg(default_value = ".")]
        path: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show attributes of a file or directory
    Stat {
        path: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Create a directory
    Mkdir { path: String },

    /// Delete a file or a directory tree
    Rm { path: String },

    /// Copy a file (directories copy only their marker)
    Cp { from: String, to: String },

    /// Move a file or an empty directory
    Mv { from: String, to: String },

    /// Download a file
    Get { remote: String, local: PathBuf },

    /// Upload a file
    Put { local: PathBuf, remote: String },

    /// Print a file to stdout
    Cat { path: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it is readable
    let logging = Wolfs3fsConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(cli.log_level.as_deref().unwrap_or(&logging.level), &logging);

    match cli.command {
        Commands::Init { output, bucket } => run_init(output, bucket),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Bootstrap => run_bootstrap(cli.config).await,
        command => {
            let session = Session::open(&cli.config, &cli.user).await?;
            let result = session.run(command).await;
            session.close().await;
            result
        }
    }
}

/// Initialize logging. Logs go to stderr so `cat` output stays clean.
fn init_logging(level: &str, logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "compact" {
        registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Generate a configuration file
fn run_init(output: PathBuf, bucket: String) -> Result<()> {
    let config_content = format!(r#"# wolfs3fs Configuration
# Generated configuration file

[storage]
backend = "s3"
bucket = "{bucket}"
region = "us-east-1"
# endpoint = "http://localhost:9000"
# access_key = "minioadmin"
# secret_key = "minioadmin"
path_style = false

[listing]
page_size = 1000

[channels]
initial_buffer_size = 8192
max_buffer_size = 5368709120

[attributes]
owner = "admin"
group = "admin"

[homes]
default_template = "/home/{{user}}"
bootstrap = ["/home", "/home/admin"]

[homes.users]
admin = "/home/admin"

[logging]
level = "info"
format = "full"
"#);

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your bucket and credentials.");
    println!("Then create the base directories with: wolfs3fs --config {} bootstrap", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match Wolfs3fsConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Backend: {:?}", config.storage.backend);
            println!("  Bucket: {}", config.storage.bucket);
            println!("  Endpoint: {}", config.storage.endpoint.as_deref().unwrap_or("(AWS)"));
            println!("  Mapped users: {}", config.homes.users.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show configuration summary
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = Wolfs3fsConfig::from_file(&config_path)?;

    println!("wolfs3fs Configuration");
    println!("======================");
    println!();
    println!("Storage:");
    println!("  Backend:        {:?}", config.storage.backend);
    println!("  Bucket:         {}", config.storage.bucket);
    println!("  Region:         {}", config.storage.region);
    println!("  Endpoint:       {}", config.storage.endpoint.as_deref().unwrap_or("(AWS)"));
    println!("  Path Style:     {}", config.storage.path_style);
    println!("  Credentials:    {}", if config.storage.access_key.is_some() { "configured" } else { "environment" });
    println!();
    println!("Filesystem:");
    println!("  Page Size:      {}", config.listing.page_size);
    println!("  Buffer Size:    {} bytes", config.channels.initial_buffer_size);
    println!("  Buffer Limit:   {} bytes", config.channels.max_buffer_size);
    println!("  Owner/Group:    {}/{}", config.attributes.owner, config.attributes.group);
    println!();
    println!("Home Directories:");
    println!("  Default:        {}", config.homes.default_template);
    let mut users: Vec<_> = config.homes.users.iter().collect();
    users.sort();
    for (user, home) in users {
        println!("  {:<15} {}", format!("{}:", user), home);
    }

    Ok(())
}

/// Create the bootstrap directories and every mapped user's home
async fn run_bootstrap(config_path: PathBuf) -> Result<()> {
    let config = Wolfs3fsConfig::from_file(&config_path)?;
    let factory = S3FileSystemFactory::new(config);

    let created = factory.initialize_directory_structure().await?;
    println!("✓ Bootstrap directories ready ({} created)", created);

    for user in factory.homes().users().await {
        let session = SessionContext::new(user.clone());
        let home = factory.user_home_dir(&session).await?;
        let fs = factory.create_file_system(&session).await?;
        PathResolver::new(fs, &home).await?;
        println!("✓ Home for {}: {}", user, home);
    }

    factory.shutdown().await;
    Ok(())
}

/// One CLI invocation acting as a session
struct Session {
    factory: S3FileSystemFactory,
    context: SessionContext,
    fs: Arc<S3FileSystem>,
    resolver: PathResolver,
    events: LoggingEventListener,
}

impl Session {
    async fn open(config_path: &std::path::Path, user: &str) -> Result<Self> {
        let config = Wolfs3fsConfig::from_file(config_path)?;
        let factory = S3FileSystemFactory::new(config);
        let context = SessionContext::new(user).with_remote_address("cli");

        let fs = factory.create_file_system(&context).await?;
        let home = factory.user_home_dir(&context).await?;
        let resolver = PathResolver::with_cwd(fs.clone(), &home);

        let events = LoggingEventListener;
        events.initialized(&context, 1);

        Ok(Self {
            factory,
            context,
            fs,
            resolver,
            events,
        })
    }

    async fn close(self) {
        self.events.destroying(&self.context);
        self.factory.shutdown().await;
    }

    async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Ls { path, json } => self.ls(&path, json).await,
            Commands::Stat { path, json } => self.stat(&path, json).await,
            Commands::Mkdir { path } => {
                let path = self.resolver.resolve(&path);
                self.fs.create_directory(&path).await?;
                println!("✓ Created {}", path);
                Ok(())
            }
            Commands::Rm { path } => {
                let path = self.resolver.resolve(&path);
                self.fs.delete(&path).await?;
                println!("✓ Deleted {}", path);
                Ok(())
            }
            Commands::Cp { from, to } => {
                let (from, to) = (self.resolver.resolve(&from), self.resolver.resolve(&to));
                self.fs.copy(&from, &to).await?;
                println!("✓ Copied {} -> {}", from, to);
                Ok(())
            }
            Commands::Mv { from, to } => {
                let (from, to) = (self.resolver.resolve(&from), self.resolver.resolve(&to));
                self.fs.move_path(&from, &to).await?;
                println!("✓ Moved {} -> {}", from, to);
                Ok(())
            }
            Commands::Get { remote, local } => self.get(&remote, &local).await,
            Commands::Put { local, remote } => self.put(&local, &remote).await,
            Commands::Cat { path } => self.cat(&path).await,
            Commands::Init { .. } | Commands::Validate | Commands::Info | Commands::Bootstrap => {
                Err(Error::InvalidArgument("command does not need a session".into()))
            }
        }
    }

    async fn ls(&self, path: &str, json: bool) -> Result<()> {
        let dir = self.resolver.resolve(path);
        let entries = self.fs.list_directory(&dir, None)?.collect_all().await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }
        for entry in entries {
            println!("{} {}", if entry.is_directory { "d" } else { "-" }, entry);
        }
        Ok(())
    }

    async fn stat(&self, path: &str, json: bool) -> Result<()> {
        let path = self.resolver.resolve(path);
        let attrs = self.fs.read_attributes_map(&path, "posix:*").await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&attrs)?);
            return Ok(());
        }
        println!("{} ({})", path, path.to_uri(self.fs.bucket()));
        for (name, value) in &attrs {
            println!("  {:<18} {}", name, serde_json::to_string(value)?);
        }
        Ok(())
    }

    /// Stream a remote file chunk by chunk into `sink`
    async fn copy_out<W>(&self, remote: &str, sink: &mut W) -> Result<u64>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        let path = self.resolver.resolve(remote);
        let mut channel = self.fs.open_channel(&path, &OpenOptions::new().read(true)).await?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;

        loop {
            let offset = total;
            let n = match channel.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.events.read(&self.context, &path.to_string(), offset, Err(&e));
                    return Err(e);
                }
            };
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n]).await?;
            total += n as u64;
            self.events.read(&self.context, &path.to_string(), offset, Ok(n));
        }

        channel.close().await?;
        Ok(total)
    }

    async fn get(&self, remote: &str, local: &std::path::Path) -> Result<()> {
        let mut file = tokio::fs::File::create(local).await?;
        let total = self.copy_out(remote, &mut file).await?;
        file.flush().await?;
        println!("✓ Downloaded {} bytes to {}", total, local.display());
        Ok(())
    }

    async fn cat(&self, remote: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        self.copy_out(remote, &mut stdout).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn put(&self, local: &std::path::Path, remote: &str) -> Result<()> {
        let path = self.resolver.resolve(remote);
        let mut file = tokio::fs::File::open(local).await?;
        let options = OpenOptions::new().write(true).create(true).truncate(true);
        let mut channel = self.fs.open_channel(&path, &options).await?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let result = channel.write(&buf[..n]).await;
            self.events
                .written(&self.context, &path.to_string(), total, result.as_ref().copied());
            total += result? as u64;
        }

        channel.close().await?;
        println!("✓ Uploaded {} bytes to {}", total, path);
        Ok(())
    }
}
