use anyhow::Context;
use clap::Parser;
use log::info;
use peekmail::Config;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

/// Local SMTP server that previews mail instead of delivering it
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for attachments and rendered previews
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Name used in the greeting and EHLO replies
    #[arg(long)]
    hostname: Option<String>,

    /// AUTH PLAIN username
    #[arg(long)]
    user: Option<String>,

    /// AUTH PLAIN password
    #[arg(long)]
    password: Option<String>,

    /// Refuse mail from clients that did not authenticate
    #[arg(long)]
    require_auth: bool,

    /// Close idle connections after this many seconds (0 disables)
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Only render bodies of this content type (repeatable)
    #[arg(long = "render", value_name = "CONTENT_TYPE")]
    content_types: Vec<String>,

    /// Write previews without opening them
    #[arg(long)]
    no_open: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(host) = self.host {
            config = config.with_host(host);
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(dir) = self.dir {
            config = config.with_dir(dir);
        }
        if let Some(hostname) = self.hostname {
            config = config.with_hostname(hostname);
        }
        if let Some(user) = self.user {
            config = config.with_username(user);
        }
        if let Some(password) = self.password {
            config = config.with_password(password);
        }
        if self.require_auth {
            config = config.with_require_auth(true);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        if !self.content_types.is_empty() {
            config = config.with_content_types(self.content_types);
        }
        if self.no_open {
            config = config.with_open(false);
        }

        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config()?;
    let server = config.server()?;

    info!("Starting Peekmail SMTP server...");
    info!("Address: {}", config.addr());
    info!("Hostname: {}", config.hostname);

    let (tx, rx) = mpsc::channel::<peekmail::Email>();

    thread::spawn(move || {
        let mut count = 0;
        while let Ok(email) = rx.recv() {
            count += 1;
            info!(
                "Received email #{} from: {} to: {:?}",
                count, email.envelope.sender, email.envelope.recipients
            );
            info!("  Subject: {}", email.subject);
        }
    });

    server
        .start(&config.addr(), tx)
        .with_context(|| format!("failed to serve on {}", config.addr()))
}
