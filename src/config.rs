use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf};

pub const DEFAULT_LISTEN_PORT: u16 = 6969;
pub const DEFAULT_IMG_ROOT: &str = "./img";
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; built once at startup
/// and handed to the services that need it.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the Forgejo instance used for authentication.
    pub instance: String,
    pub img_root: PathBuf,
    /// URL path segment images are served under, with a trailing `/` when non-empty.
    pub subpath: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Authenticated content-addressed image store")]
pub struct Args {
    /// Identity provider base URL (overrides INSTANCE)
    #[arg(long)]
    pub instance: Option<String>,

    /// Directory where images are stored (overrides IMG_ROOT)
    #[arg(long)]
    pub img_root: Option<PathBuf>,

    /// URL path prefix for returned image URLs (overrides SUBPATH)
    #[arg(long)]
    pub subpath: Option<String>,

    /// Port to listen on (overrides LISTEN_PORT)
    #[arg(long)]
    pub listen_port: Option<String>,

    /// Host to bind to (overrides LISTEN_HOST)
    #[arg(long)]
    pub host: Option<String>,
}

impl AppConfig {
    /// Parse CLI args and the process environment into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge CLI args over values looked up by `lookup` (normally the
    /// environment). Empty values count as unset.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pick = |arg: Option<String>, key: &str| {
            arg.or_else(|| lookup(key)).filter(|value| !value.is_empty())
        };

        let Some(instance) = pick(args.instance, "INSTANCE") else {
            bail!("no forgejo instance set for auth (INSTANCE)");
        };
        let instance = instance.trim_end_matches('/').to_string();

        let img_root = args
            .img_root
            .or_else(|| pick(None, "IMG_ROOT").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMG_ROOT));

        let subpath = match pick(args.subpath, "SUBPATH") {
            Some(subpath) => format!("{}/", subpath),
            None => String::new(),
        };

        let port = match pick(args.listen_port, "LISTEN_PORT") {
            Some(raw) => parse_listen_port(&raw)?,
            None => DEFAULT_LISTEN_PORT,
        };

        let host = pick(args.host, "LISTEN_HOST").unwrap_or_else(|| DEFAULT_HOST.into());

        Ok(Self {
            host,
            port,
            instance,
            img_root,
            subpath,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a listen port. Any integer is accepted and truncated to its low 16
/// bits, so `70000` listens on `4464`; only non-numeric input is an error.
pub fn parse_listen_port(raw: &str) -> Result<u16> {
    let value = raw
        .parse::<i64>()
        .with_context(|| format!("parsing LISTEN_PORT value `{}`", raw))?;
    Ok(value as u16)
}
