use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use threadtrace_core::{
    config::{Config, Credentials},
    http_client::HttpClient,
    profile::Profile,
    providers::anthropic::Anthropic,
    session::{self, Session, SessionSettings},
    telemetry::{ExportSettings, OtelTurnTracer},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Chat with Claude, tracing each turn to LangSmith", long_about = None)]
struct Cli {
    /// Which assistant to run
    #[arg(long, value_enum, default_value_t = ProfileArg::Chat)]
    profile: ProfileArg,
    /// Optional JSON or TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the model id from config
    #[arg(long)]
    model: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    Chat,
    Itsm,
}

impl From<ProfileArg> for Profile {
    fn from(p: ProfileArg) -> Self {
        match p {
            ProfileArg::Chat => Profile::Chat,
            ProfileArg::Itsm => Profile::Itsm,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();
    if let Err(e) = dotenv {
        info!(error = %e, "no .env file found, using environment variables");
    }

    let mut cfg = match &cli.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    cfg.apply_env_overrides(|k| std::env::var(k).ok());
    if let Some(model) = cli.model {
        cfg.model.model = model;
    }
    cfg.validate()?;

    let creds = Credentials::from_env()?;
    let profile = Profile::from(cli.profile);
    let project_name = creds
        .project_name
        .clone()
        .unwrap_or_else(|| profile.default_project().to_string());

    // The OTLP exporter uses a blocking HTTP client, which must be built outside
    // the async runtime.
    let tracer = Arc::new(
        OtelTurnTracer::install(
            &ExportSettings {
                service_name: profile.service_name().to_string(),
                endpoint: cfg.tracing.endpoint.clone(),
                api_key: creds.langsmith_api_key,
                project_name: project_name.clone(),
                batch_timeout: Duration::from_millis(cfg.tracing.batch_timeout_ms),
            },
            profile.naming(),
        )
        .context("initializing tracer")?,
    );

    let http = HttpClient::new(&cfg.http).context("building HTTP client")?;
    let provider = Anthropic::new(http, creds.anthropic_api_key, cfg.model.base_url.clone())
        .with_tracer(tracer.tracer());

    let settings = SessionSettings {
        profile,
        project_name,
        model: cfg.model.model.clone(),
        max_tokens: cfg.model.max_tokens,
        flush_timeout: Duration::from_millis(cfg.tracing.flush_timeout_ms),
    };
    let mut session = Session::start(None, settings, Arc::new(provider), tracer.clone());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let result = rt.block_on(session::run(&mut session, io::stdin().lock(), io::stdout()));
    if let Err(e) = &result {
        error!(error = %e, "chat loop ended with an error");
        session.shutdown();
    }
    drop(session);
    drop(rt);
    drop(tracer);

    result.map_err(Into::into)
}
