use anyhow::Context;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use xml_resolve::cli::{Cli, ResolveMode, VerbosityLevel};
use xml_resolve::config::{Config, ConfigManager};
use xml_resolve::error::Result as ResolverResult;
use xml_resolve::error_reporter::ErrorReporter;
use xml_resolve::output::{Output, ResolutionOutcome, ResolutionReport, ResolutionStatus};
use xml_resolve::resolver::{EntityResolver, Resolver, ResourceResolver, UriResolver};
use xml_resolve::source::{ResolutionRequest, ResolvedSource};

/// Identifier-independent inputs of one resolution
#[derive(Clone)]
struct Query {
    mode: ResolveMode,
    public_id: Option<String>,
    namespace: Option<String>,
    base_uri: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(error) => {
            ErrorReporter::new(cli.verbosity()).report_config_error(&error);
            return Ok(2);
        }
    };
    let verbosity = verbosity(&config);
    let reporter = ErrorReporter::new(verbosity);

    let started = Instant::now();
    let resolver = match ConfigManager::resolver_builder(&config).build().await {
        Ok(resolver) => resolver,
        Err(error) => {
            reporter.report_error(&error);
            return Ok(2);
        }
    };
    // Transformer features only shape the uri role's unit
    let resolver = match cli.mode {
        ResolveMode::Uri => {
            resolver.with_options(config.transformer.unit_options(*resolver.options()))
        }
        _ => resolver,
    };

    let query = Query {
        mode: cli.mode,
        public_id: cli.public_id.clone(),
        namespace: cli.namespace.clone(),
        base_uri: cli.base_uri.clone(),
    };
    let concurrency = ConfigManager::get_concurrency(&config);
    info!(
        identifiers = cli.identifiers.len(),
        mode = cli.mode.as_str(),
        concurrency,
        "resolving"
    );

    let outcomes = resolve_all(&resolver, &query, &cli.identifiers, concurrency).await?;
    for outcome in &outcomes {
        if let ResolutionStatus::Error { message } = &outcome.status {
            debug!(identifier = %outcome.identifier, %message, "resolution failed");
        }
    }

    let report = ResolutionReport::new(
        cli.mode,
        resolver.options().policy,
        resolver.catalogs().locations().map(str::to_string).collect(),
        outcomes,
        started.elapsed(),
    );

    let output = Output::new(verbosity);
    let rendered = output
        .render(&report, config.output.format.clone().into())
        .context("failed to render resolution report")?;
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }

    Ok(report.exit_code() as u8)
}

fn verbosity(config: &Config) -> VerbosityLevel {
    if config.output.quiet {
        VerbosityLevel::Quiet
    } else if config.output.verbose {
        VerbosityLevel::Verbose
    } else {
        VerbosityLevel::Normal
    }
}

/// Resolve every identifier, at most `concurrency` at a time, keeping input order
async fn resolve_all(
    resolver: &Resolver,
    query: &Query,
    identifiers: &[String],
    concurrency: usize,
) -> anyhow::Result<Vec<ResolutionOutcome>> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(identifiers.len());

    for identifier in identifiers {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .context("resolution semaphore closed")?;
        let resolver = resolver.clone();
        let query = query.clone();
        let identifier = identifier.clone();

        handles.push(tokio::spawn(async move {
            let started = Instant::now();
            let status = match resolve_one(&resolver, &query, &identifier).await {
                Ok(Some(resolved)) => resolved,
                Ok(None) => ResolutionStatus::NotFound,
                Err(error) => ResolutionStatus::Error {
                    message: error.to_string(),
                },
            };
            drop(permit);
            ResolutionOutcome::new(identifier, status, started.elapsed())
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in futures::future::join_all(handles).await {
        outcomes.push(handle.context("resolution task panicked")?);
    }
    Ok(outcomes)
}

async fn resolve_one(
    resolver: &Resolver,
    query: &Query,
    identifier: &str,
) -> ResolverResult<Option<ResolutionStatus>> {
    let public_id = query.public_id.as_deref();

    let status = match query.mode {
        ResolveMode::Entity => resolver
            .resolve_entity(public_id, Some(identifier))
            .await?
            .map(resolved_status),
        ResolveMode::Schema => resolver
            .resolve_schema(public_id, Some(identifier))
            .await?
            .map(resolved_status),
        ResolveMode::Uri => resolver
            .resolve(identifier, query.base_uri.as_deref())
            .await?
            .map(|document| resolved_status(document.source)),
        ResolveMode::Resource => {
            let mut request = ResolutionRequest::new(identifier)
                .with_kind("http://www.w3.org/2001/XMLSchema");
            if let Some(namespace) = &query.namespace {
                request = request.with_namespace(namespace.clone());
            }
            if let Some(public_id) = public_id {
                request = request.with_public_id(public_id);
            }
            if let Some(base_uri) = &query.base_uri {
                request = request.with_base_uri(base_uri.clone());
            }
            resolver
                .resolve_resource(&request)
                .await?
                .map(|input| ResolutionStatus::Resolved {
                    system_id: input.system_id.unwrap_or_default(),
                    public_id: input.public_id,
                    encoding: input.encoding,
                })
        }
    };

    Ok(status)
}

fn resolved_status(source: ResolvedSource) -> ResolutionStatus {
    ResolutionStatus::Resolved {
        system_id: source.system_id().to_string(),
        public_id: source.public_id().map(str::to_string),
        encoding: source.encoding().map(str::to_string),
    }
}
