//! `route-console`: test routes of a running service from the terminal.
//!
//! Loads the service's route catalogue, sends test requests through the
//! console pipeline and prints whatever comes back. Ctrl-C cancels the
//! request in flight; a second Ctrl-C quits.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console_core::{
    collect_headers, ConsoleConfig, DecodedResponse, FieldMap, FieldType, FieldValue, FilePart, HeaderRow, Hook,
    HookOutcome, HttpMethod, PipelineContext, Preview, ResponseData, RouteMeta, SaveAs, SendOutcome, TestExecutionController,
    TestRequest, UreqTransport,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "route-console")]
#[command(about = "Send test requests to the routes of a running service")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Origin of the service under test, e.g. http://127.0.0.1:3000
    #[arg(long, global = true)]
    url_root: Option<String>,

    /// Path prefix added before every route path
    #[arg(long, global = true)]
    api_prefix: Option<String>,

    /// Log pipeline stages to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the routes in the service's catalogue
    Routes,
    /// Send one test request
    Send {
        method: HttpMethod,
        path: String,

        /// Field as `name=value` or `name:type=value`
        #[arg(short, long = "field")]
        fields: Vec<String>,

        /// File field as `name=path`
        #[arg(long = "file")]
        files: Vec<String>,

        /// Header as `name: value`
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Arguments as a JSON object; `-f` fields are applied on top
        #[arg(long)]
        json: Option<String>,

        /// Take argument types and headers from the catalogue entry for this
        /// method and path
        #[arg(long)]
        catalogue: bool,

        /// Write the response body to this file, or into this directory
        /// under the name the response suggests
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = ConsoleConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(root) = cli.url_root {
        config.url_root = root;
    }
    if let Some(prefix) = cli.api_prefix {
        config.api_prefix = prefix;
    }
    debug!(url_root = %config.url_root, api_prefix = %config.api_prefix, "configuration loaded");

    let transport = Arc::new(UreqTransport::with_body_limit(config.body_limit));
    let context = Arc::new(PipelineContext::new(config));
    context.hooks().on(
        "request",
        Hook::request(|method, url, options| {
            debug!(%method, url, params = options.params.len(), headers = options.headers.len(), "sending");
            HookOutcome::Continue(options)
        }),
    );
    let controller = TestExecutionController::new(context, transport);

    // First Ctrl-C cancels what is in flight; with nothing to cancel, or on
    // a second press, the process exits.
    let ctrl_c = controller.clone();
    tokio::spawn(async move {
        let mut interrupted = false;
        while tokio::signal::ctrl_c().await.is_ok() {
            let cancelled = ctrl_c.cancel_all();
            if interrupted || cancelled == 0 {
                std::process::exit(130);
            }
            interrupted = true;
            info!(cancelled, "interrupted, press Ctrl-C again to quit");
        }
    });

    match cli.command {
        Commands::Routes => {
            for route in load_catalogue(&controller).await? {
                print_route(&route);
            }
            Ok(())
        }
        Commands::Send {
            method,
            path,
            fields,
            files,
            headers,
            json,
            catalogue,
            save,
        } => {
            let url = controller.context().config().route_url(&path);
            let mut request = if catalogue {
                let routes = load_catalogue(&controller).await?;
                let route = routes
                    .iter()
                    .find(|route| route.method == method && route.path.trim_matches('/') == path.trim_matches('/'))
                    .with_context(|| format!("no catalogue entry for {method} {path}"))?;
                TestRequest::for_route(route, url.clone())
            } else {
                TestRequest {
                    method: Some(method),
                    url: url.clone(),
                    ..TestRequest::default()
                }
            };

            request.fields = parse_fields(json.as_deref(), &fields, &files)?;
            let rows = headers
                .iter()
                .map(|header| parse_header(header))
                .collect::<anyhow::Result<Vec<_>>>()?;
            request.headers.extend(collect_headers(&rows));

            let mut delivered = None;
            match controller.send(request, |response| delivered = Some(response)).await {
                SendOutcome::Delivered { .. } => {}
                SendOutcome::TransportFailed => bail!("no response from {url}"),
                SendOutcome::AbortedByHook { phase } => bail!("send aborted by a hook during {phase}"),
                SendOutcome::Cancelled => bail!("send cancelled"),
            }
            let Some(response) = delivered else {
                bail!("no response delivered");
            };

            let preview_limit = controller.context().config().preview_limit;
            print_response(&response, preview_limit)?;
            if let Some(target) = save {
                save_body(&response, &url, &target)?;
            }
            Ok(())
        }
    }
}

async fn load_catalogue(controller: &TestExecutionController<UreqTransport>) -> anyhow::Result<Vec<RouteMeta>> {
    let url = controller.context().config().catalogue_url();
    let request = TestRequest {
        method: Some(HttpMethod::Get),
        url: url.clone(),
        ..TestRequest::default()
    };

    let mut delivered = None;
    controller.send(request, |response| delivered = Some(response)).await;
    let response = delivered.with_context(|| format!("no response from {url}"))?;
    if !response.is_success() {
        bail!("catalogue request failed: {} {}", response.status, response.status_text);
    }
    let ResponseData::Json(routes) = response.data else {
        bail!("catalogue at {url} is not JSON");
    };
    serde_json::from_value(routes).context("reading route catalogue")
}

fn print_route(route: &RouteMeta) {
    let name = match (&route.module, &route.name) {
        (Some(module), Some(name)) => format!("{module}.{name}"),
        (None, Some(name)) => name.clone(),
        _ => String::new(),
    };
    println!("{:<6} {:<24} {name}", route.method, route.path);
    for arg in &route.arguments {
        let kind = arg.field_type();
        if arg.is_variable {
            println!("         **{} ({})", arg.name, kind.as_str());
        } else if arg.has_default {
            println!("         {}: {} = {}", arg.name, kind.as_str(), arg.default);
        } else {
            println!("         {}: {}", arg.name, kind.as_str());
        }
    }
}

fn parse_fields(json: Option<&str>, fields: &[String], files: &[String]) -> anyhow::Result<FieldMap> {
    let mut map = match json {
        Some(text) => FieldMap::from_json_args(text)?,
        None => FieldMap::new(),
    };

    for field in fields {
        let (key, value) = field
            .split_once('=')
            .with_context(|| format!("field `{field}` is not name=value"))?;
        let (name, value) = match key.split_once(':') {
            Some((name, kind)) => (name, FieldValue::typed(value, FieldType::from(kind))),
            None => (key, FieldValue::text(value)),
        };
        map.insert(name, value);
    }

    for file in files {
        let (name, path) = file
            .split_once('=')
            .with_context(|| format!("file `{file}` is not name=path"))?;
        let path = Path::new(path);
        let content = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        map.insert(name, FieldValue::file(FilePart::new(filename, guess_content_type(path), content)));
    }
    Ok(map)
}

fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn parse_header(header: &str) -> anyhow::Result<HeaderRow> {
    let (name, value) = header
        .split_once(':')
        .with_context(|| format!("header `{header}` is not name: value"))?;
    Ok(HeaderRow::new(name, value))
}

fn print_response(response: &DecodedResponse, preview_limit: usize) -> anyhow::Result<()> {
    println!(
        "{} {} ({} ms)",
        response.status,
        response.status_text,
        response.elapsed.as_millis()
    );
    for (name, value) in &response.raw_headers {
        println!("{name}: {value}");
    }
    println!();

    match Preview::of(response, preview_limit) {
        Preview::Json(value) => println!("{}", serde_json::to_string_pretty(value)?),
        Preview::Html(text) | Preview::Text(text) => println!("{text}"),
        Preview::Image(_) => println!("[{} image, {} bytes; use --save to keep it]", response.media_type(), response.body.len()),
        Preview::TooLarge => println!("[{} bytes, too large to preview; use --save to keep it]", response.body.len()),
        Preview::Unsupported => println!("[{} body, {} bytes; use --save to keep it]", response.media_type(), response.body.len()),
    }
    Ok(())
}

fn save_body(response: &DecodedResponse, url: &str, target: &Path) -> anyhow::Result<()> {
    let path = if target.is_dir() {
        target.join(SaveAs::of(response, url).filename)
    } else {
        target.to_path_buf()
    };
    std::fs::write(&path, &response.body).with_context(|| format!("writing {}", path.display()))?;
    eprintln!("saved {} bytes to {}", response.body.len(), path.display());
    Ok(())
}
