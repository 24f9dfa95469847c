//! Command-line entry point for the PromQL language server
//!
//! Usage:
//!   promql-langserver [--config-file `<path>`] [--rest-api-port `<port>`]
//!
//! With a non-zero REST API port the HTTP adapter is served, otherwise LSP on stdin/stdout.

use clap::{value_parser, Arg, Command};
use promql_analysis::CancellationToken;
use promql_config::{Loader, ServerConfig};
use promql_lsp::{logging, rest, LanguageService, MetadataService, PromqlLanguageServer};
use std::sync::Arc;
use tower_lsp::{LspService, Server};

#[tokio::main]
async fn main() {
    let matches = Command::new("promql-langserver")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Language server for PromQL queries and Prometheus rule files")
        .arg(
            Arg::new("config-file")
                .long("config-file")
                .help("YAML configuration file"),
        )
        .arg(
            Arg::new("rest-api-port")
                .long("rest-api-port")
                .help("Serve the HTTP API on this port instead of LSP on stdin/stdout")
                .value_parser(value_parser!(u16)),
        )
        .get_matches();

    let config = load_config(
        matches.get_one::<String>("config-file").map(String::as_str),
        matches.get_one::<u16>("rest-api-port").copied(),
    )
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    logging::init(config.log_format, config.rpc_trace);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting promql-langserver");

    let shutdown = CancellationToken::new();
    let metadata = Arc::new(MetadataService::new(
        config.metadata_lookback_interval,
        config.metadata_refresh_interval,
    ));
    if let Some(url) = &config.prometheus_url {
        // The refresh loop fetches from it once started.
        if let Err(error) = metadata.set_source(url.as_str()) {
            eprintln!("Configuration error: {}", error);
            std::process::exit(1);
        }
    }
    let service = Arc::new(
        LanguageService::new(metadata.clone())
            .with_max_completion_items(config.max_completion_items),
    );

    if config.rest_api_port != 0 {
        tokio::spawn(metadata.run(shutdown.clone()));
        let serve = rest::serve(service, config.rest_api_port, shutdown.clone());
        tokio::select! {
            result = serve => {
                if let Err(error) = result {
                    tracing::error!(%error, "HTTP API stopped");
                    std::process::exit(1);
                }
            }
            _ = tokio::signal::ctrl_c() => shutdown.cancel(),
        }
        return;
    }

    let (lsp, socket) = {
        let shutdown = shutdown.clone();
        LspService::new(move |client| PromqlLanguageServer::new(client, service, shutdown))
    };
    // Started after the observer is installed so refresh failures reach the editor.
    tokio::spawn(metadata.run(shutdown.clone()));
    Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
        .serve(lsp)
        .await;
    shutdown.cancel();
    tracing::info!("promql-langserver stopped");
}

fn load_config(
    path: Option<&str>,
    rest_api_port: Option<u16>,
) -> Result<ServerConfig, promql_config::ConfigError> {
    let mut loader = Loader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader = loader.with_env();
    if let Some(port) = rest_api_port {
        loader = loader.set_override("rest_api_port", u64::from(port))?;
    }
    loader.build()
}
