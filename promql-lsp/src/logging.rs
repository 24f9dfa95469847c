//! Log output for the server binary
//!
//! Logs always go to stderr; stdout carries the LSP stream. `RUST_LOG` takes precedence over
//! the configured defaults.

use promql_config::{LogFormat, RpcTrace};
use tracing_subscriber::EnvFilter;

/// The filter used when `RUST_LOG` is not set.
pub fn default_directives(rpc_trace: RpcTrace) -> String {
    match rpc_trace {
        RpcTrace::Off => "info".to_string(),
        RpcTrace::Messages => "info,tower_lsp=debug".to_string(),
        RpcTrace::Verbose => "info,tower_lsp=trace".to_string(),
    }
}

pub fn init(format: LogFormat, rpc_trace: RpcTrace) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(rpc_trace)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // A subscriber installed earlier (tests, embedding) wins.
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_trace_raises_tower_lsp_verbosity() {
        assert_eq!(default_directives(RpcTrace::Off), "info");
        assert!(default_directives(RpcTrace::Verbose).contains("tower_lsp=trace"));
        for trace in [RpcTrace::Off, RpcTrace::Messages, RpcTrace::Verbose] {
            assert!(EnvFilter::try_new(default_directives(trace)).is_ok());
        }
    }
}
