//! Main language server implementation

use std::sync::Arc;

use crate::error::{CacheError, MetadataError, ServiceError};
use crate::metadata::RefreshObserver;
use crate::service::{DefaultFeatureProvider, FeatureProvider, LanguageService};
use promql_analysis::{CancellationToken, MetadataSnapshot};
use serde::Deserialize;
use tower_lsp::async_trait;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::{
    CompletionOptions, CompletionParams, CompletionResponse, Diagnostic,
    DidChangeConfigurationParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, Hover, HoverParams, HoverProviderCapability, InitializeParams,
    InitializeResult, InitializedParams, MessageType, ServerCapabilities, ServerInfo,
    TextDocumentItem, TextDocumentSyncCapability, TextDocumentSyncKind, Url,
};
use tower_lsp::Client;
use tracing::{debug, info, warn};

pub const TRIGGER_CHARACTERS: [&str; 6] = ["{", ",", "=", "\"", "(", " "];

/// The editor side of the connection.
#[async_trait]
pub trait LspClient: Send + Sync + Clone + 'static {
    async fn publish_diagnostics(
        &self,
        uri: Url,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    );
    async fn log_message(&self, kind: MessageType, message: String);
    async fn show_message(&self, kind: MessageType, message: String);
}

#[async_trait]
impl LspClient for Client {
    async fn publish_diagnostics(
        &self,
        uri: Url,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    ) {
        Client::publish_diagnostics(self, uri, diagnostics, version).await;
    }

    async fn log_message(&self, kind: MessageType, message: String) {
        Client::log_message(self, kind, message).await;
    }

    async fn show_message(&self, kind: MessageType, message: String) {
        Client::show_message(self, kind, message).await;
    }
}

/// Forwards metadata refresh failures to the editor.
struct ClientObserver<C> {
    client: C,
}

impl<C: LspClient> RefreshObserver for ClientObserver<C> {
    fn refreshed(&self, snapshot: &MetadataSnapshot) {
        let client = self.client.clone();
        let message = format!(
            "Loaded metadata for {} metrics",
            snapshot.metric_names().count()
        );
        tokio::spawn(async move { client.log_message(MessageType::INFO, message).await });
    }

    fn failed(&self, error: &MetadataError) {
        warn!(%error, "metadata refresh failed");
        let client = self.client.clone();
        let message = format!("Failed to update metadata: {error}");
        tokio::spawn(async move {
            client.log_message(MessageType::ERROR, message.clone()).await;
            client.show_message(MessageType::WARNING, message).await;
        });
    }
}

/// `workspace/didChangeConfiguration` payload.
#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default)]
    promql: PromqlSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromqlSettings {
    url: Option<String>,
    metadata_lookback_interval: Option<String>,
}

pub struct PromqlLanguageServer<C = Client, P = DefaultFeatureProvider> {
    client: C,
    service: Arc<LanguageService<P>>,
    shutdown: CancellationToken,
}

impl<C, P> PromqlLanguageServer<C, P>
where
    C: LspClient,
    P: FeatureProvider,
{
    /// `shutdown` is cancelled when the editor asks the server to shut down.
    pub fn new(client: C, service: Arc<LanguageService<P>>, shutdown: CancellationToken) -> Self {
        service.metadata().set_observer(Arc::new(ClientObserver {
            client: client.clone(),
        }));
        Self {
            client,
            service,
            shutdown,
        }
    }

    pub fn service(&self) -> &Arc<LanguageService<P>> {
        &self.service
    }

    async fn publish(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: i32) {
        self.client
            .publish_diagnostics(uri, diagnostics, Some(version))
            .await;
    }

    async fn apply_settings(&self, settings: PromqlSettings) {
        if let Some(interval) = settings.metadata_lookback_interval {
            match promql_config::parse_interval("metadataLookbackInterval", &interval) {
                Ok(lookback) => self.service.metadata().set_lookback(lookback),
                Err(error) => {
                    warn!(%error, "ignoring metadata lookback interval");
                    self.client
                        .show_message(MessageType::ERROR, error.to_string())
                        .await;
                }
            }
        }

        if let Some(url) = settings.url {
            let metadata = self.service.metadata().clone();
            let client = self.client.clone();
            // The first refresh talks to the network; the notification does not wait for it.
            tokio::spawn(async move {
                if let Err(error @ MetadataError::InvalidUrl(_)) =
                    metadata.change_source(&url).await
                {
                    warn!(%error, "ignoring prometheus url");
                    client.show_message(MessageType::ERROR, error.to_string()).await;
                }
            });
        }
    }
}

fn request_error(error: ServiceError) -> Error {
    Error::invalid_params(error.to_string())
}

#[async_trait]
impl<C, P> tower_lsp::LanguageServer for PromqlLanguageServer<C, P>
where
    C: LspClient,
    P: FeatureProvider,
{
    async fn initialize(&self, _: InitializeParams) -> Result<InitializeResult> {
        let capabilities = ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            completion_provider: Some(CompletionOptions {
                trigger_characters: Some(
                    TRIGGER_CHARACTERS.iter().map(|c| c.to_string()).collect(),
                ),
                ..CompletionOptions::default()
            }),
            ..ServerCapabilities::default()
        };

        Ok(InitializeResult {
            capabilities,
            server_info: Some(ServerInfo {
                name: "promql-langserver".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("client initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let TextDocumentItem {
            uri,
            language_id,
            version,
            text,
        } = params.text_document;
        match self
            .service
            .open(uri.clone(), version, Some(&language_id), text)
            .await
        {
            Ok(document) => {
                let diagnostics = self.service.document_diagnostics(&document);
                self.publish(uri, diagnostics, version).await;
            }
            Err(error) => debug!(%error, "document was not opened"),
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        match self.service.change(&uri, version, change.text).await {
            Ok(document) => {
                let diagnostics = self.service.document_diagnostics(&document);
                self.publish(uri, diagnostics, version).await;
            }
            Err(CacheError::Cancelled(_)) => debug!(%uri, version, "change superseded"),
            Err(error) => warn!(%error, "ignoring document change"),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Err(error) = self.service.close(&uri).await {
            warn!(%error, "closing unknown document");
        }
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        match serde_json::from_value::<Settings>(params.settings) {
            Ok(settings) => self.apply_settings(settings.promql).await,
            Err(error) => warn!(%error, "ignoring malformed settings"),
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params;
        self.service
            .hover(&position.text_document.uri, position.position)
            .await
            .map_err(request_error)
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = params.text_document_position;
        let list = self
            .service
            .completion(&position.text_document.uri, position.position)
            .await
            .map_err(request_error)?;
        Ok(Some(CompletionResponse::List(list)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataService;
    use promql_config::DEFAULT_INTERVAL;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower_lsp::lsp_types::{
        CompletionContext, CompletionTriggerKind, HoverContents, Position,
        TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentPositionParams,
        VersionedTextDocumentIdentifier,
    };
    use tower_lsp::LanguageServer;

    type Published = Vec<(Url, Vec<Diagnostic>, Option<i32>)>;

    #[derive(Clone, Default)]
    struct RecordingClient {
        published: Arc<Mutex<Published>>,
        shown: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LspClient for RecordingClient {
        async fn publish_diagnostics(
            &self,
            uri: Url,
            diagnostics: Vec<Diagnostic>,
            version: Option<i32>,
        ) {
            self.published
                .lock()
                .unwrap()
                .push((uri, diagnostics, version));
        }

        async fn log_message(&self, _kind: MessageType, _message: String) {}

        async fn show_message(&self, _kind: MessageType, message: String) {
            self.shown.lock().unwrap().push(message);
        }
    }

    fn server() -> (PromqlLanguageServer<RecordingClient>, RecordingClient, CancellationToken) {
        let client = RecordingClient::default();
        let metadata = Arc::new(MetadataService::new(DEFAULT_INTERVAL, DEFAULT_INTERVAL));
        let service = Arc::new(LanguageService::new(metadata));
        let shutdown = CancellationToken::new();
        let server = PromqlLanguageServer::new(client.clone(), service, shutdown.clone());
        (server, client, shutdown)
    }

    fn uri() -> Url {
        Url::parse("file:///query.promql").unwrap()
    }

    async fn open(server: &PromqlLanguageServer<RecordingClient>, text: &str) {
        server
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri(),
                    language_id: "promql".into(),
                    version: 1,
                    text: text.into(),
                },
            })
            .await;
    }

    async fn change(server: &PromqlLanguageServer<RecordingClient>, version: i32, text: &str) {
        server
            .did_change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri(),
                    version,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text: text.into(),
                }],
            })
            .await;
    }

    fn position(line: u32, character: u32) -> TextDocumentPositionParams {
        TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri() },
            position: Position::new(line, character),
        }
    }

    #[tokio::test]
    async fn initialize_advertises_completion_triggers() {
        let (server, _, _) = server();
        let result = server
            .initialize(InitializeParams::default())
            .await
            .unwrap();
        let triggers = result
            .capabilities
            .completion_provider
            .and_then(|options| options.trigger_characters)
            .unwrap();
        assert_eq!(triggers, vec!["{", ",", "=", "\"", "(", " "]);
        assert_eq!(
            result.capabilities.text_document_sync,
            Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL))
        );
    }

    #[tokio::test]
    async fn diagnostics_are_published_on_open_change_and_close() {
        let (server, client, _) = server();
        open(&server, "rate(http_requests_total[5m])").await;
        change(&server, 2, "rate(http_requests_total[5m]").await;
        server
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri() },
            })
            .await;

        let published = client.published.lock().unwrap();
        assert_eq!(published.len(), 3);
        assert!(published[0].1.is_empty());
        assert_eq!(published[0].2, Some(1));
        assert_eq!(published[1].1.len(), 1);
        assert_eq!(published[1].2, Some(2));
        assert!(published[2].1.is_empty());
    }

    #[tokio::test]
    async fn stale_changes_publish_nothing() {
        let (server, client, _) = server();
        open(&server, "up").await;
        change(&server, 1, "up +").await;
        assert_eq!(client.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hover_describes_the_metric() {
        let (server, _, _) = server();
        open(&server, "up").await;
        let hover = server
            .hover(HoverParams {
                text_document_position_params: position(0, 1),
                work_done_progress_params: Default::default(),
            })
            .await
            .unwrap()
            .unwrap();
        let HoverContents::Markup(markup) = hover.contents else {
            panic!("expected markdown");
        };
        assert!(markup.value.contains("up"));
    }

    #[tokio::test]
    async fn requests_for_unknown_documents_are_invalid_params() {
        let (server, _, _) = server();
        let error = server
            .hover(HoverParams {
                text_document_position_params: position(0, 0),
                work_done_progress_params: Default::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(error.code, tower_lsp::jsonrpc::ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn completion_returns_a_list() {
        let (server, _, _) = server();
        open(&server, "sum(rat").await;
        let response = server
            .completion(CompletionParams {
                text_document_position: position(0, 7),
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
                context: Some(CompletionContext {
                    trigger_kind: CompletionTriggerKind::INVOKED,
                    trigger_character: None,
                }),
            })
            .await
            .unwrap()
            .unwrap();
        let CompletionResponse::List(list) = response else {
            panic!("expected a completion list");
        };
        assert_eq!(list.items[0].label, "rate");
        // No metadata has been loaded yet.
        assert!(list.is_incomplete);
    }

    #[tokio::test]
    async fn invalid_settings_are_reported_to_the_user() {
        let (server, client, _) = server();
        server
            .did_change_configuration(DidChangeConfigurationParams {
                settings: serde_json::json!({
                    "promql": { "url": "ftp://nope", "metadataLookbackInterval": "soon" }
                }),
            })
            .await;
        // The url is applied on a background task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let shown = client.shown.lock().unwrap();
        assert_eq!(shown.len(), 2);
        assert_eq!(
            server.service().metadata().source().lookback,
            DEFAULT_INTERVAL
        );
    }

    #[tokio::test]
    async fn lookback_setting_is_applied() {
        let (server, _, _) = server();
        server
            .did_change_configuration(DidChangeConfigurationParams {
                settings: serde_json::json!({ "promql": { "metadataLookbackInterval": "1h" } }),
            })
            .await;
        assert_eq!(
            server.service().metadata().source().lookback,
            Duration::from_secs(3600)
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_background_work() {
        let (server, _, shutdown) = server();
        server.shutdown().await.unwrap();
        assert!(shutdown.is_cancelled());
    }
}
