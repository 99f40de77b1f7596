//! Routes classified messages to connection calls and sends replies.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bridge_core::{Message, MessageMetadata};
use tower::Service;
use tracing::{debug, info, warn};

use super::classify::classify;
use super::operation::{unknown_operation_response, Command, DispatchError, UPLOAD_FILE_NAME};
use crate::connection::ConnectionFactory;
use crate::lifecycle::AdapterStatus;
use crate::transport::{ReplyTransport, ScopedSession};

type DispatchFuture = Pin<Box<dyn Future<Output = Result<String, DispatchError>> + Send>>;

// ---------------------------------------------------------------------------
// MessageDispatcher
// ---------------------------------------------------------------------------

/// Consumes inbound messages and routes each to the matching operation.
///
/// Stateless between messages and safe to call concurrently; clones share
/// the same factory and reply transport. Nothing is written to the audit
/// trail on this path.
#[derive(Clone)]
pub struct MessageDispatcher {
    factory: ConnectionFactory,
    replies: Option<Arc<dyn ReplyTransport>>,
    status: Option<Arc<AdapterStatus>>,
}

impl MessageDispatcher {
    #[must_use]
    pub fn new(factory: ConnectionFactory) -> Self {
        Self {
            factory,
            replies: None,
            status: None,
        }
    }

    /// Sets the transport replies are sent through.
    #[must_use]
    pub fn with_replies(mut self, transport: Arc<dyn ReplyTransport>) -> Self {
        self.replies = Some(transport);
        self
    }

    /// Ties message handling to the adapter: messages are refused unless it
    /// is ready, and each dispatch counts as in flight.
    #[must_use]
    pub fn with_status(mut self, status: Arc<AdapterStatus>) -> Self {
        self.status = Some(status);
        self
    }

    /// Runs the operation named by `tag` and returns the response text.
    ///
    /// Unknown tags produce `"Unknown operation: <tag>"` and never fail.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Deserialize` for a malformed body,
    /// `DispatchError::Pool` if no connection is available, and
    /// `DispatchError::Remote` if the remote call fails.
    pub async fn dispatch(
        &self,
        tag: &str,
        payload: &[u8],
        metadata: &MessageMetadata,
    ) -> Result<String, DispatchError> {
        let command = match classify(tag, payload, metadata) {
            Ok(command) => command,
            Err(err) => {
                record_outcome(tag_label(tag), false);
                return Err(err);
            }
        };
        let label = command.label();
        let result = self.execute(command).await;
        record_outcome(label, result.is_ok());
        result
    }

    /// Handles one transport message: dispatches it, then sends the
    /// response to the reply destination if one is present.
    ///
    /// # Errors
    ///
    /// Any dispatch or reply failure; the transport's redelivery policy
    /// decides what happens next.
    pub async fn on_message(&self, message: Message) -> Result<String, DispatchError> {
        let _in_flight = match &self.status {
            Some(status) => Some(status.admit().ok_or(DispatchError::Unavailable)?),
            None => None,
        };

        let tag = message.operation.as_deref().unwrap_or_default();
        let response = self.dispatch(tag, &message.body, &message.metadata).await?;

        match message.metadata.reply_to.as_deref() {
            Some(destination) => self.send_reply(destination, &message.reply(&response)).await?,
            None => debug!(message_id = %message.id, "no reply destination; response dropped"),
        }
        Ok(response)
    }

    async fn execute(&self, command: Command) -> Result<String, DispatchError> {
        match command {
            Command::Upload { content } => {
                let pooled = self.factory.get_connection().await?;
                let id = pooled.connection()?.upload(UPLOAD_FILE_NAME, &content).await?;
                info!(operation = "upload", file_id = %id, bytes = content.len(), "file uploaded");
                Ok(format!("File uploaded with ID: {id}"))
            }
            Command::CreateSheet(request) => {
                let pooled = self.factory.get_connection().await?;
                let id = pooled.connection()?.create_sheet(&request).await?;
                info!(operation = "createSheet", sheet_id = %id, "sheet created");
                Ok(format!("Sheet created with ID: {id}"))
            }
            Command::CreateSheetWithData { request, contents } => {
                let pooled = self.factory.get_connection().await?;
                let id = pooled
                    .connection()?
                    .create_sheet_with_data(&request, &contents)
                    .await?;
                info!(operation = "createSheet", sheet_id = %id, rows = contents.rows.len(), "sheet created with data");
                Ok(format!("Sheet created with ID: {id}"))
            }
            Command::CreateForm { request, user_id } => {
                let pooled = self.factory.get_connection().await?;
                let id = pooled.connection()?.create_form(&request, user_id).await?;
                info!(operation = "createForm", form_id = %id, user_id, "form created");
                Ok(format!("Form created with ID: {id}"))
            }
            Command::Unknown { tag } => {
                warn!(operation = %tag, "unknown operation");
                Ok(unknown_operation_response(&tag))
            }
        }
    }

    async fn send_reply(&self, destination: &str, reply: &Message) -> Result<(), DispatchError> {
        let Some(transport) = &self.replies else {
            warn!(destination, "reply requested but no reply transport is configured");
            return Ok(());
        };
        let reply_error = |source| DispatchError::Reply {
            destination: destination.to_string(),
            source,
        };
        let mut session = ScopedSession::open(transport.as_ref()).map_err(reply_error)?;
        session.send(destination, reply).await.map_err(reply_error)?;
        debug!(destination, "reply sent");
        Ok(())
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("factory", &self.factory)
            .field("replies", &self.replies.is_some())
            .finish_non_exhaustive()
    }
}

impl Service<Message> for MessageDispatcher {
    type Response = String;
    type Error = DispatchError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: Message) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { dispatcher.on_message(message).await })
    }
}

fn tag_label(tag: &str) -> &'static str {
    use super::operation::operation_names::{CREATE_FORM, CREATE_SHEET, UPLOAD};
    match tag {
        UPLOAD => UPLOAD,
        CREATE_SHEET => CREATE_SHEET,
        CREATE_FORM => CREATE_FORM,
        _ => "unknown",
    }
}

fn record_outcome(operation: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("bridge_dispatch_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use bridge_core::{RemoteError, RemoteId};
    use proptest::prelude::*;
    use tower::ServiceExt;

    use super::*;
    use crate::config::PoolConfig;
    use crate::connection::ConnectionPool;
    use crate::remote::loopback::tests::credentials;
    use crate::remote::LoopbackConnector;
    use crate::dispatch::operation::operation_names::{
        CREATE_FORM as CREATE_FORM_TAG, CREATE_SHEET as CREATE_SHEET_TAG, UPLOAD as UPLOAD_TAG,
    };
    use crate::transport::session::tests::RecordingTransport;

    struct Harness {
        dispatcher: MessageDispatcher,
        connector: Arc<LoopbackConnector>,
        pool: ConnectionPool,
    }

    fn harness() -> Harness {
        let connector = Arc::new(LoopbackConnector::new());
        let pool = ConnectionPool::new(
            PoolConfig {
                max_size: 4,
                acquire_timeout: Duration::from_millis(200),
            },
            connector.clone(),
        );
        let factory = ConnectionFactory::new(Arc::new(pool.clone()), credentials("svc@x.test"));
        Harness {
            dispatcher: MessageDispatcher::new(factory),
            connector,
            pool,
        }
    }

    fn id_after<'a>(response: &'a str, prefix: &str) -> &'a str {
        response.strip_prefix(prefix).expect("response prefix")
    }

    #[tokio::test]
    async fn upload_stores_body_under_fixed_name() {
        let h = harness();
        let response = h
            .dispatcher
            .dispatch("upload", b"hello", &MessageMetadata::default())
            .await
            .unwrap();

        let id = id_after(&response, "File uploaded with ID: ");
        let file = h.connector.backend().file(&RemoteId(id.to_string())).unwrap();
        assert_eq!(file.name, UPLOAD_FILE_NAME);
        assert_eq!(file.content, b"hello");
    }

    #[tokio::test]
    async fn create_sheet_reports_remote_id() {
        let h = harness();
        let response = h
            .dispatcher
            .dispatch(
                "createSheet",
                br#"{"googleEmail":"a@b.com","sheetTitle":"Budget"}"#,
                &MessageMetadata::default(),
            )
            .await
            .unwrap();

        assert!(response.contains("Sheet created with ID:"));
        let id = id_after(&response, "Sheet created with ID: ");
        assert!(!id.is_empty());
        let sheet = h.connector.backend().sheet(&RemoteId(id.to_string())).unwrap();
        assert_eq!(sheet.title, "Budget");
        assert_eq!(sheet.owner, "a@b.com");
    }

    #[tokio::test]
    async fn create_form_passes_user_id() {
        let h = harness();
        let metadata = MessageMetadata {
            user_id: Some(17),
            ..MessageMetadata::default()
        };
        let response = h
            .dispatcher
            .dispatch(
                "createForm",
                br#"{"googleEmail":"a@b.com","formTitle":"Survey","fields":{"Name":"text"}}"#,
                &metadata,
            )
            .await
            .unwrap();

        let id = id_after(&response, "Form created with ID: ");
        let form = h.connector.backend().form(&RemoteId(id.to_string())).unwrap();
        assert_eq!(form.user_id, Some(17));
        assert_eq!(form.questions, vec![("Name".to_string(), "text".to_string())]);
    }

    #[tokio::test]
    async fn unknown_tag_gets_textual_response_without_connection() {
        let h = harness();
        let response = h
            .dispatcher
            .dispatch("frobnicate", b"", &MessageMetadata::default())
            .await
            .unwrap();
        assert_eq!(response, "Unknown operation: frobnicate");
        assert_eq!(h.connector.handshakes(), 0);
    }

    #[tokio::test]
    async fn malformed_payload_fails_before_any_remote_call() {
        let h = harness();
        let err = h
            .dispatcher
            .dispatch("createSheet", b"[]", &MessageMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Deserialize { .. }));
        assert_eq!(h.connector.handshakes(), 0);
    }

    #[tokio::test]
    async fn remote_failure_is_propagated_and_connection_returned() {
        let h = harness();
        h.connector
            .backend()
            .fail_next(RemoteError::Service("quota".into()));
        let err = h
            .dispatcher
            .dispatch("upload", b"x", &MessageMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Remote(RemoteError::Service(_))));

        let stats = h.pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test]
    async fn reply_sent_to_destination_and_session_closed() {
        let h = harness();
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = h.dispatcher.with_replies(transport.clone());

        let request = Message::request("frobnicate", Vec::new()).with_reply_to("replies.1");
        let request_id = request.id.clone();
        dispatcher.on_message(request).await.unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "replies.1");
        assert_eq!(sent[0].1.body_text(), "Unknown operation: frobnicate");
        assert_eq!(sent[0].1.metadata.correlation_id.as_deref(), Some(request_id.as_str()));
        assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_reply_destination_sends_nothing() {
        let h = harness();
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = h.dispatcher.with_replies(transport.clone());

        let response = dispatcher
            .on_message(Message::request("upload", b"x".to_vec()))
            .await
            .unwrap();

        assert!(response.starts_with("File uploaded with ID: "));
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_reply_still_closes_session() {
        let h = harness();
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_sends.store(true, Ordering::SeqCst);
        let dispatcher = h.dispatcher.with_replies(transport.clone());

        let err = dispatcher
            .on_message(Message::request("upload", b"x".to_vec()).with_reply_to("gone"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Reply { ref destination, .. } if destination == "gone"));
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refuses_messages_unless_adapter_ready() {
        let h = harness();
        let status = Arc::new(AdapterStatus::new());
        let dispatcher = h.dispatcher.with_status(status.clone());

        let err = dispatcher
            .on_message(Message::request("upload", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unavailable));

        status.set_ready();
        assert!(dispatcher
            .on_message(Message::request("upload", Vec::new()))
            .await
            .is_ok());
        assert_eq!(status.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn drives_as_tower_service() {
        let h = harness();
        let response = h
            .dispatcher
            .oneshot(Message::request("nothing", Vec::new()))
            .await
            .unwrap();
        assert_eq!(response, "Unknown operation: nothing");
    }

    #[tokio::test]
    async fn concurrent_dispatches_share_the_pool() {
        let h = harness();
        let mut handles = Vec::new();
        for i in 0..8 {
            let dispatcher = h.dispatcher.clone();
            handles.push(tokio::spawn(async move {
                let body = format!(r#"{{"googleEmail":"a@b.com","sheetTitle":"S{i}"}}"#);
                dispatcher
                    .dispatch("createSheet", body.as_bytes(), &MessageMetadata::default())
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert!(h.connector.handshakes() <= 4);
        assert_eq!(h.pool.stats().active, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn unrecognized_tags_answer_without_a_connection(
            tag in "\\PC{0,32}",
            body in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            prop_assume!(![UPLOAD_TAG, CREATE_SHEET_TAG, CREATE_FORM_TAG].contains(&tag.as_str()));
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let h = harness();

            let response = runtime
                .block_on(h.dispatcher.dispatch(&tag, &body, &MessageMetadata::default()))
                .unwrap();

            prop_assert_eq!(response, format!("Unknown operation: {tag}"));
            prop_assert_eq!(h.connector.handshakes(), 0);
            prop_assert_eq!(h.pool.stats().total, 0);
        }
    }
}
