//! Mock HTTP client for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::http::{HttpClient, HttpError, WebRequest, WebResponse};

/// A handler that produces responses dynamically based on the request.
type RequestHandler = Box<dyn Fn(&WebRequest) -> Option<Result<WebResponse, HttpError>> + Send + Sync>;

/// Mock implementation of the [`HttpClient`] trait.
///
/// Provides controllable behavior for testing:
/// - Queue canned responses served in FIFO order
/// - Track every executed request for assertions
/// - Simulate transport failures
///
/// # Example
///
/// ```rust,ignore
/// use trawler_core::testing::{fixtures, MockHttpClient};
///
/// let http = MockHttpClient::new();
/// http.queue_response(fixtures::html_response("<html>...</html>")).await;
///
/// let response = http.execute(WebRequest::get("https://example.org/")).await?;
/// assert_eq!(response.status, 200);
///
/// let requests = http.recorded_requests().await;
/// assert_eq!(requests.len(), 1);
/// assert_eq!(requests[0].url, "https://example.org/");
/// ```
pub struct MockHttpClient {
    /// Responses served in order, one per request.
    responses: Arc<RwLock<VecDeque<Result<WebResponse, HttpError>>>>,
    /// Every request that reached the client.
    requests: Arc<RwLock<Vec<WebRequest>>>,
    /// Served when the queue is empty.
    default_response: Arc<RwLock<Option<WebResponse>>>,
    /// Consulted before the queue; `None` falls through.
    handler: Arc<RwLock<Option<RequestHandler>>>,
}

impl std::fmt::Debug for MockHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpClient")
            .field("responses", &"<responses>")
            .field("requests", &"<requests>")
            .field("default_response", &"<default_response>")
            .field("handler", &"<handler>")
            .finish()
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHttpClient {
    /// Create a new mock client with nothing queued.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(VecDeque::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
            default_response: Arc::new(RwLock::new(None)),
            handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a mock client with responses queued in order.
    pub fn with_responses(responses: Vec<WebResponse>) -> Self {
        let client = Self::new();
        {
            // The lock is freshly created, try_write cannot fail here.
            let mut queue = client.responses.try_write().unwrap();
            queue.extend(responses.into_iter().map(Ok));
        }
        client
    }

    /// Queue a response to serve for an upcoming request.
    pub async fn queue_response(&self, response: WebResponse) {
        self.responses.write().await.push_back(Ok(response));
    }

    /// Queue a transport failure for an upcoming request.
    pub async fn queue_error(&self, error: HttpError) {
        self.responses.write().await.push_back(Err(error));
    }

    /// Serve this response whenever the queue is empty.
    pub async fn set_default_response(&self, response: WebResponse) {
        *self.default_response.write().await = Some(response);
    }

    /// Route requests through a handler instead of the queue. The handler
    /// returns `None` to fall through to queued responses.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// http.set_handler(|request| {
    ///     if request.url.contains("login.php") {
    ///         Some(Ok(fixtures::html_response("welcome")))
    ///     } else {
    ///         None
    ///     }
    /// }).await;
    /// ```
    pub async fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&WebRequest) -> Option<Result<WebResponse, HttpError>> + Send + Sync + 'static,
    {
        *self.handler.write().await = Some(Box::new(handler));
    }

    /// Every request executed so far.
    pub async fn recorded_requests(&self) -> Vec<WebRequest> {
        self.requests.read().await.clone()
    }

    /// How many requests were executed.
    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Forget recorded requests.
    pub async fn clear_recorded(&self) {
        self.requests.write().await.clear();
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: WebRequest) -> Result<WebResponse, HttpError> {
        let url = request.url.clone();
        self.requests.write().await.push(request.clone());

        if let Some(handler) = self.handler.read().await.as_ref() {
            if let Some(result) = handler(&request) {
                return result;
            }
        }
        if let Some(result) = self.responses.write().await.pop_front() {
            return result;
        }
        if let Some(response) = self.default_response.read().await.clone() {
            return Ok(response);
        }
        Err(HttpError::Transport(format!(
            "no mock response queued for {url}"
        )))
    }
}
