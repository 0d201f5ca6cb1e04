use reqwest::Client as HttpClient;
use serde_json::Value;
use url::Url;

use crate::api::models::{
    normalize_conversation, normalize_message, parse_page, Conversation, Message, Page, SendRequest,
};
use crate::error::{Result, SyncError};

/// REST side of the dashboard backend.
#[derive(Clone)]
pub struct ApiClient {
    pub http: HttpClient,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(),
            base_url: Url::parse(base_url.trim_end_matches('/'))?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Config(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_page(mut url: Url, page: u32, limit: u32) -> Url {
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &limit.to_string());
        url
    }

    /// Reads the body as text first so that error statuses with a JSON or
    /// plain-text explanation both surface a useful message.
    async fn read_json(resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let text = resp.text().await?;
        let data = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(v) => Some(v),
                Err(_) if status.is_success() => {
                    return Err(SyncError::MalformedResponse("invalid JSON response".into()));
                }
                Err(_) => None,
            }
        };

        if !status.is_success() {
            let message = data
                .as_ref()
                .and_then(|d| d.get("message").or_else(|| d.get("error")))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| (!text.trim().is_empty()).then(|| text.clone()))
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| format!("Request failed ({})", status.as_u16()));
            return Err(SyncError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(data.unwrap_or_else(|| Value::Object(Default::default())))
    }

    async fn get(&self, url: Url) -> Result<Value> {
        log::debug!("GET {url}");
        let resp = self
            .http
            .get(url)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| SyncError::NetworkFailure(e.to_string()))?;
        Self::read_json(resp).await
    }

    /// `GET /api/conversations?page&limit`
    pub async fn conversations(&self, page: u32, limit: u32) -> Result<Page<Conversation>> {
        let url = Self::with_page(self.endpoint(&["api", "conversations"])?, page, limit);
        let json = self.get(url).await?;
        parse_page(&json, page, limit, normalize_conversation)
            .ok_or_else(|| SyncError::MalformedResponse("conversation list missing data".into()))
    }

    /// `GET /api/conversations/search?q&page&limit`
    pub async fn search_conversations(
        &self,
        query: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<Conversation>> {
        let mut url = self.endpoint(&["api", "conversations", "search"])?;
        let query = query.trim();
        if !query.is_empty() {
            url.query_pairs_mut().append_pair("q", query);
        }
        let json = self.get(Self::with_page(url, page, limit)).await?;
        parse_page(&json, page, limit, normalize_conversation)
            .ok_or_else(|| SyncError::MalformedResponse("search results missing data".into()))
    }

    /// `GET /api/messages/{conversationId}?page&limit`
    pub async fn messages(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
        local_identity: &str,
    ) -> Result<Page<Message>> {
        if conversation_id.is_empty() {
            return Err(SyncError::Config("conversationId is required".into()));
        }
        let url = Self::with_page(
            self.endpoint(&["api", "messages", conversation_id])?,
            page,
            limit,
        );
        let json = self.get(url).await?;
        parse_page(&json, page, limit, |item| {
            normalize_message(item, Some(conversation_id), local_identity)
        })
        .ok_or_else(|| SyncError::MalformedResponse("message list missing data".into()))
    }

    /// `POST /api/messages`. The echo is always the local user's own message.
    pub async fn send_message(&self, request: &SendRequest, local_identity: &str) -> Result<Message> {
        let url = self.endpoint(&["api", "messages"])?;
        log::debug!("POST {url} channel={}", request.channel_id);
        let resp = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| SyncError::NetworkFailure(e.to_string()))?;
        let json = Self::read_json(resp).await?;
        let item = json.get("data").filter(|d| d.is_object()).unwrap_or(&json);
        let mut message = normalize_message(item, Some(&request.channel_id), local_identity)
            .ok_or_else(|| SyncError::MalformedResponse("sent message echo without id".into()))?;
        message.is_own = true;
        if message.body.is_empty() {
            message.body = request.text.clone();
        }
        Ok(message)
    }
}
