//! REST adapter for a PostgREST-style hosted backend.
//!
//! The HTTP library is abstracted via [`HttpClient`] so the host picks it
//! (reqwest, hyper, a platform bridge) and tests can script responses.

use crate::error::RemoteError;
use crate::remote::{Identity, OrgContext, RemoteStore};
use async_trait::async_trait;
use hsesync_model::{Collection, Document};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// Uppercase method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// A request handed to the [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL including query.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response from the [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// True for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Errors are
/// for requests that got no response at all; non-2xx responses are `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

#[derive(Deserialize)]
struct UserBody {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ProfileRow {
    #[serde(default)]
    organization_id: Option<String>,
}

/// [`RemoteStore`] over a PostgREST-style REST API.
///
/// - `POST /rest/v1/{collection}` creates
/// - `PATCH /rest/v1/{collection}?id=eq.{id}` updates
/// - `DELETE /rest/v1/{collection}?id=eq.{id}` deletes
/// - `GET /auth/v1/user` resolves the session
/// - `GET /rest/v1/profiles?id=eq.{uid}&select=organization_id` resolves
///   the organization
///
/// Every request carries the project API key; requests made with a session
/// also carry it as a bearer token.
pub struct RestRemote<C: HttpClient> {
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> RestRemote<C> {
    /// Creates an adapter without a session.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: RwLock::new(None),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sets the session token obtained by the host's sign-in flow.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write() = Some(token.into());
    }

    /// Drops the session.
    pub fn clear_access_token(&self) {
        *self.access_token.write() = None;
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn table_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection)
    }

    fn row_url(&self, collection: &str, id: &str) -> String {
        format!("{}?id=eq.{}", self.table_url(collection), urlencoding::encode(id))
    }

    fn headers(&self) -> Vec<(String, String)> {
        let bearer = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.api_key.clone());
        vec![
            ("apikey".to_string(), self.api_key.clone()),
            ("Authorization".to_string(), format!("Bearer {bearer}")),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }

    async fn call(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> Result<HttpResponse, RemoteError> {
        let mut headers = self.headers();
        headers.extend(extra.iter().map(|(n, v)| (n.to_string(), v.to_string())));
        let body = body
            .map(|v| serde_json::to_vec(&v))
            .transpose()
            .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;

        let request = HttpRequest {
            method,
            url,
            headers,
            body,
        };
        let response = match self.client.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.set_error(&e);
                return Err(RemoteError::transport(e));
            }
        };
        if !response.is_success() {
            let message = String::from_utf8_lossy(&response.body).into_owned();
            self.set_error(&message);
            return Err(RemoteError::status(response.status, message));
        }
        self.clear_error();
        Ok(response)
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }
}

fn parse<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, RemoteError> {
    serde_json::from_slice(body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl<C: HttpClient> RemoteStore for RestRemote<C> {
    async fn create(
        &self,
        collection: Collection,
        record: Document,
    ) -> Result<Document, RemoteError> {
        let response = self
            .call(
                Method::Post,
                self.table_url(collection.name()),
                Some(record.clone().into_value()),
                &[("Prefer", "return=representation")],
            )
            .await?;
        if response.body.is_empty() {
            return Ok(record);
        }
        // PostgREST answers with an array of the inserted rows.
        let row = match parse::<Value>(&response.body)? {
            Value::Array(rows) => match rows.into_iter().next() {
                Some(row) => row,
                None => return Ok(record),
            },
            row => row,
        };
        Document::from_value(row).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<(), RemoteError> {
        self.call(
            Method::Patch,
            self.row_url(collection.name(), id),
            Some(patch.into_value()),
            &[],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), RemoteError> {
        self.call(Method::Delete, self.row_url(collection.name(), id), None, &[])
            .await?;
        Ok(())
    }

    async fn current_identity(&self) -> Result<Option<Identity>, RemoteError> {
        if self.access_token.read().is_none() {
            return Ok(None);
        }
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = match self.call(Method::Get, url, None, &[]).await {
            Ok(response) => response,
            Err(RemoteError::Status { status: 401 | 403, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let user: UserBody = parse(&response.body)?;
        Ok(Some(Identity {
            user_id: user.id,
            email: user.email,
        }))
    }

    async fn lookup_context(&self, identity: &Identity) -> Result<Option<OrgContext>, RemoteError> {
        let url = format!(
            "{}?id=eq.{}&select=organization_id",
            self.table_url("profiles"),
            urlencoding::encode(&identity.user_id)
        );
        let response = self.call(Method::Get, url, None, &[]).await?;
        let rows: Vec<ProfileRow> = parse(&response.body)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.organization_id)
            .filter(|id| !id.is_empty())
            .map(OrgContext::new))
    }
}
