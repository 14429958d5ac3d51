//! Blocking client for the Elasticsearch REST API.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value as Json};

use crate::client::{DocumentClient, Hit};
use crate::error::{SearchError, SearchResult};

/// [`DocumentClient`] talking to an Elasticsearch cluster over HTTP.
///
/// Writes ask for `refresh=wait_for`, so they are visible to the next
/// search.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    client: Client,
}

impl HttpClient {
    /// Creates a client for the cluster at `base_url`, like
    /// `http://localhost:9200`.
    pub fn new(base_url: impl Into<String>) -> SearchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Creates a client reusing a configured `reqwest` client.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn send(&self, url: &str, request: RequestBuilder) -> SearchResult<(StatusCode, Json)> {
        tracing::trace!(%url, "request");
        let response = request
            .send()
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        let body = if text.is_empty() {
            Json::Null
        } else {
            serde_json::from_str(&text)?
        };
        Ok((status, body))
    }

    fn send_ok(&self, url: &str, request: RequestBuilder) -> SearchResult<Json> {
        let (status, body) = self.send(url, request)?;
        if !status.is_success() {
            return Err(SearchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: body.to_string(),
            });
        }
        Ok(body)
    }
}

fn already_exists(body: &Json) -> bool {
    body["error"]["type"] == "resource_already_exists_exception"
}

impl DocumentClient for HttpClient {
    fn create_index(&self, index: &str, mapping: &Json) -> SearchResult<()> {
        let url = self.url(index);
        let (status, body) = self.send(&url, self.client.put(&url).json(mapping))?;
        if status.is_success() || already_exists(&body) {
            return Ok(());
        }
        Err(SearchError::Status {
            url,
            status: status.as_u16(),
            body: body.to_string(),
        })
    }

    fn index(&self, index: &str, id: &str, document: &Json) -> SearchResult<()> {
        let url = self.url(&format!("{index}/_doc/{id}?refresh=wait_for"));
        self.send_ok(&url, self.client.put(&url).json(document))?;
        Ok(())
    }

    fn update(&self, index: &str, id: &str, partial: &Json) -> SearchResult<()> {
        let url = self.url(&format!("{index}/_update/{id}?refresh=wait_for"));
        self.send_ok(&url, self.client.post(&url).json(&json!({ "doc": partial })))?;
        Ok(())
    }

    fn delete(&self, index: &str, id: &str) -> SearchResult<bool> {
        let url = self.url(&format!("{index}/_doc/{id}?refresh=wait_for"));
        let (status, body) = self.send(&url, self.client.delete(&url))?;
        match status {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(SearchError::Status {
                url,
                status: s.as_u16(),
                body: body.to_string(),
            }),
        }
    }

    fn get(&self, index: &str, id: &str) -> SearchResult<Option<Json>> {
        let url = self.url(&format!("{index}/_doc/{id}"));
        let (status, body) = self.send(&url, self.client.get(&url))?;
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(body.get("_source").cloned()),
            s => Err(SearchError::Status {
                url,
                status: s.as_u16(),
                body: body.to_string(),
            }),
        }
    }

    fn search(&self, index: &str, body: &Json) -> SearchResult<Vec<Hit>> {
        let url = self.url(&format!("{index}/_search"));
        let response: SearchResponse =
            serde_json::from_value(self.send_ok(&url, self.client.post(&url).json(body))?)?;
        Ok(response
            .hits
            .hits
            .into_iter()
            .map(|hit| Hit {
                id: hit.id,
                source: hit.source,
                sort: hit.sort,
            })
            .collect())
    }

    fn count(&self, index: &str, body: &Json) -> SearchResult<usize> {
        let url = self.url(&format!("{index}/_count"));
        let response: CountResponse =
            serde_json::from_value(self.send_ok(&url, self.client.post(&url).json(body))?)?;
        Ok(response.count)
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Json,
    #[serde(default)]
    sort: Vec<Json>,
}

#[derive(Deserialize)]
struct CountResponse {
    count: usize,
}
