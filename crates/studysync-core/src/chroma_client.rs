use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use thiserror::Error;

pub const DEFAULT_TENANT: &str = "default_tenant";
pub const DEFAULT_DATABASE: &str = "default_database";

#[derive(Error, Debug)]
pub enum ChromaError {
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Chroma API error ({status}): {message}")]
    ApiError { status: StatusCode, message: String },
    #[error("Malformed Chroma response: {0}")]
    MalformedResponse(String),
    #[error("Invalid Chroma URL: {0}")]
    InvalidUrl(String),
}

/// Chroma's JSON error body, e.g. `{"error": "NotFoundError", "message": "..."}`.
#[derive(Deserialize, Debug)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize, Debug)]
struct HeartbeatResponse {
    #[serde(rename = "nanosecond heartbeat")]
    nanosecond_heartbeat: u64,
}

/// Records returned by a `get`/peek call. The arrays are parallel to `ids`.
#[derive(Deserialize, Debug, Default)]
pub struct GetResult {
    pub ids: Vec<String>,
    #[serde(default)]
    pub documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Option<Map<String, Value>>>>,
}

impl GetResult {
    pub fn first_document(&self) -> Result<&str, ChromaError> {
        self.documents
            .as_deref()
            .and_then(|docs| docs.first())
            .and_then(|doc| doc.as_deref())
            .ok_or_else(|| {
                ChromaError::MalformedResponse("peek returned no document body".to_string())
            })
    }
}

/// One batch of records for `add`. Every populated field must have the same
/// length as `ids`.
#[derive(Serialize, Debug, Default)]
pub struct AddRecords {
    pub ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadatas: Option<Vec<Map<String, Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<String>>,
}

pub struct ChromaClient {
    client: Client,
    chroma_url: String,
    tenant: String,
    database: String,
}

impl ChromaClient {
    pub fn new(chroma_url: String) -> Self {
        Self::with_scope(chroma_url, DEFAULT_TENANT, DEFAULT_DATABASE)
    }

    pub fn with_scope(chroma_url: String, tenant: &str, database: &str) -> Self {
        Self {
            client: Client::new(),
            chroma_url: chroma_url.trim_end_matches('/').to_string(),
            tenant: tenant.to_string(),
            database: database.to_string(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ChromaError> {
        let mut url = Url::parse(&self.chroma_url)
            .map_err(|e| ChromaError::InvalidUrl(format!("{}: {}", self.chroma_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ChromaError::InvalidUrl(self.chroma_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `.../tenants/{t}/databases/{d}/collections` followed by `rest`, each
    /// segment percent-encoded.
    fn collections_url(&self, rest: &[&str]) -> Result<Url, ChromaError> {
        let mut segments = vec![
            "api",
            "v2",
            "tenants",
            self.tenant.as_str(),
            "databases",
            self.database.as_str(),
            "collections",
        ];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    pub async fn heartbeat(&self) -> Result<u64, ChromaError> {
        let url = self.endpoint(&["api", "v2", "heartbeat"])?;
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let heartbeat: HeartbeatResponse = read_json(response).await?;
        Ok(heartbeat.nanosecond_heartbeat)
    }

    pub async fn get_collection(&self, name: &str) -> Result<Collection, ChromaError> {
        let url = self.collections_url(&[name])?;
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    pub async fn get_or_create_collection(
        &self,
        name: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<Collection, ChromaError> {
        let url = self.collections_url(&[])?;
        tracing::debug!("POST {} (get_or_create {})", url, name);
        let response = self
            .client
            .post(url)
            .json(&json!({
                "name": name,
                "metadata": metadata,
                "get_or_create": true
            }))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn count(&self, collection: &Collection) -> Result<u64, ChromaError> {
        let url = self.collections_url(&[collection.id.as_str(), "count"])?;
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    pub async fn peek(&self, collection: &Collection, limit: usize) -> Result<GetResult, ChromaError> {
        let url = self.collections_url(&[collection.id.as_str(), "get"])?;
        tracing::debug!("POST {} (limit {})", url, limit);
        let response = self
            .client
            .post(url)
            .json(&json!({
                "limit": limit,
                "include": ["documents", "metadatas"]
            }))
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn add(&self, collection: &Collection, records: &AddRecords) -> Result<(), ChromaError> {
        let url = self.collections_url(&[collection.id.as_str(), "add"])?;
        tracing::debug!("POST {} ({} records)", url, records.ids.len());
        let response = self.client.post(url).json(records).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, ChromaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    Err(ChromaError::ApiError {
        status,
        message: api_error_message(&error_text),
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ChromaError> {
    let response = check_status(response).await?;
    Ok(response.json::<T>().await?)
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { message: Some(message), .. }) => message,
        Ok(ErrorBody { error: Some(error), .. }) => error,
        // Raw bodies (HTML from a proxy, plain text) may span several lines
        _ => body.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_prefers_message_field() {
        let body = r#"{"error":"NotFoundError","message":"Collection [studysync_materials] does not exist"}"#;
        assert_eq!(
            api_error_message(body),
            "Collection [studysync_materials] does not exist"
        );
    }

    #[test]
    fn api_error_falls_back_to_raw_body() {
        assert_eq!(api_error_message("  Internal Server Error\n"), "Internal Server Error");
        assert_eq!(api_error_message(r#"{"error":"InvalidArgumentError"}"#), "InvalidArgumentError");
    }

    #[test]
    fn api_error_collapses_multi_line_bodies() {
        assert_eq!(
            api_error_message("<html>\n<body>Not Found</body>\n</html>"),
            "<html> <body>Not Found</body> </html>"
        );
    }

    #[test]
    fn collection_urls_are_scoped() {
        let client = ChromaClient::new("http://localhost:8001/".to_string());
        assert_eq!(
            client.collections_url(&[]).unwrap().as_str(),
            "http://localhost:8001/api/v2/tenants/default_tenant/databases/default_database/collections"
        );

        let scoped = ChromaClient::with_scope("http://chroma:8000".to_string(), "acme", "notes");
        assert_eq!(
            scoped.collections_url(&["c1", "count"]).unwrap().as_str(),
            "http://chroma:8000/api/v2/tenants/acme/databases/notes/collections/c1/count"
        );
    }

    #[test]
    fn collection_names_are_percent_encoded() {
        let client = ChromaClient::new("http://localhost:8001".to_string());
        let url = client.collections_url(&["week 1/notes?draft#2"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8001/api/v2/tenants/default_tenant/databases/default_database/collections/week%201%2Fnotes%3Fdraft%232"
        );
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn unparsable_base_url_is_rejected() {
        let client = ChromaClient::new("localhost:8001".to_string());
        assert!(matches!(
            client.endpoint(&["api", "v2", "heartbeat"]),
            Err(ChromaError::InvalidUrl(_))
        ));
    }

    #[test]
    fn first_document_requires_a_body() {
        let result: GetResult = serde_json::from_value(json!({
            "ids": ["a"],
            "documents": [null],
            "metadatas": [null]
        }))
        .unwrap();
        assert!(matches!(
            result.first_document(),
            Err(ChromaError::MalformedResponse(_))
        ));

        let empty = GetResult::default();
        assert!(empty.first_document().is_err());

        let result: GetResult = serde_json::from_value(json!({
            "ids": ["a", "b"],
            "documents": ["first", "second"]
        }))
        .unwrap();
        assert_eq!(result.first_document().unwrap(), "first");
    }
}
