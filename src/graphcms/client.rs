use std::time::Duration;

use reqwest::{header, Client};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        // back off to a char boundary so multibyte bodies can't panic
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("…");
    }
    s
}

#[derive(Debug, Error)]
pub enum GraphCmsError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("graphql errors: {}", messages.join("; "))]
    GraphQl { messages: Vec<String> },
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// How the create mutation references the image asset.
#[derive(Debug, Clone)]
pub enum AssetLink {
    /// Connect an asset previously registered via the upload endpoint.
    Connect { id: String },
    /// Have the CMS create the asset from an already-hosted handle.
    Create { handle: String, file_name: String },
}

/// Input for the `createImage` mutation.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub name: String,
    pub alt: String,
    pub asset: AssetLink,
    pub taxonomy_old_id: i64,
    pub old_id: i64,
    pub body: String,
}

impl NewImage {
    /// GraphQL variable payload for `$data`. Values travel as bound
    /// variables; nothing is interpolated into the query text.
    pub fn to_variables(&self) -> Value {
        let image = match &self.asset {
            AssetLink::Connect { id } => json!({ "connect": { "id": id } }),
            AssetLink::Create { handle, file_name } => {
                json!({ "create": { "handle": handle, "fileName": file_name } })
            }
        };
        json!({
            "name": self.name,
            "alt": self.alt,
            "image": image,
            "taxonomy": { "connect": { "oldId": self.taxonomy_old_id } },
            "oldId": self.old_id,
            "body": self.body,
        })
    }
}

const IMAGE_BY_OLD_ID: &str =
    "query ImageByOldId($oldId: Int!) { image(where: { oldId: $oldId }) { id } }";

const CREATE_IMAGE: &str =
    "mutation CreateImage($data: ImageCreateInput!) { createImage(data: $data) { id } }";

/// Client for the target CMS: the asset upload endpoint plus the GraphQL
/// endpoint, both behind the same bearer token.
#[derive(Clone)]
pub struct GraphCmsClient {
    endpoint: String,
    token: String,
    http: Client,
}

impl std::fmt::Debug for GraphCmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphCmsClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"***")
            .finish_non_exhaustive()
    }
}

impl GraphCmsClient {
    pub fn new(endpoint: &str, token: &str) -> Result<Self, GraphCmsError> {
        let http = Client::builder()
            .user_agent("graphcms-migrate/0.1")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Register an externally hosted image with the CMS asset store.
    /// Returns the opaque asset id.
    pub async fn upload_from_url(&self, image_url: &str) -> Result<String, GraphCmsError> {
        let url = format!("{}/upload", self.endpoint);
        // The endpoint wants a classic form body, charset spelled out.
        let body = format!("url={}", urlencoding::encode(image_url));
        let resp = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, self.bearer())
            .header(
                header::CONTENT_TYPE,
                "application/x-www-form-urlencoded;charset=utf-8",
            )
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(GraphCmsError::Http {
                status: status.as_u16(),
                body: truncate_for_log(text, 2000),
            });
        }

        let parsed: Value = serde_json::from_str(&text)?;
        let asset_id = parsed
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GraphCmsError::Shape("upload response missing 'id'".into()))?;
        info!(asset_id, image_url, "uploaded image");
        Ok(asset_id.to_string())
    }

    /// Look up an already-migrated item by its legacy id.
    pub async fn find_image_by_old_id(&self, old_id: i64) -> Result<Option<String>, GraphCmsError> {
        let data = self
            .graphql(IMAGE_BY_OLD_ID, json!({ "oldId": old_id }))
            .await?;
        Ok(data
            .get("image")
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    /// Create the content item; returns its id.
    pub async fn create_image(&self, image: &NewImage) -> Result<String, GraphCmsError> {
        let data = self
            .graphql(CREATE_IMAGE, json!({ "data": image.to_variables() }))
            .await?;
        data.get("createImage")
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| GraphCmsError::Shape("createImage response missing 'id'".into()))
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, GraphCmsError> {
        debug!(query, %variables, "graphql request");
        let resp = self
            .http
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, self.bearer())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(GraphCmsError::Http {
                status: status.as_u16(),
                body: truncate_for_log(text, 2000),
            });
        }

        let parsed: Value = serde_json::from_str(&text)?;
        if let Some(errs) = parsed.get("errors").and_then(|e| e.as_array()) {
            if !errs.is_empty() {
                let messages: Vec<String> = errs
                    .iter()
                    .map(|err| {
                        err.get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown graphql error")
                            .to_string()
                    })
                    .collect();
                for msg in &messages {
                    warn!(%msg, sample_body = text.get(..200).unwrap_or(&text), "graphql error");
                }
                return Err(GraphCmsError::GraphQl { messages });
            }
        }

        Ok(parsed.get("data").cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> NewImage {
        NewImage {
            name: "Várkert".into(),
            alt: "a \"várkert\" télen".into(),
            asset: AssetLink::Connect { id: "asset-1".into() },
            taxonomy_old_id: 3,
            old_id: 18,
            body: "Hello world".into(),
        }
    }

    #[test]
    fn variables_carry_source_values_verbatim() {
        let vars = sample_image().to_variables();
        assert_eq!(vars["name"], "Várkert");
        assert_eq!(vars["alt"], "a \"várkert\" télen");
        assert_eq!(vars["image"]["connect"]["id"], "asset-1");
        assert_eq!(vars["taxonomy"]["connect"]["oldId"], 3);
        assert_eq!(vars["oldId"], 18);
        assert_eq!(vars["body"], "Hello world");
        // Serialized form stays valid JSON with the quotes escaped.
        let wire = serde_json::to_string(&vars).unwrap();
        assert!(wire.contains(r#"\"várkert\""#));
    }

    #[test]
    fn create_variant_uses_handle_and_file_name() {
        let mut image = sample_image();
        image.asset = AssetLink::Create {
            handle: "abc123".into(),
            file_name: "szobor.jpg".into(),
        };
        let vars = image.to_variables();
        assert_eq!(vars["image"]["create"]["handle"], "abc123");
        assert_eq!(vars["image"]["create"]["fileName"], "szobor.jpg");
        assert!(vars["image"].get("connect").is_none());
    }

    #[tokio::test]
    async fn upload_posts_form_encoded_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .match_header("authorization", "Bearer secret")
            .match_header(
                "content-type",
                "application/x-www-form-urlencoded;charset=utf-8",
            )
            .match_body("url=http%3A%2F%2Fwww.ruszkai.hu%2Fimages%2Fszobor.jpg")
            .with_body(r#"{"id": "asset-9"}"#)
            .create_async()
            .await;

        let client = GraphCmsClient::new(&server.url(), "secret").unwrap();
        let id = client
            .upload_from_url("http://www.ruszkai.hu/images/szobor.jpg")
            .await
            .unwrap();
        assert_eq!(id, "asset-9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upload_http_error_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let client = GraphCmsClient::new(&server.url(), "bad").unwrap();
        let err = client.upload_from_url("http://x/y.jpg").await.unwrap_err();
        match err {
            GraphCmsError::Http { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let body = "a".repeat(1999) + "é";
        assert_eq!(body.len(), 2001);
        // byte 2000 falls inside 'é'; the cut must land on the boundary before it
        let out = truncate_for_log(body, 2000);
        assert_eq!(out, "a".repeat(1999) + "…");

        assert_eq!(truncate_for_log("short".into(), 2000), "short");
        assert_eq!(truncate_for_log("éé".into(), 3), "é…");
    }

    #[tokio::test]
    async fn long_multibyte_error_body_is_reported_not_panicked() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload")
            .with_status(500)
            .with_body("a".repeat(1999) + "é…")
            .create_async()
            .await;

        let client = GraphCmsClient::new(&server.url(), "t").unwrap();
        let err = client.upload_from_url("http://x/y.jpg").await.unwrap_err();
        match err {
            GraphCmsError::Http { status, body } => {
                assert_eq!(status, 500);
                assert!(body.starts_with("aaa"));
                assert!(body.ends_with('…'));
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[test]
    fn debug_never_prints_the_token() {
        let client = GraphCmsClient::new("https://api.example.com", "super-secret").unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("api.example.com"));
    }

    #[tokio::test]
    async fn find_image_returns_none_for_null() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(r#"{"data": {"image": null}}"#)
            .create_async()
            .await;

        let client = GraphCmsClient::new(&server.url(), "t").unwrap();
        assert_eq!(client.find_image_by_old_id(18).await.unwrap(), None);
    }

    #[tokio::test]
    async fn graphql_errors_become_typed_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_body(
                r#"{"errors": [{"message": "taxonomy not found"}, {"message": "oops"}]}"#,
            )
            .create_async()
            .await;

        let client = GraphCmsClient::new(&server.url(), "t").unwrap();
        let err = client.create_image(&sample_image()).await.unwrap_err();
        match err {
            GraphCmsError::GraphQl { messages } => {
                assert_eq!(messages, vec!["taxonomy not found", "oops"]);
            }
            other => panic!("expected GraphQl error, got {other:?}"),
        }
    }
}
