//! Vision service client.
//!
//! The vision service receives the menu photo as a single-part multipart
//! upload and answers with an open-ended JSON object describing what it read.

use crate::error::ServiceError;
use crate::schema::VisionExtraction;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

/// Image bytes ready to be sent to a vision backend.
#[derive(Debug, Clone)]
pub struct VisionUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Async trait implemented by each vision backend.
#[async_trait::async_trait]
pub trait VisionService: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self, upload: VisionUpload) -> Result<VisionExtraction, ServiceError>;
}

/// Vision backend reached over HTTP at a configured address.
pub struct HttpVisionService {
    url: String,
    client: reqwest::Client,
}

impl HttpVisionService {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl VisionService for HttpVisionService {
    fn name(&self) -> &str {
        "http_vision"
    }

    async fn extract(&self, upload: VisionUpload) -> Result<VisionExtraction, ServiceError> {
        info!(
            "HttpVisionService: uploading {} ({} bytes) to {}",
            upload.filename,
            upload.data.len(),
            self.url
        );

        let part = Part::bytes(upload.data)
            .file_name(upload.filename)
            .mime_str(&upload.content_type)
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let form = Form::new().part("file", part);

        let response = self.client.post(&self.url).multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status { status, body });
        }

        let raw = response.text().await?;
        debug!(
            "HttpVisionService: raw response ({} bytes): {}",
            raw.len(),
            raw.chars().take(500).collect::<String>()
        );

        decode_extraction(&raw)
    }
}

/// Decode a vision response body. Anything other than a JSON object is rejected.
pub fn decode_extraction(raw: &str) -> Result<VisionExtraction, ServiceError> {
    match serde_json::from_str(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ServiceError::Decode(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ServiceError::Decode(e.to_string())),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Multipart, http::StatusCode, routing::post, Json, Router};

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/analyze", addr)
    }

    fn upload() -> VisionUpload {
        VisionUpload {
            filename: "menu.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
        }
    }

    async fn echo_upload(mut multipart: Multipart) -> Json<serde_json::Value> {
        let mut fields = Vec::new();
        let mut size = 0;
        while let Some(field) = multipart.next_field().await.unwrap() {
            fields.push(field.name().unwrap_or_default().to_string());
            size += field.bytes().await.unwrap().len();
        }
        Json(serde_json::json!({
            "fields": fields,
            "size": size,
            "items": [{"name": "Tea", "price": 2.5}]
        }))
    }

    #[tokio::test]
    async fn test_extract_sends_single_file_field() {
        let url = spawn_server(Router::new().route("/analyze", post(echo_upload))).await;
        let service = HttpVisionService::new(reqwest::Client::new(), url);

        let result = service.extract(upload()).await.unwrap();

        assert_eq!(result["fields"], serde_json::json!(["file"]));
        assert_eq!(result["size"], 4);
        let keys: Vec<&String> = result.keys().collect();
        assert_eq!(keys, vec!["fields", "size", "items"]);
    }

    #[tokio::test]
    async fn test_server_error_is_status() {
        let app = Router::new().route(
            "/analyze",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model offline") }),
        );
        let url = spawn_server(app).await;
        let service = HttpVisionService::new(reqwest::Client::new(), url);

        let err = service.extract(upload()).await.unwrap_err();
        match err {
            ServiceError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model offline");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_object_body_is_decode_error() {
        let app = Router::new().route(
            "/analyze",
            post(|| async { Json(serde_json::json!([1, 2, 3])) }),
        );
        let url = spawn_server(app).await;
        let service = HttpVisionService::new(reqwest::Client::new(), url);

        let err = service.extract(upload()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let service =
            HttpVisionService::new(reqwest::Client::new(), format!("http://{}/analyze", addr));

        let err = service.extract(upload()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)));
    }

    #[test]
    fn test_decode_extraction() {
        assert!(decode_extraction(r#"{"items": []}"#).is_ok());
        assert!(matches!(
            decode_extraction("not json"),
            Err(ServiceError::Decode(_))
        ));
        assert!(matches!(
            decode_extraction("null"),
            Err(ServiceError::Decode(_))
        ));
    }
}
