use crate::errors::Result;
use crate::telemetry::ImageUpload;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// How a single upload attempt ended. Only `ConnectionFailed` leads to the
/// MQTT fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Accepted { status: String },
    Rejected { status: u16, body: String },
    ConnectionFailed(String),
    TimedOut,
    Failed(String),
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, url: &str, body: &ImageUpload<'_>) -> UploadOutcome;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    status: Option<Value>,
}

pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageUploader for HttpUploader {
    async fn upload(&self, url: &str, body: &ImageUpload<'_>) -> UploadOutcome {
        let response = match self.client.put(url).json(body).send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return UploadOutcome::Rejected {
                status: status.as_u16(),
                body,
            };
        }

        match response.json::<UploadResponse>().await {
            Ok(parsed) => UploadOutcome::Accepted {
                status: match parsed.status {
                    None => "ok".to_string(),
                    Some(Value::String(status)) => status,
                    Some(other) => other.to_string(),
                },
            },
            Err(e) if e.is_timeout() => UploadOutcome::TimedOut,
            Err(e) => UploadOutcome::Failed(format!("invalid response body: {}", e)),
        }
    }
}

// Connect errors win over timeouts so a connect timeout still falls back.
fn classify_error(e: &reqwest::Error) -> UploadOutcome {
    if e.is_connect() {
        UploadOutcome::ConnectionFailed(e.to_string())
    } else if e.is_timeout() {
        UploadOutcome::TimedOut
    } else {
        UploadOutcome::Failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{ImageMetadata, ImageTrigger, Timestamp};
    use chrono::NaiveDate;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn metadata() -> ImageMetadata {
        ImageMetadata {
            format: "png".to_string(),
            width: 10,
            height: 10,
            trigger: ImageTrigger::PhotoCommand,
            timestamp: Timestamp(
                NaiveDate::from_ymd_opt(2024, 5, 1)
                    .unwrap()
                    .and_hms_opt(9, 0, 0)
                    .unwrap(),
            ),
        }
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    break;
                }
            }
        }

        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serves exactly one request with `status_line` and `body`, returning
    /// the raw request it saw.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            request
        });

        (format!("http://{}/images/U/AA_BB", addr), handle)
    }

    #[tokio::test]
    async fn test_upload_accepted() {
        let (url, server) = serve_once("200 OK", r#"{"status":"stored"}"#).await;
        let uploader = HttpUploader::new(Duration::from_secs(5)).unwrap();
        let metadata = metadata();
        let body = ImageUpload {
            image_id: "img-1",
            image_data: "AAAA",
            metadata: &metadata,
        };

        let outcome = uploader.upload(&url, &body).await;
        assert_eq!(
            outcome,
            UploadOutcome::Accepted {
                status: "stored".to_string()
            }
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /images/U/AA_BB HTTP/1.1"));
        assert!(request.contains(r#""imageId":"img-1""#));
        assert!(!request.contains("messageId"));
    }

    #[tokio::test]
    async fn test_upload_missing_status_defaults_to_ok() {
        let (url, _server) = serve_once("200 OK", "{}").await;
        let uploader = HttpUploader::new(Duration::from_secs(5)).unwrap();
        let metadata = metadata();
        let body = ImageUpload {
            image_id: "img-2",
            image_data: "AAAA",
            metadata: &metadata,
        };

        assert_eq!(
            uploader.upload(&url, &body).await,
            UploadOutcome::Accepted {
                status: "ok".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_upload_non_string_status_is_accepted() {
        let (url, _server) = serve_once("200 OK", r#"{"status":1}"#).await;
        let uploader = HttpUploader::new(Duration::from_secs(5)).unwrap();
        let metadata = metadata();
        let body = ImageUpload {
            image_id: "img-6",
            image_data: "AAAA",
            metadata: &metadata,
        };

        assert_eq!(
            uploader.upload(&url, &body).await,
            UploadOutcome::Accepted {
                status: "1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_upload_rejected() {
        let (url, _server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let uploader = HttpUploader::new(Duration::from_secs(5)).unwrap();
        let metadata = metadata();
        let body = ImageUpload {
            image_id: "img-3",
            image_data: "AAAA",
            metadata: &metadata,
        };

        assert_eq!(
            uploader.upload(&url, &body).await,
            UploadOutcome::Rejected {
                status: 500,
                body: r#"{"error":"boom"}"#.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_upload_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let uploader = HttpUploader::new(Duration::from_secs(5)).unwrap();
        let metadata = metadata();
        let body = ImageUpload {
            image_id: "img-4",
            image_data: "AAAA",
            metadata: &metadata,
        };

        let outcome = uploader
            .upload(&format!("http://{}/images/U/AA_BB", addr), &body)
            .await;
        assert!(
            matches!(outcome, UploadOutcome::ConnectionFailed(_)),
            "{:?}",
            outcome
        );
    }

    #[tokio::test]
    async fn test_upload_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let uploader = HttpUploader::new(Duration::from_millis(200)).unwrap();
        let metadata = metadata();
        let body = ImageUpload {
            image_id: "img-5",
            image_data: "AAAA",
            metadata: &metadata,
        };

        let outcome = uploader
            .upload(&format!("http://{}/images/U/AA_BB", addr), &body)
            .await;
        assert_eq!(outcome, UploadOutcome::TimedOut);
    }
}
