//! HTTP content service client.
//!
//! Reads exercises and tracks from a content service that wraps every
//! payload in `{success, data, message}`. A 404 means "no such item" and
//! becomes `Ok(None)`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::instrument;

use unitpath_core::error::ContentError;
use unitpath_core::model::{Exercise, Track};
use unitpath_core::traits::ContentSource;

const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Content source backed by an HTTP service.
pub struct HttpContentSource {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

impl HttpContentSource {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` and unwrap the envelope. `Ok(None)` on 404.
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ContentError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ContentError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    ContentError::Network(format!(
                        "content service not reachable at {}",
                        self.base_url
                    ))
                } else {
                    ContentError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentError::Api {
                status,
                message: body,
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ContentError::Invalid(format!("failed to parse {path}: {e}")))?;

        if !envelope.success {
            return Err(ContentError::Api {
                status,
                message: envelope
                    .message
                    .unwrap_or_else(|| "request failed".to_string()),
            });
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self))]
    async fn exercise(&self, id: &str) -> Result<Option<Exercise>, ContentError> {
        self.fetch(&format!("/exercises/{id}")).await
    }

    #[instrument(skip(self))]
    async fn exercises_for_unit(&self, unit_id: &str) -> Result<Vec<Exercise>, ContentError> {
        Ok(self
            .fetch(&format!("/units/{unit_id}/exercises"))
            .await?
            .unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn track_containing(&self, unit_id: &str) -> Result<Option<Track>, ContentError> {
        self.fetch(&format!("/units/{unit_id}/track")).await
    }

    #[instrument(skip(self))]
    async fn track(
        &self,
        subject_code: &str,
        grade: Option<u8>,
    ) -> Result<Option<Track>, ContentError> {
        let path = match grade {
            Some(g) => format!("/tracks/{subject_code}?grade={g}"),
            None => format!("/tracks/{subject_code}"),
        };
        self.fetch(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn exercise_json() -> serde_json::Value {
        serde_json::json!({
            "id": "e1",
            "unitId": "u1",
            "type": "choice",
            "prompt": "2 + 2 = ?",
            "options": ["3", "4"],
            "correctAnswer": 1
        })
    }

    #[tokio::test]
    async fn fetches_exercise_through_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exercises/e1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true, "data": exercise_json()})),
            )
            .mount(&server)
            .await;

        let source = HttpContentSource::new(&server.uri());
        let exercise = source.exercise("e1").await.unwrap().unwrap();
        assert_eq!(exercise.unit_id, "u1");
        assert_eq!(exercise.options.len(), 2);
        assert_eq!(exercise.points, 10);
    }

    #[tokio::test]
    async fn not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/units/missing/track"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HttpContentSource::new(&server.uri());
        assert!(source.track_containing("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn track_lookup_passes_grade() {
        let server = MockServer::start().await;
        let track = serde_json::json!({
            "subjectCode": "math",
            "grade": 3,
            "name": "Math 3",
            "units": [{"id": "u1", "name": "Counting", "exerciseIds": ["e1"]}]
        });
        Mock::given(method("GET"))
            .and(path("/tracks/math"))
            .and(query_param("grade", "3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true, "data": track})),
            )
            .mount(&server)
            .await;

        let source = HttpContentSource::new(&server.uri());
        let track = source.track("math", Some(3)).await.unwrap().unwrap();
        assert_eq!(track.units[0].total_exercises(), 1);
    }

    #[tokio::test]
    async fn failure_envelope_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/units/u1/exercises"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"success": false, "message": "unit archived"}),
            ))
            .mount(&server)
            .await;

        let source = HttpContentSource::new(&server.uri());
        let err = source.exercises_for_unit("u1").await.unwrap_err();
        assert!(err.to_string().contains("unit archived"));
    }

    #[tokio::test]
    async fn success_without_data_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/units/u2/exercises"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})),
            )
            .mount(&server)
            .await;

        let source = HttpContentSource::new(&server.uri());
        assert!(source.exercises_for_unit("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exercises/e1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let source = HttpContentSource::new(&server.uri());
        match source.exercise("e1").await.unwrap_err() {
            ContentError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exercises/e1"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let source = HttpContentSource::with_timeout(&server.uri(), 1);
        let err = source.exercise("e1").await.unwrap_err();
        assert!(matches!(err, ContentError::Timeout(1)));
    }

    #[tokio::test]
    async fn unreachable_service_is_network_error() {
        let source = HttpContentSource::new("http://127.0.0.1:1");
        let err = source.exercise("e1").await.unwrap_err();
        assert!(matches!(err, ContentError::Network(_)));
    }
}
