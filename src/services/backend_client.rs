use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::config::Config;
use crate::dto::backend_dto::{
    ApiEnvelope, AssignmentUpdatePayload, BackendTest, DraftPayload, McqAnswerPayload,
    StoredDraft, TestAnswerPayload,
};
use crate::error::{Error, Result};
use crate::models::assignment::Assignment;

/// Everything the session needs from the outside world.
///
/// Pushes are at-most-once: implementations must not retry.
#[async_trait]
pub trait AssessmentBackend: Send + Sync {
    async fn push_draft(&self, draft: &DraftPayload) -> Result<()>;

    async fn push_test_answer(&self, answer: &TestAnswerPayload) -> Result<()>;

    async fn push_mcq_answer(&self, answer: &McqAnswerPayload) -> Result<()>;

    async fn update_assignment(
        &self,
        assignment_id: &str,
        update: &AssignmentUpdatePayload,
    ) -> Result<()>;

    async fn fetch_assignment(&self, assignment_id: &str) -> Result<Assignment>;

    async fn fetch_test(&self, test_id: &str) -> Result<BackendTest>;

    async fn fetch_draft(&self, candidate_id: &str, problem_id: &str)
        -> Result<Option<StoredDraft>>;
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    backend_url: Url,
    submission_url: Url,
}

impl HttpBackend {
    pub fn new(backend_url: Url, submission_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            backend_url,
            submission_url,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.backend_url.clone(),
            config.submission_service_url.clone(),
            config.http_timeout,
        )
    }

    fn backend(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.backend_url, segments)
    }

    fn submission(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.submission_url, segments)
    }

    async fn post_json<T: serde::Serialize + ?Sized>(&self, url: Url, body: &T) -> Result<()> {
        let resp = self.client.post(url).json(body).send().await?;
        ensure_success(resp).await.map(|_| ())
    }

    async fn get_envelope<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let resp = self.client.get(url).send().await?;
        let resp = ensure_success(resp).await?;
        let envelope: ApiEnvelope<T> = resp.json().await?;
        envelope.data.ok_or_else(|| {
            Error::NotFound(
                envelope
                    .error
                    .or(envelope.message)
                    .unwrap_or_else(|| format!("{} not found", what)),
            )
        })
    }
}

/// Appends each segment percent-encoded, so ids can never add path levels,
/// a query or a fragment to the outbound URL.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Internal(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    if status == StatusCode::NOT_FOUND {
        return Err(Error::NotFound(url));
    }
    Err(Error::Backend {
        status: status.as_u16(),
        url,
    })
}

#[async_trait]
impl AssessmentBackend for HttpBackend {
    async fn push_draft(&self, draft: &DraftPayload) -> Result<()> {
        self.post_json(self.submission(&["draft"])?, draft).await
    }

    async fn push_test_answer(&self, answer: &TestAnswerPayload) -> Result<()> {
        self.post_json(self.submission(&["test-answer"])?, answer).await
    }

    async fn push_mcq_answer(&self, answer: &McqAnswerPayload) -> Result<()> {
        self.post_json(self.submission(&["mcq-answer"])?, answer).await
    }

    async fn update_assignment(
        &self,
        assignment_id: &str,
        update: &AssignmentUpdatePayload,
    ) -> Result<()> {
        let url = self.backend(&["assignments", assignment_id])?;
        let resp = self.client.patch(url).json(update).send().await?;
        ensure_success(resp).await.map(|_| ())
    }

    async fn fetch_assignment(&self, assignment_id: &str) -> Result<Assignment> {
        let url = self.backend(&["assignments", assignment_id])?;
        self.get_envelope(url, "Assignment").await
    }

    async fn fetch_test(&self, test_id: &str) -> Result<BackendTest> {
        let url = self.backend(&["tests", test_id, "questions"])?;
        self.get_envelope(url, "Test").await
    }

    async fn fetch_draft(
        &self,
        candidate_id: &str,
        problem_id: &str,
    ) -> Result<Option<StoredDraft>> {
        let url = self.submission(&["draft", candidate_id, problem_id])?;
        let resp = self.client.get(url).send().await?;
        let resp = match ensure_success(resp).await {
            Ok(resp) => resp,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        // The submission service answers 200 with `{"status": "no_draft"}`
        // when nothing was saved.
        let body: JsonValue = resp.json().await?;
        if body.get("code").is_none() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(body)?))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_base_url;

    fn backend() -> HttpBackend {
        HttpBackend::new(
            parse_base_url("BACKEND_URL", "http://localhost:8000/api").unwrap(),
            parse_base_url("SUBMISSION_SERVICE_URL", "http://localhost:8003").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn endpoints_are_joined_onto_base_urls() {
        let backend = backend();
        assert_eq!(
            backend.backend(&["assignments", "a-1"]).unwrap().as_str(),
            "http://localhost:8000/api/assignments/a-1"
        );
        assert_eq!(
            backend.backend(&["tests", "t1", "questions"]).unwrap().as_str(),
            "http://localhost:8000/api/tests/t1/questions"
        );
        assert_eq!(
            backend.submission(&["draft"]).unwrap().as_str(),
            "http://localhost:8003/draft"
        );
    }

    #[test]
    fn ids_stay_inside_their_path_segment() {
        let backend = backend();

        let url = backend.backend(&["assignments", "../tests/t1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/assignments/..%2Ftests%2Ft1"
        );

        let url = backend.backend(&["assignments", "a?x=1#frag"]).unwrap();
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
        assert_eq!(url.path_segments().unwrap().count(), 3);

        let url = backend.submission(&["draft", "cand/1", "p"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8003/draft/cand%2F1/p");
    }

    #[test]
    fn unreachable_backend_surfaces_as_reqwest_error() {
        let backend = HttpBackend::new(
            parse_base_url("BACKEND_URL", "http://127.0.0.1:9").unwrap(),
            parse_base_url("SUBMISSION_SERVICE_URL", "http://127.0.0.1:9").unwrap(),
            Duration::from_millis(200),
        )
        .unwrap();
        let draft = DraftPayload {
            candidate_id: "c".into(),
            problem_id: "p".into(),
            language: "python".into(),
            code: String::new(),
            cursor_position: 0,
        };
        let err = tokio_test::block_on(backend.push_draft(&draft)).unwrap_err();
        assert!(matches!(err, Error::Reqwest(_)));
    }
}
