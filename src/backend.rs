use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::error::BackendError;
use crate::models::{
    CertificateDto, EnrollmentDto, LessonAccessDto, ModuleDto, ProgressDto, QuizDto,
    SubmitQuizReq, SubmitQuizResp,
};

/// The learning backend as seen by the engine. Implementations must be
/// shareable across spawned request tasks.
#[async_trait]
pub trait CourseBackend: Send + Sync {
    async fn fetch_modules(&self, course_id: Uuid) -> Result<Vec<ModuleDto>, BackendError>;

    async fn fetch_enrollment(&self, course_id: Uuid) -> Result<bool, BackendError>;

    async fn fetch_progress(&self, course_id: Uuid) -> Result<ProgressDto, BackendError>;

    /// `Ok(None)` when the lesson has no quiz.
    async fn fetch_quiz(&self, lesson_id: Uuid) -> Result<Option<QuizDto>, BackendError>;

    async fn lesson_accessed(
        &self,
        course_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<LessonAccessDto, BackendError>;

    async fn mark_complete(&self, course_id: Uuid, lesson_id: Uuid) -> Result<(), BackendError>;

    async fn submit_quiz(
        &self,
        quiz_id: Uuid,
        req: &SubmitQuizReq,
    ) -> Result<SubmitQuizResp, BackendError>;

    async fn fetch_certificate(
        &self,
        course_id: Uuid,
    ) -> Result<Option<CertificateDto>, BackendError>;
}

/// `CourseBackend` over the backend's JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        if !(config.api_url.starts_with("http://") || config.api_url.starts_with("https://")) {
            return Err(BackendError::Url(config.api_url.clone()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        endpoint: &str,
    ) -> Result<T, BackendError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Like `send`, but 404, an empty body and `null` all mean "absent".
    async fn send_optional<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        endpoint: &str,
    ) -> Result<Option<T>, BackendError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_empty(&self, req: RequestBuilder, endpoint: &str) -> Result<(), BackendError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CourseBackend for HttpBackend {
    async fn fetch_modules(&self, course_id: Uuid) -> Result<Vec<ModuleDto>, BackendError> {
        let path = format!("/api/courses/{course_id}/modules");
        let modules: Option<Vec<ModuleDto>> = self
            .send_optional(self.request(reqwest::Method::GET, &path), &path)
            .await?;
        Ok(modules.unwrap_or_default())
    }

    async fn fetch_enrollment(&self, course_id: Uuid) -> Result<bool, BackendError> {
        let path = format!("/api/courses/{course_id}/enrollment");
        let dto: EnrollmentDto = self
            .send(self.request(reqwest::Method::GET, &path), &path)
            .await?;
        Ok(dto.enrolled)
    }

    async fn fetch_progress(&self, course_id: Uuid) -> Result<ProgressDto, BackendError> {
        let path = format!("/api/courses/{course_id}/progress");
        self.send(self.request(reqwest::Method::GET, &path), &path)
            .await
    }

    async fn fetch_quiz(&self, lesson_id: Uuid) -> Result<Option<QuizDto>, BackendError> {
        let path = format!("/api/lessons/{lesson_id}/quiz");
        self.send_optional(self.request(reqwest::Method::GET, &path), &path)
            .await
    }

    async fn lesson_accessed(
        &self,
        course_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<LessonAccessDto, BackendError> {
        let path = format!("/api/lessons/{lesson_id}/access");
        let req = self
            .request(reqwest::Method::POST, &path)
            .json(&json!({ "course_id": course_id }));
        self.send(req, &path).await
    }

    async fn mark_complete(&self, course_id: Uuid, lesson_id: Uuid) -> Result<(), BackendError> {
        let path = format!("/api/lessons/{lesson_id}/complete");
        let req = self
            .request(reqwest::Method::POST, &path)
            .json(&json!({ "course_id": course_id }));
        self.send_empty(req, &path).await
    }

    async fn submit_quiz(
        &self,
        quiz_id: Uuid,
        body: &SubmitQuizReq,
    ) -> Result<SubmitQuizResp, BackendError> {
        let path = format!("/api/quizzes/{quiz_id}/submit");
        let req = self.request(reqwest::Method::POST, &path).json(body);
        self.send(req, &path).await
    }

    async fn fetch_certificate(
        &self,
        course_id: Uuid,
    ) -> Result<Option<CertificateDto>, BackendError> {
        let path = format!("/api/courses/{course_id}/certificate");
        self.send_optional(self.request(reqwest::Method::GET, &path), &path)
            .await
    }
}
