use std::env;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use course_core::model::{
    AttemptId, AttemptResult, LessonId, LessonProgress, QuizId, SessionKey,
};

use crate::client::{CodeSubmissionClient, ProgressSessionClient, QuizAttemptClient};
use crate::dto::{
    CodeRunResult, CodeSubmission, HeartbeatResponse, ProgressUpdate, StartAttemptResponse,
    StartSessionResponse, SubmitAttemptRequest,
};
use crate::error::RemoteError;

#[derive(Clone, Debug)]
pub struct HttpAuthorityConfig {
    pub base_url: Url,
    pub api_token: Option<String>,
}

impl HttpAuthorityConfig {
    /// # Errors
    ///
    /// Returns `RemoteError::Config` if the URL is invalid or cannot carry a path.
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| RemoteError::Config(format!("invalid base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Config(format!(
                "base url cannot carry a path: {base_url}"
            )));
        }
        Ok(Self {
            base_url,
            api_token: None,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Read `LEARN_API_URL` and the optional `LEARN_API_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Config` if the URL is missing or invalid.
    pub fn from_env() -> Result<Self, RemoteError> {
        let base_url = env::var("LEARN_API_URL")
            .map_err(|_| RemoteError::Config("LEARN_API_URL is not set".into()))?;
        let config = Self::new(&base_url)?;
        match env::var("LEARN_API_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Ok(config.with_token(token.trim())),
            _ => Ok(config),
        }
    }
}

/// REST adapter for the progress authority.
#[derive(Clone)]
pub struct HttpAuthority {
    client: Client,
    config: HttpAuthorityConfig,
}

impl HttpAuthority {
    #[must_use]
    pub fn new(config: HttpAuthorityConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &HttpAuthorityConfig {
        &self.config
    }

    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::Config("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!(%method, %url, "authority request");
        let builder = self.client.request(method, url);
        match &self.config.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RemoteError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::from_status(status.as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<(), RemoteError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::from_status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressSessionClient for HttpAuthority {
    async fn get_progress(&self, lesson_id: LessonId) -> Result<LessonProgress, RemoteError> {
        let id = lesson_id.to_string();
        let url = self.endpoint(&["lessons", &id, "progress"])?;
        self.fetch(self.request(Method::GET, url)).await
    }

    async fn start_watch_session(&self, lesson_id: LessonId) -> Result<SessionKey, RemoteError> {
        let id = lesson_id.to_string();
        let url = self.endpoint(&["lessons", &id, "watch-sessions"])?;
        let body: StartSessionResponse = self.fetch(self.request(Method::POST, url)).await?;
        Ok(body.session_key)
    }

    async fn heartbeat(
        &self,
        lesson_id: LessonId,
        session_key: &SessionKey,
    ) -> Result<HeartbeatResponse, RemoteError> {
        let id = lesson_id.to_string();
        let url = self.endpoint(&[
            "lessons",
            &id,
            "watch-sessions",
            session_key.as_str(),
            "heartbeat",
        ])?;
        self.fetch(self.request(Method::POST, url)).await
    }

    async fn stop_watch_session(
        &self,
        lesson_id: LessonId,
        session_key: &SessionKey,
    ) -> Result<(), RemoteError> {
        let id = lesson_id.to_string();
        let url = self.endpoint(&[
            "lessons",
            &id,
            "watch-sessions",
            session_key.as_str(),
            "stop",
        ])?;
        self.execute(self.request(Method::POST, url)).await
    }

    async fn update_progress(
        &self,
        lesson_id: LessonId,
        update: ProgressUpdate,
    ) -> Result<(), RemoteError> {
        let id = lesson_id.to_string();
        let url = self.endpoint(&["lessons", &id, "progress"])?;
        self.execute(self.request(Method::PUT, url).json(&update))
            .await
    }
}

#[async_trait]
impl QuizAttemptClient for HttpAuthority {
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<StartAttemptResponse, RemoteError> {
        let id = quiz_id.to_string();
        let url = self.endpoint(&["quizzes", &id, "attempts"])?;
        self.fetch(self.request(Method::POST, url)).await
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        request: &SubmitAttemptRequest,
    ) -> Result<AttemptResult, RemoteError> {
        let id = attempt_id.to_string();
        let url = self.endpoint(&["attempts", &id, "submit"])?;
        self.fetch(self.request(Method::POST, url).json(request))
            .await
    }
}

#[async_trait]
impl CodeSubmissionClient for HttpAuthority {
    async fn submit_code(
        &self,
        lesson_id: LessonId,
        submission: &CodeSubmission,
    ) -> Result<CodeRunResult, RemoteError> {
        let id = lesson_id.to_string();
        let url = self.endpoint(&["lessons", &id, "code-submissions"])?;
        self.fetch(self.request(Method::POST, url).json(submission))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority(base: &str) -> HttpAuthority {
        HttpAuthority::new(HttpAuthorityConfig::new(base).unwrap())
    }

    #[test]
    fn endpoint_appends_segments_to_base_path() {
        let http = authority("https://learn.example.com/api/v1");
        let url = http.endpoint(&["lessons", "5", "progress"]).unwrap();
        assert_eq!(url.as_str(), "https://learn.example.com/api/v1/lessons/5/progress");
    }

    #[test]
    fn endpoint_handles_trailing_slash() {
        let http = authority("https://learn.example.com/api/");
        let url = http.endpoint(&["quizzes", "2", "attempts"]).unwrap();
        assert_eq!(url.as_str(), "https://learn.example.com/api/quizzes/2/attempts");
    }

    #[test]
    fn session_keys_are_percent_encoded() {
        let http = authority("https://learn.example.com");
        let url = http
            .endpoint(&["lessons", "1", "watch-sessions", "a/b c", "heartbeat"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://learn.example.com/lessons/1/watch-sessions/a%2Fb%20c/heartbeat"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(matches!(
            HttpAuthorityConfig::new("mailto:someone@example.com"),
            Err(RemoteError::Config(_))
        ));
        assert!(matches!(
            HttpAuthorityConfig::new("not a url"),
            Err(RemoteError::Config(_))
        ));
    }

    #[test]
    fn token_is_optional() {
        let config = HttpAuthorityConfig::new("http://localhost:3000").unwrap();
        assert!(config.api_token.is_none());
        assert_eq!(config.with_token("t").api_token.as_deref(), Some("t"));
    }
}
