//! Worker Request Client (spec.md §4.8): a typed adapter over a cell
//! worker's HTTP API.
//!
//! The worker binary itself is out of scope (spec.md §1); this module
//! only shapes requests/responses and classifies transport failures
//! into `WorkerIoKind` so callers can decide whether to retry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::SessionId;
use crate::error::WorkerIoKind;
use crate::{Error, Result};

/// One part of a `PromptResult`'s ordered content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    /// Plain text content.
    Text {
        /// The text content.
        content: String,
    },
    /// A tool invocation and its (optional) result.
    Tool {
        /// Name of the invoked tool.
        tool_name: String,
        /// The tool's result, if it has completed.
        result: Option<String>,
    },
}

/// Result of a prompt or command execution against a worker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResult {
    /// The session the prompt ran in.
    pub session_id: SessionId,
    /// Worker-assigned message ID.
    pub message_id: String,
    /// Ordered content parts.
    pub parts: Vec<Part>,
}

/// Options controlling a prompt/command execution.
#[derive(Debug, Clone, Default)]
pub struct PromptOpts {
    /// Existing session to continue; `None` starts a new session.
    pub session_id: Option<SessionId>,
    /// Title for a newly created session (ignored if `session_id` is set).
    pub session_title: Option<String>,
    /// Model identifier to use.
    pub model_id: Option<String>,
    /// Worker role/persona to assume.
    pub persona: Option<String>,
    /// If true, inject context without requesting a reply.
    pub no_reply: bool,
    /// Restrict the worker to this set of tools; empty means unrestricted.
    pub tool_allowlist: Vec<String>,
}

/// A file status entry from a worker's working copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatus {
    /// Path relative to the working copy root.
    pub path: String,
    /// Worker-reported status, e.g. "modified", "added", "deleted".
    pub status: String,
}

/// Session metadata as reported by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// The session's ID.
    pub id: SessionId,
    /// Display title.
    pub title: String,
}

#[derive(Serialize)]
struct ExecutePromptBody<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    persona: Option<&'a str>,
    no_reply: bool,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    tool_allowlist: &'a [String],
}

#[derive(Serialize)]
struct ExecuteCommandBody<'a> {
    command: &'a str,
    args: &'a [String],
}

/// Typed HTTP adapter over a single worker's base URL.
#[derive(Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
}

impl WorkerClient {
    /// Construct a client for the worker at `base_url`, with `timeout`
    /// applied to every request.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| classify_reqwest_error(&e))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Execute a free-form prompt, optionally within an existing session.
    pub async fn execute_prompt(&self, prompt: &str, opts: &PromptOpts) -> Result<PromptResult> {
        let body = ExecutePromptBody {
            prompt,
            session_id: opts.session_id.as_ref().map(SessionId::as_str),
            session_title: opts.session_title.as_deref(),
            model_id: opts.model_id.as_deref(),
            persona: opts.persona.as_deref(),
            no_reply: opts.no_reply,
            tool_allowlist: &opts.tool_allowlist,
        };
        self.post_json("/prompt", &body).await
    }

    /// Execute a structured command within an existing session.
    pub async fn execute_command(
        &self,
        session_id: &SessionId,
        command: &str,
        args: &[String],
    ) -> Result<PromptResult> {
        let body = ExecuteCommandBody { command, args };
        self.post_json(&format!("/sessions/{session_id}/command"), &body)
            .await
    }

    /// List all sessions known to the worker.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        self.get_json("/sessions").await
    }

    /// Fetch a single session's metadata.
    pub async fn get_session(&self, session_id: &SessionId) -> Result<SessionInfo> {
        self.get_json(&format!("/sessions/{session_id}")).await
    }

    /// Delete a session.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/sessions/{session_id}")))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        ensure_success(response).await.map(|_| ())
    }

    /// Abort an in-flight session.
    pub async fn abort_session(&self, session_id: &SessionId) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/sessions/{session_id}/abort")))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        ensure_success(response).await.map(|_| ())
    }

    /// List the worker's current working-copy file status.
    pub async fn get_file_status(&self) -> Result<Vec<FileStatus>> {
        self.get_json("/files/status").await
    }

    /// Read a file's contents from the worker's working copy.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let response = self
            .http
            .get(self.url(&format!("/files/read?path={}", urlencode(path))))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = ensure_success(response).await?;
        response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| classify_reqwest_error(&e))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| classify_reqwest_error(&e))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let kind = if status.is_client_error() {
        WorkerIoKind::InvalidInput
    } else {
        WorkerIoKind::AgentError
    };
    Err(Error::WorkerIo {
        kind,
        message: format!("worker returned {status}: {body}"),
    })
}

fn classify_reqwest_error(err: &reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        WorkerIoKind::Timeout
    } else if err.is_connect() || err.is_request() {
        WorkerIoKind::Network
    } else if err.is_decode() {
        WorkerIoKind::InvalidInput
    } else {
        WorkerIoKind::Unknown
    };
    Error::WorkerIo {
        kind,
        message: err.to_string(),
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .flat_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '/') {
                vec![c]
            } else {
                format!("%{:02X}", c as u32).chars().collect()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_opts_default_has_no_session_and_allows_replies() {
        let opts = PromptOpts::default();
        assert!(opts.session_id.is_none());
        assert!(!opts.no_reply);
        assert!(opts.tool_allowlist.is_empty());
    }

    #[test]
    fn urlencode_escapes_reserved_characters_but_keeps_path_separators() {
        assert_eq!(urlencode("a b"), "a%20b");
        assert_eq!(urlencode("src/main.rs"), "src/main.rs");
    }

    #[test]
    fn client_construction_with_zero_timeout_still_builds() {
        let client = WorkerClient::new("http://127.0.0.1:9001", Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn part_serializes_with_a_tagged_kind() {
        let part = Part::Text {
            content: "hello".into(),
        };
        let json = serde_json::to_string(&part).unwrap();
        assert!(json.contains("\"kind\":\"text\""));
    }
}
