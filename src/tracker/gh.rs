//! [`Tracker`] implementation backed by the `gh` CLI.
//!
//! Every operation shells out to `gh`, either through a porcelain command
//! (`gh issue list`) or `gh api` for the endpoints porcelain does not
//! cover. Authentication is whatever `gh auth` has configured.

use std::process::Command;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::model::{
    AgentEvent, AgentEventKind, Comment, Issue, IssueState, MergeAttempt, PullRequest,
};

use super::{FileContent, Result, Tracker, TrackerError};

/// Timeline event names emitted by the hosted coding agent.
const AGENT_STARTED_EVENT: &str = "copilot_work_started";
const AGENT_FINISHED_EVENT: &str = "copilot_work_finished";
const AGENT_FAILED_EVENT: &str = "copilot_work_finished_failure";

pub struct GhTracker {
    repository: String,
}

impl GhTracker {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }

    /// Run a gh command and return stdout on success.
    fn gh(&self, args: &[&str]) -> Result<String> {
        let rendered = format!("gh {}", args.join(" "));
        debug!(command = %rendered, "running gh");

        let output = Command::new("gh")
            .args(args)
            .output()
            .map_err(|source| TrackerError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TrackerError::Command {
                command: rendered,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn gh_json<T: DeserializeOwned>(&self, args: &[&str], context: &'static str) -> Result<T> {
        let json = self.gh(args)?;
        serde_json::from_str(&json).map_err(|source| TrackerError::Decode { context, source })
    }

    /// Like `gh_json`, for `gh api --paginate` list endpoints. The output
    /// there is one JSON array per page, back to back, not a single document.
    fn gh_json_pages<T: DeserializeOwned>(
        &self,
        args: &[&str],
        context: &'static str,
    ) -> Result<Vec<T>> {
        let json = self.gh(args)?;
        decode_pages(&json, context)
    }

    fn api_path(&self, tail: &str) -> String {
        format!("repos/{}/{tail}", self.repository)
    }

    fn timeline(&self, issue_number: u64) -> Result<Vec<GhTimelineEvent>> {
        self.gh_json_pages(
            &[
                "api",
                "--paginate",
                &self.api_path(&format!("issues/{issue_number}/timeline")),
            ],
            "issue timeline",
        )
    }
}

fn decode_pages<T: DeserializeOwned>(json: &str, context: &'static str) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for page in serde_json::Deserializer::from_str(json).into_iter::<Vec<T>>() {
        let page = page.map_err(|source| TrackerError::Decode { context, source })?;
        items.extend(page);
    }
    Ok(items)
}

fn is_http_status(err: &TrackerError, code: u16) -> bool {
    match err {
        TrackerError::Command { stderr, .. } => stderr.contains(&format!("HTTP {code}")),
        _ => false,
    }
}

impl Tracker for GhTracker {
    fn repository(&self) -> &str {
        &self.repository
    }

    fn list_open_issues(&self) -> Result<Vec<Issue>> {
        let issues: Vec<GhIssue> = self.gh_json(
            &[
                "issue",
                "list",
                "-R",
                self.repository.as_str(),
                "--state",
                "open",
                "--limit",
                "200",
                "--json",
                "number,title,body,labels,assignees,state",
            ],
            "issue list",
        )?;
        Ok(issues.into_iter().map(GhIssue::into_issue).collect())
    }

    fn get_issue(&self, number: u64) -> Result<Issue> {
        let issue: GhIssue = self.gh_json(
            &[
                "issue",
                "view",
                &number.to_string(),
                "-R",
                self.repository.as_str(),
                "--json",
                "number,title,body,labels,assignees,state",
            ],
            "issue view",
        )?;
        Ok(issue.into_issue())
    }

    fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Result<Issue> {
        let mut args = vec![
            "issue",
            "create",
            "-R",
            self.repository.as_str(),
            "--title",
            title,
            "--body",
            body,
        ];
        let joined = labels.join(",");
        if !joined.is_empty() {
            args.push("--label");
            args.push(&joined);
        }

        // gh prints the new issue's URL; the number is its last segment.
        let url = self.gh(&args)?;
        let number: u64 = url
            .trim()
            .rsplit('/')
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| {
                TrackerError::Unexpected(format!("could not parse issue number from {url:?}"))
            })?;
        self.get_issue(number)
    }

    fn update_issue_body(&self, number: u64, body: &str) -> Result<()> {
        self.gh(&[
            "issue",
            "edit",
            &number.to_string(),
            "-R",
            self.repository.as_str(),
            "--body",
            body,
        ])?;
        Ok(())
    }

    fn assign_issue(&self, number: u64, assignees: &[String]) -> Result<Vec<String>> {
        let joined = assignees.join(",");
        self.gh(&[
            "issue",
            "edit",
            &number.to_string(),
            "-R",
            self.repository.as_str(),
            "--add-assignee",
            &joined,
        ])?;
        // Re-read: the API can accept an assignee without persisting it.
        Ok(self.get_issue(number)?.assignees)
    }

    fn ensure_label(&self, name: &str, color: &str, description: &str) -> Result<()> {
        self.gh(&[
            "label",
            "create",
            name,
            "-R",
            self.repository.as_str(),
            "--color",
            color,
            "--description",
            description,
            "--force",
        ])?;
        Ok(())
    }

    fn find_issue_by_marker(&self, marker: &str) -> Result<Option<u64>> {
        let hits: Vec<GhSearchHit> = self.gh_json(
            &[
                "search",
                "issues",
                marker,
                "--repo",
                self.repository.as_str(),
                "--state",
                "open",
                "--json",
                "number",
            ],
            "issue search",
        )?;
        Ok(hits.iter().map(|h| h.number).min())
    }

    fn linked_pull_requests(&self, issue_number: u64) -> Result<Vec<PullRequest>> {
        let events = self.timeline(issue_number)?;

        let mut numbers: Vec<u64> = Vec::new();
        for event in events {
            if event.event != "cross-referenced" && event.event != "connected" {
                continue;
            }
            let Some(issue) = event.source.and_then(|s| s.issue) else {
                continue;
            };
            if issue.pull_request.is_none() {
                continue;
            }
            if let Some(repo) = &issue.repository {
                if repo.full_name != self.repository {
                    continue;
                }
            }
            if !numbers.contains(&issue.number) {
                numbers.push(issue.number);
            }
        }

        numbers
            .into_iter()
            .map(|n| self.get_pull_request(n))
            .collect()
    }

    fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let pull: GhPull = self.gh_json(
            &["api", &self.api_path(&format!("pulls/{number}"))],
            "pull request",
        )?;
        Ok(pull.into_pull_request())
    }

    fn review_requested(&self, number: u64) -> Result<bool> {
        let current: GhRequestedReviewers = self.gh_json(
            &[
                "api",
                &self.api_path(&format!("pulls/{number}/requested_reviewers")),
            ],
            "requested reviewers",
        )?;
        if !current.users.is_empty() || !current.teams.is_empty() {
            return Ok(true);
        }

        // A review dismissed or completed still counts as a request signal.
        let events = self.timeline(number)?;
        Ok(events.iter().any(|e| e.event == "review_requested"))
    }

    fn approve_pull_request(&self, number: u64) -> Result<()> {
        self.gh(&[
            "pr",
            "review",
            &number.to_string(),
            "-R",
            self.repository.as_str(),
            "--approve",
        ])?;
        Ok(())
    }

    fn mark_ready_for_review(&self, number: u64) -> Result<PullRequest> {
        self.gh(&["pr", "ready", &number.to_string(), "-R", &self.repository])?;
        self.get_pull_request(number)
    }

    fn merge_pull_request(&self, number: u64) -> Result<MergeAttempt> {
        let result = self.gh(&[
            "api",
            "-X",
            "PUT",
            &self.api_path(&format!("pulls/{number}/merge")),
            "-f",
            "merge_method=squash",
        ]);

        match result {
            Ok(_) => Ok(MergeAttempt {
                merged: true,
                message: "merged".to_string(),
            }),
            // 405/409/422: not mergeable right now (checks, conflicts,
            // branch protection). Refusal is data, not an error.
            Err(e)
                if is_http_status(&e, 405)
                    || is_http_status(&e, 409)
                    || is_http_status(&e, 422) =>
            {
                Ok(MergeAttempt {
                    merged: false,
                    message: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn delete_branch(&self, repo: &str, branch: &str) -> Result<()> {
        let result = self.gh(&[
            "api",
            "-X",
            "DELETE",
            &format!("repos/{repo}/git/refs/heads/{branch}"),
        ]);
        match result {
            Ok(_) => Ok(()),
            // Already gone.
            Err(e) if is_http_status(&e, 422) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        let result: Result<Vec<GhContentEntry>> = self.gh_json(
            &["api", &self.api_path(&format!("contents/{dir}"))],
            "directory listing",
        );
        match result {
            Ok(entries) => Ok(entries
                .into_iter()
                .filter(|e| e.kind == "file")
                .map(|e| e.name)
                .collect()),
            Err(e) if is_http_status(&e, 404) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn get_file(&self, path: &str) -> Result<Option<FileContent>> {
        let result: Result<GhFile> = self.gh_json(
            &["api", &self.api_path(&format!("contents/{path}"))],
            "file contents",
        );
        let file = match result {
            Ok(file) => file,
            Err(e) if is_http_status(&e, 404) => return Ok(None),
            Err(e) => return Err(e),
        };

        let packed: String = file.content.split_whitespace().collect();
        let bytes = BASE64
            .decode(packed)
            .map_err(|e| TrackerError::Unexpected(format!("invalid base64 in {path}: {e}")))?;
        Ok(Some(FileContent {
            text: String::from_utf8_lossy(&bytes).to_string(),
            sha: file.sha,
        }))
    }

    fn put_file(&self, path: &str, content: &str, message: &str, sha: Option<&str>) -> Result<()> {
        let endpoint = self.api_path(&format!("contents/{path}"));
        let content_field = format!("content={}", BASE64.encode(content.as_bytes()));
        let message_field = format!("message={message}");

        let mut args: Vec<&str> = vec![
            "api",
            "-X",
            "PUT",
            &endpoint,
            "-f",
            &message_field,
            "-f",
            &content_field,
        ];
        let sha_field = sha.map(|s| format!("sha={s}"));
        if let Some(field) = &sha_field {
            args.push("-f");
            args.push(field);
        }
        self.gh(&args)?;
        Ok(())
    }

    fn delete_file(&self, path: &str, sha: &str, message: &str) -> Result<()> {
        self.gh(&[
            "api",
            "-X",
            "DELETE",
            &self.api_path(&format!("contents/{path}")),
            "-f",
            &format!("message={message}"),
            "-f",
            &format!("sha={sha}"),
        ])?;
        Ok(())
    }

    fn post_comment(&self, number: u64, body: &str) -> Result<()> {
        self.gh(&[
            "api",
            &self.api_path(&format!("issues/{number}/comments")),
            "-f",
            &format!("body={body}"),
        ])?;
        Ok(())
    }

    fn list_comments(&self, number: u64) -> Result<Vec<Comment>> {
        let comments: Vec<GhComment> = self.gh_json_pages(
            &[
                "api",
                "--paginate",
                &self.api_path(&format!("issues/{number}/comments")),
            ],
            "issue comments",
        )?;
        Ok(comments
            .into_iter()
            .map(|c| Comment {
                author: c.user.map(|u| u.login).unwrap_or_default(),
                body: c.body,
                created_at: c.created_at,
            })
            .collect())
    }

    fn agent_events(&self, pr_number: u64) -> Result<Vec<AgentEvent>> {
        let events = self.timeline(pr_number)?;
        let mut out = Vec::new();
        for event in events {
            let kind = match event.event.as_str() {
                AGENT_STARTED_EVENT => AgentEventKind::Started,
                AGENT_FINISHED_EVENT => AgentEventKind::Succeeded,
                AGENT_FAILED_EVENT => AgentEventKind::Failed,
                _ => continue,
            };
            let Some(at) = event.created_at else {
                continue;
            };
            out.push(AgentEvent { kind, at });
        }
        out.sort_by_key(|e| e.at);
        Ok(out)
    }
}

// ── Wire shapes ──

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    labels: Vec<GhLabel>,
    #[serde(default)]
    assignees: Vec<GhUser>,
    state: String,
}

impl GhIssue {
    fn into_issue(self) -> Issue {
        Issue {
            number: self.number,
            title: self.title,
            body: self.body,
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            assignees: self.assignees.into_iter().map(|a| a.login).collect(),
            state: if self.state.eq_ignore_ascii_case("open") {
                IssueState::Open
            } else {
                IssueState::Closed
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhSearchHit {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct GhPull {
    number: u64,
    title: String,
    html_url: String,
    state: String,
    draft: bool,
    merged: bool,
    mergeable: Option<bool>,
    mergeable_state: Option<String>,
    head: GhBranch,
    base: GhBaseBranch,
}

impl GhPull {
    fn into_pull_request(self) -> PullRequest {
        PullRequest {
            number: self.number,
            title: self.title,
            url: self.html_url,
            state: self.state,
            is_draft: self.draft,
            merged: self.merged,
            mergeable: self.mergeable,
            mergeable_state: self.mergeable_state,
            head_ref: self.head.r#ref,
            // A deleted fork leaves head.repo null.
            head_repo: self.head.repo.map(|r| r.full_name).unwrap_or_default(),
            base_ref: self.base.r#ref,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhBranch {
    r#ref: String,
    repo: Option<GhRepo>,
}

#[derive(Debug, Deserialize)]
struct GhBaseBranch {
    r#ref: String,
}

#[derive(Debug, Deserialize)]
struct GhRepo {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct GhRequestedReviewers {
    #[serde(default)]
    users: Vec<GhUser>,
    #[serde(default)]
    teams: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GhTimelineEvent {
    event: String,
    source: Option<GhTimelineSource>,
    created_at: Option<jiff::Timestamp>,
}

#[derive(Debug, Deserialize)]
struct GhTimelineSource {
    issue: Option<GhTimelineIssue>,
}

#[derive(Debug, Deserialize)]
struct GhTimelineIssue {
    number: u64,
    pull_request: Option<serde_json::Value>,
    repository: Option<GhRepo>,
}

#[derive(Debug, Deserialize)]
struct GhContentEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct GhFile {
    content: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhComment {
    user: Option<GhUser>,
    body: String,
    created_at: jiff::Timestamp,
}
