//! Classification and field extraction for the two supported payload shapes.
//!
//! Payloads deserialize into raw structs whose fields are all optional, then
//! the required ones are pulled out through [`require`] so that any missing
//! field is reported with its full dotted path. Deliveries that are valid
//! but uninteresting (tag pushes, filtered actions, ...) come back as
//! [`Extraction::Ignored`], which is not an error.

use serde::Deserialize;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::events::{Event, EventKind};

/// Failure to extract an [`Event`] out of a delivery payload.
#[derive(Debug, Error)]
pub enum PayloadParseError {
    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing or invalid field `{0}`")]
    MissingField(&'static str),
}

/// Outcome of classifying an authenticated delivery.
#[derive(Debug)]
pub enum Extraction {
    Accepted(Event),
    /// The delivery is well-formed but doesn't produce an event. The reason
    /// is only there for the log.
    Ignored(&'static str),
}

pub(crate) fn extract(
    kind: EventKind,
    body: &[u8],
    config: &ServerConfig,
) -> Result<Extraction, PayloadParseError> {
    match kind {
        EventKind::Push => extract_push(serde_json::from_slice(body)?, config),
        EventKind::PullRequest => extract_pull_request(serde_json::from_slice(body)?, config),
    }
}

fn require<T>(field: Option<T>, path: &'static str) -> Result<T, PayloadParseError> {
    field.ok_or(PayloadParseError::MissingField(path))
}

/// Returns the branch (or tag) name a push ref points at, or `None` when the
/// ref is of no interest.
///
/// The name is the ref minus whichever prefix actually matched; tag refs
/// carry a prefix one byte shorter than branch refs, so slicing at a fixed
/// offset would eat the first character of every tag name.
fn branch_of_ref(raw_ref: &str, ignore_tags: bool) -> Option<&str> {
    if let Some(branch) = raw_ref.strip_prefix("refs/heads/") {
        return Some(branch);
    }
    if !ignore_tags {
        if let Some(tag) = raw_ref.strip_prefix("refs/tags/") {
            return Some(tag);
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct RawPush {
    r#ref: Option<String>,
    // Absent or null for pushes that carry no commit, e.g. branch deletions.
    head_commit: Option<RawCommit>,
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: Option<String>,
    owner: Option<RawOwner>,
}

/// Push payloads name the repository owner under `name`, pull request
/// payloads under `login`.
#[derive(Debug, Deserialize)]
struct RawOwner {
    name: Option<String>,
    login: Option<String>,
}

fn extract_push(
    raw: RawPush,
    config: &ServerConfig,
) -> Result<Extraction, PayloadParseError> {
    let raw_ref = require(raw.r#ref, "ref")?;

    let branch = match branch_of_ref(&raw_ref, config.ignore_tags) {
        Some(name) => name.to_owned(),
        None => return Ok(Extraction::Ignored("ref is neither a branch nor a kept tag")),
    };

    let head_commit = match raw.head_commit {
        Some(commit) => commit,
        None => return Ok(Extraction::Ignored("push carries no head commit")),
    };

    let repository = require(raw.repository, "repository")?;
    let owner = require(repository.owner, "repository.owner")?;

    Ok(Extraction::Accepted(Event {
        kind: EventKind::Push,
        owner: require(owner.name, "repository.owner.name")?,
        repo: require(repository.name, "repository.name")?,
        branch,
        commit: require(head_commit.id, "head_commit.id")?,
        action: String::new(),
        base_owner: String::new(),
        base_repo: String::new(),
        base_branch: String::new(),
    }))
}

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: Option<String>,
    pull_request: Option<RawPullRequest>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    head: Option<RawPrRef>,
    base: Option<RawPrRef>,
}

#[derive(Debug, Deserialize)]
struct RawPrRef {
    r#ref: Option<String>,
    sha: Option<String>,
    repo: Option<RawRepository>,
}

fn extract_pull_request(
    raw: RawPullRequestPayload,
    config: &ServerConfig,
) -> Result<Extraction, PayloadParseError> {
    let action = require(raw.action, "action")?;

    if !config.action_allowed(&action) {
        return Ok(Extraction::Ignored("action is not in the allow-list"));
    }

    let pull_request = require(raw.pull_request, "pull_request")?;
    let head = require(pull_request.head, "pull_request.head")?;
    let base = require(pull_request.base, "pull_request.base")?;

    let head_repo = require(head.repo, "pull_request.head.repo")?;
    let head_owner = require(head_repo.owner, "pull_request.head.repo.owner")?;
    let base_repo = require(base.repo, "pull_request.base.repo")?;
    let base_owner = require(base_repo.owner, "pull_request.base.repo.owner")?;

    Ok(Extraction::Accepted(Event {
        kind: EventKind::PullRequest,
        owner: require(head_owner.login, "pull_request.head.repo.owner.login")?,
        repo: require(head_repo.name, "pull_request.head.repo.name")?,
        branch: require(head.r#ref, "pull_request.head.ref")?,
        commit: require(head.sha, "pull_request.head.sha")?,
        action,
        base_owner: require(base_owner.login, "pull_request.base.repo.owner.login")?,
        base_repo: require(base_repo.name, "pull_request.base.repo.name")?,
        base_branch: require(base.r#ref, "pull_request.base.ref")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_json(
        kind: EventKind,
        body: serde_json::Value,
        config: &ServerConfig,
    ) -> Result<Extraction, PayloadParseError> {
        extract(kind, body.to_string().as_bytes(), config)
    }

    fn push_payload(raw_ref: &str) -> serde_json::Value {
        serde_json::json!({
            "ref": raw_ref,
            "head_commit": { "id": "abc123" },
            "repository": { "name": "r", "owner": { "name": "o" } },
        })
    }

    fn pull_request_payload(action: &str) -> serde_json::Value {
        serde_json::json!({
            "action": action,
            "pull_request": {
                "head": {
                    "ref": "feature",
                    "sha": "def456",
                    "repo": { "name": "fork", "owner": { "login": "contributor" } },
                },
                "base": {
                    "ref": "main",
                    "sha": "abc123",
                    "repo": { "name": "upstream", "owner": { "login": "octocat" } },
                },
            },
        })
    }

    fn accepted(extraction: Extraction) -> Event {
        match extraction {
            Extraction::Accepted(event) => event,
            Extraction::Ignored(reason) => panic!("delivery was ignored: {}", reason),
        }
    }

    #[test]
    fn test_branch_push_is_accepted() {
        let config = ServerConfig::default();
        let event = accepted(
            extract_json(EventKind::Push, push_payload("refs/heads/main"), &config).unwrap(),
        );

        assert_eq!(event.kind, EventKind::Push);
        assert_eq!(event.owner, "o");
        assert_eq!(event.repo, "r");
        assert_eq!(event.branch, "main");
        assert_eq!(event.commit, "abc123");
        assert_eq!(event.action, "");
        assert_eq!(event.base_owner, "");
    }

    #[test]
    fn test_nested_branch_name_keeps_its_slashes() {
        let config = ServerConfig::default();
        let event = accepted(
            extract_json(
                EventKind::Push,
                push_payload("refs/heads/feature/login"),
                &config,
            )
            .unwrap(),
        );
        assert_eq!(event.branch, "feature/login");
    }

    #[test]
    fn test_tag_push_is_ignored_by_default() {
        let config = ServerConfig::default();
        let extraction =
            extract_json(EventKind::Push, push_payload("refs/tags/v1.0"), &config).unwrap();
        assert!(matches!(extraction, Extraction::Ignored(_)));
    }

    #[test]
    fn test_tag_push_keeps_its_full_name_when_tags_are_kept() {
        let config = ServerConfig {
            ignore_tags: false,
            ..ServerConfig::default()
        };
        let event = accepted(
            extract_json(EventKind::Push, push_payload("refs/tags/v1.0"), &config).unwrap(),
        );
        // The tag prefix is one byte shorter than the branch prefix; make
        // sure the name doesn't come out as "1.0".
        assert_eq!(event.branch, "v1.0");
    }

    #[test]
    fn test_merge_ref_push_is_ignored() {
        let config = ServerConfig {
            ignore_tags: false,
            ..ServerConfig::default()
        };
        let extraction =
            extract_json(EventKind::Push, push_payload("refs/pull/3/merge"), &config).unwrap();
        assert!(matches!(extraction, Extraction::Ignored(_)));
    }

    #[test]
    fn test_push_without_head_commit_is_ignored() {
        let config = ServerConfig::default();

        for payload in [
            serde_json::json!({
                "ref": "refs/heads/main",
                "head_commit": null,
                "repository": { "name": "r", "owner": { "name": "o" } },
            }),
            serde_json::json!({
                "ref": "refs/heads/main",
                "repository": { "name": "r", "owner": { "name": "o" } },
            }),
        ] {
            let extraction = extract_json(EventKind::Push, payload, &config).unwrap();
            assert!(matches!(extraction, Extraction::Ignored(_)));
        }
    }

    #[test]
    fn test_push_missing_owner_name_reports_path() {
        let config = ServerConfig::default();
        let payload = serde_json::json!({
            "ref": "refs/heads/main",
            "head_commit": { "id": "abc123" },
            "repository": { "name": "r", "owner": {} },
        });

        let err = extract_json(EventKind::Push, payload, &config).unwrap_err();
        assert_eq!(err.to_string(), "missing or invalid field `repository.owner.name`");
    }

    #[test]
    fn test_push_missing_ref_reports_path() {
        let config = ServerConfig::default();
        let payload = serde_json::json!({
            "head_commit": { "id": "abc123" },
            "repository": { "name": "r", "owner": { "name": "o" } },
        });

        let err = extract_json(EventKind::Push, payload, &config).unwrap_err();
        assert_eq!(err.to_string(), "missing or invalid field `ref`");
    }

    #[test]
    fn test_pull_request_is_extracted() {
        let config = ServerConfig::default();
        let event = accepted(
            extract_json(
                EventKind::PullRequest,
                pull_request_payload("opened"),
                &config,
            )
            .unwrap(),
        );

        assert_eq!(event.kind, EventKind::PullRequest);
        assert_eq!(event.owner, "contributor");
        assert_eq!(event.repo, "fork");
        assert_eq!(event.branch, "feature");
        assert_eq!(event.commit, "def456");
        assert_eq!(event.action, "opened");
        assert_eq!(event.base_owner, "octocat");
        assert_eq!(event.base_repo, "upstream");
        assert_eq!(event.base_branch, "main");
    }

    #[test]
    fn test_pull_request_without_action_is_an_error() {
        let config = ServerConfig::default();
        let mut payload = pull_request_payload("opened");
        payload.as_object_mut().unwrap().remove("action");

        let err = extract_json(EventKind::PullRequest, payload, &config).unwrap_err();
        assert_eq!(err.to_string(), "missing or invalid field `action`");
    }

    #[test]
    fn test_pull_request_missing_head_sha_reports_path() {
        let config = ServerConfig::default();
        let mut payload = pull_request_payload("opened");
        payload["pull_request"]["head"]
            .as_object_mut()
            .unwrap()
            .remove("sha");

        let err = extract_json(EventKind::PullRequest, payload, &config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing or invalid field `pull_request.head.sha`"
        );
    }

    #[test]
    fn test_allow_list_filters_actions() {
        let config = ServerConfig {
            pull_request_actions: Some(vec!["opened".to_owned(), "synchronize".to_owned()]),
            ..ServerConfig::default()
        };

        let extraction = extract_json(
            EventKind::PullRequest,
            pull_request_payload("closed"),
            &config,
        )
        .unwrap();
        assert!(matches!(extraction, Extraction::Ignored(_)));

        let event = accepted(
            extract_json(
                EventKind::PullRequest,
                pull_request_payload("opened"),
                &config,
            )
            .unwrap(),
        );
        assert_eq!(event.action, "opened");
    }

    #[test]
    fn test_every_action_is_accepted_without_an_allow_list() {
        let config = ServerConfig::default();
        for action in ["opened", "closed", "synchronize", "labeled"] {
            let event = accepted(
                extract_json(EventKind::PullRequest, pull_request_payload(action), &config)
                    .unwrap(),
            );
            assert_eq!(event.action, action);
        }
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let config = ServerConfig::default();
        let err = extract(EventKind::Push, b"{not json", &config).unwrap_err();
        assert!(matches!(err, PayloadParseError::Json(_)));
    }
}
