use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

/// Width of the label column in the text encoding, `"type:   "` through
/// `"bbranch:"` included.
const LABEL_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Push,
    PullRequest,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" => Ok(EventKind::PullRequest),
            other => Err(FormatError::UnknownEventType(other.to_owned())),
        }
    }
}

/// A normalized webhook delivery.
///
/// Built once per accepted delivery and never mutated afterwards: the
/// endpoint moves it into the dispatch queue by value and a consumer reads it
/// exactly once. The `action` and `base_*` fields are only populated for
/// pull requests and stay empty for pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Username owning the repository the event happened on (for pull
    /// requests, the owner of the head repository).
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Head commit hash attached to the event.
    pub commit: String,
    /// Pull request action ("opened", "synchronize", "closed", ...).
    pub action: String,
    pub base_owner: String,
    pub base_repo: String,
    pub base_branch: String,
}

/// Failure to decode the text form of an [`Event`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("expected 5, 8 or 9 lines, found {0}")]
    LineCount(usize),
    #[error("line {0} is shorter than its field label")]
    LineTooShort(usize),
    #[error("unknown event type `{0}`")]
    UnknownEventType(String),
}

impl Display for Event {
    /// Encodes the event in its canonical text form, one `label: value` line
    /// per field with the label padded to a fixed width. Pushes take 5
    /// lines, pull requests 9.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "type:   {}", self.kind)?;
        writeln!(f, "owner:  {}", self.owner)?;
        writeln!(f, "repo:   {}", self.repo)?;
        writeln!(f, "branch: {}", self.branch)?;
        writeln!(f, "commit: {}", self.commit)?;

        if self.kind == EventKind::PullRequest {
            writeln!(f, "action: {}", self.action)?;
            writeln!(f, "bowner: {}", self.base_owner)?;
            writeln!(f, "brepo:  {}", self.base_repo)?;
            writeln!(f, "bbranch:{}", self.base_branch)?;
        }

        Ok(())
    }
}

impl FromStr for Event {
    type Err = FormatError;

    /// Decodes the text form produced by [`Event`]'s `Display` impl.
    ///
    /// Accepts the 5-line push form, the 9-line pull request form, and the
    /// legacy 8-line pull request form that predates the action line (the
    /// decoded `action` is empty in that case).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_matches(|c| c == '\n' || c == '\t' || c == ' ');
        let lines: Vec<&str> = s.split('\n').collect();

        let count = lines.len();
        if count != 5 && count != 8 && count != 9 {
            return Err(FormatError::LineCount(count));
        }

        // Values start right after the label column; `get` also rejects a
        // split inside a multi-byte character.
        let value = |index: usize| -> Result<String, FormatError> {
            lines[index]
                .get(LABEL_WIDTH..)
                .map(str::to_owned)
                .ok_or(FormatError::LineTooShort(index + 1))
        };

        let kind: EventKind = value(0)?.parse()?;
        let mut event = Event {
            kind,
            owner: value(1)?,
            repo: value(2)?,
            branch: value(3)?,
            commit: value(4)?,
            action: String::new(),
            base_owner: String::new(),
            base_repo: String::new(),
            base_branch: String::new(),
        };

        match kind {
            EventKind::Push => {
                if count != 5 {
                    return Err(FormatError::LineCount(count));
                }
            }
            EventKind::PullRequest => match count {
                9 => {
                    event.action = value(5)?;
                    event.base_owner = value(6)?;
                    event.base_repo = value(7)?;
                    event.base_branch = value(8)?;
                }
                // Legacy form without the action line.
                8 => {
                    event.base_owner = value(5)?;
                    event.base_repo = value(6)?;
                    event.base_branch = value(7)?;
                }
                _ => return Err(FormatError::LineCount(count)),
            },
        }

        Ok(event)
    }
}
