use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{
  Context,
  anyhow
};
use regex::Regex;
use tracing::{
  debug,
  trace
};

use crate::record::{
  LocalTask,
  TaskRecord,
  display_name
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum UrlMatch {
  #[default]
  Exact,
  Normalized
}

impl std::str::FromStr for UrlMatch {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "exact" => Ok(Self::Exact),
      | "normalized" | "normalised" => {
        Ok(Self::Normalized)
      }
      | other => Err(anyhow!(
        "invalid url.match setting: \
         {other}"
      ))
    }
  }
}

impl UrlMatch {
  pub fn key(
    &self,
    url: &str
  ) -> String {
    match self {
      | Self::Exact => url.to_string(),
      | Self::Normalized => {
        normalize_url(url)
      }
    }
  }
}

/// Trims, lowercases the scheme and the
/// magnet info-hash, and drops a
/// trailing slash. Everything else in
/// the link is left as-is.
pub fn normalize_url(url: &str) -> String {
  let trimmed =
    url.trim().trim_end_matches('/');

  let Some((scheme, rest)) =
    trimmed.split_once(':')
  else {
    return trimmed.to_string();
  };
  let scheme =
    scheme.to_ascii_lowercase();

  if scheme != "magnet" {
    return format!("{scheme}:{rest}");
  }

  let query = rest
    .split('&')
    .map(|part| {
      let lower =
        part.to_ascii_lowercase();
      if lower.starts_with("xt=")
        || lower.starts_with("?xt=")
      {
        lower
      } else {
        part.to_string()
      }
    })
    .collect::<Vec<_>>()
    .join("&");

  format!("{scheme}:{query}")
}

pub fn local_url_set(
  local: &[LocalTask]
) -> BTreeSet<String> {
  local
    .iter()
    .map(|task| task.url.clone())
    .collect()
}

pub fn tag_local_ownership(
  tasks: &[TaskRecord],
  local_urls: &BTreeSet<String>,
  mode: UrlMatch
) -> Vec<TaskRecord> {
  let keys: BTreeSet<String> =
    match mode {
      | UrlMatch::Exact => {
        local_urls.clone()
      }
      | UrlMatch::Normalized => {
        local_urls
          .iter()
          .map(|url| normalize_url(url))
          .collect()
      }
    };

  tasks
    .iter()
    .map(|task| {
      let mut tagged = task.clone();
      tagged.is_local =
        keys.contains(&mode.key(&task.url));
      tagged
    })
    .collect()
}

pub fn filter_by_ownership(
  tasks: Vec<TaskRecord>,
  show_mine_only: bool
) -> Vec<TaskRecord> {
  if !show_mine_only {
    return tasks;
  }

  tasks
    .into_iter()
    .filter(|task| task.is_local)
    .collect()
}

/// Pass/fail decision on a task's
/// display name.
pub trait ContentPolicy {
  fn is_flagged(
    &self,
    name: &str
  ) -> bool;
}

impl<F> ContentPolicy for F
where
  F: Fn(&str) -> bool
{
  fn is_flagged(
    &self,
    name: &str
  ) -> bool {
    self(name)
  }
}

pub fn filter_by_content_policy<P>(
  tasks: Vec<TaskRecord>,
  enabled: bool,
  policy: &P
) -> Vec<TaskRecord>
where
  P: ContentPolicy + ?Sized
{
  if !enabled {
    return tasks;
  }

  let before = tasks.len();
  let kept: Vec<TaskRecord> = tasks
    .into_iter()
    .filter(|task| {
      let name = display_name(task);
      let flagged =
        policy.is_flagged(&name);
      if flagged {
        trace!(id = %task.id, "hidden by content policy");
      }
      !flagged
    })
    .collect();

  debug!(
    before,
    after = kept.len(),
    "applied content policy"
  );
  kept
}

/// Case-insensitive word list. ASCII
/// words match on word boundaries
/// where their edge is a word character;
/// other scripts match as substrings.
#[derive(Debug, Clone)]
pub struct WordListPolicy {
  pattern: Option<Regex>,
  words:   usize
}

fn is_word_char(ch: char) -> bool {
  ch.is_ascii_alphanumeric() || ch == '_'
}

fn word_pattern(word: &str) -> String {
  let escaped = regex::escape(word);
  if !word.is_ascii() {
    return escaped;
  }

  // `\b` next to `+` or `#` would demand a
  // word character on the other side.
  let lead = word
    .chars()
    .next()
    .is_some_and(is_word_char);
  let tail = word
    .chars()
    .last()
    .is_some_and(is_word_char);
  format!(
    "{}{escaped}{}",
    if lead { r"\b" } else { "" },
    if tail { r"\b" } else { "" }
  )
}

impl WordListPolicy {
  pub fn new<I, S>(
    words: I
  ) -> anyhow::Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>
  {
    let alternatives: Vec<String> =
      words
        .into_iter()
        .map(|w| w.as_ref().trim().to_string())
        .filter(|w| !w.is_empty())
        .map(|w| word_pattern(&w))
        .collect();

    if alternatives.is_empty() {
      return Ok(Self {
        pattern: None,
        words:   0
      });
    }

    let source = format!(
      "(?i)(?:{})",
      alternatives.join("|")
    );
    let pattern = Regex::new(&source)
      .context(
        "failed to compile word list"
      )?;

    Ok(Self {
      pattern: Some(pattern),
      words:   alternatives.len()
    })
  }

  pub fn empty() -> Self {
    Self {
      pattern: None,
      words:   0
    }
  }

  /// One word per line; `#` starts a
  /// comment line.
  pub fn parse(
    text: &str
  ) -> anyhow::Result<Self> {
    Self::new(
      text
        .lines()
        .map(str::trim)
        .filter(|line| {
          !line.is_empty()
            && !line.starts_with('#')
        })
    )
  }

  #[tracing::instrument]
  pub fn load(
    path: &Path
  ) -> anyhow::Result<Self> {
    let text = fs::read_to_string(path)
      .with_context(|| {
        format!(
          "failed to read word list {}",
          path.display()
        )
      })?;
    let policy = Self::parse(&text)?;
    debug!(
      words = policy.words,
      "loaded content word list"
    );
    Ok(policy)
  }

  pub fn len(&self) -> usize {
    self.words
  }

  pub fn is_empty(&self) -> bool {
    self.words == 0
  }
}

impl ContentPolicy for WordListPolicy {
  fn is_flagged(
    &self,
    name: &str
  ) -> bool {
    self
      .pattern
      .as_ref()
      .is_some_and(|re| re.is_match(name))
  }
}
