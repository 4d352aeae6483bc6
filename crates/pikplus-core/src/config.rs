use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::filter::UrlMatch;
use crate::pagination::{
  DEFAULT_MAX_VISIBLE,
  PageSizeChoices
};
use crate::view::ViewOptions;

const DEFAULTS: [(&str, &str); 9] = [
  ("data.location", "~/.pikplus"),
  ("page.size", "25"),
  ("page.sizes", "10,25,50,100"),
  ("page.max_visible", "7"),
  ("filter.mine_only", "off"),
  ("filter.content", "off"),
  ("filter.wordlist", ""),
  ("url.match", "exact"),
  ("color", "on")
];

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    for (key, value) in DEFAULTS {
      cfg.map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading pikplusrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no pikplusrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `None` when the key is unset; a
  /// value that is not a switch is an
  /// error.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|v| {
        parse_bool(v).ok_or_else(|| {
          anyhow!(
            "invalid switch for {key}: \
             {v} (expected on/off)"
          )
        })
      })
      .transpose()
  }

  pub fn get_u32(
    &self,
    key: &str
  ) -> anyhow::Result<u32> {
    let raw =
      self.get(key).ok_or_else(|| {
        anyhow!("missing config key {key}")
      })?;
    raw.trim().parse::<u32>().with_context(
      || {
        format!(
          "invalid number for {key}: \
           {raw}"
        )
      }
    )
  }

  pub fn page_size(
    &self
  ) -> anyhow::Result<u32> {
    let size = self.get_u32("page.size")?;
    let choices = self.page_sizes()?;
    if !choices.contains(size) {
      return Err(anyhow!(
        "page.size {size} is not listed \
         in page.sizes {:?}",
        choices.as_slice()
      ));
    }
    Ok(size)
  }

  pub fn page_sizes(
    &self
  ) -> anyhow::Result<PageSizeChoices> {
    let raw = self
      .get("page.sizes")
      .unwrap_or_default();
    let mut sizes = Vec::new();
    for part in raw
      .split(',')
      .map(str::trim)
      .filter(|p| !p.is_empty())
    {
      sizes.push(
        part.parse::<u32>().with_context(
          || {
            format!(
              "invalid entry in \
               page.sizes: {part}"
            )
          }
        )?
      );
    }
    PageSizeChoices::new(sizes)
  }

  pub fn url_match(
    &self
  ) -> anyhow::Result<UrlMatch> {
    self
      .get("url.match")
      .unwrap_or_else(|| {
        "exact".to_string()
      })
      .parse()
  }

  pub fn wordlist_path(
    &self
  ) -> Option<PathBuf> {
    self
      .get("filter.wordlist")
      .filter(|v| !v.trim().is_empty())
      .map(|v| {
        expand_tilde(Path::new(v.trim()))
      })
  }

  pub fn view_options(
    &self
  ) -> anyhow::Result<ViewOptions> {
    let max_visible =
      match self.get("page.max_visible") {
        | Some(_) => {
          self.get_u32("page.max_visible")?
        }
        | None => DEFAULT_MAX_VISIBLE
      };

    Ok(ViewOptions {
      show_mine_only: self
        .get_bool("filter.mine_only")?
        .unwrap_or(false),
      content_filter: self
        .get_bool("filter.content")?
        .unwrap_or(false),
      url_match: self.url_match()?,
      max_visible,
      variant: None
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("PIKPLUSRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate =
    home.join(".pikplusrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".pikplus"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s.trim().to_ascii_lowercase().as_str()
  {
    | "1" | "y" | "yes" | "on" | "true" => {
      Some(true)
    }
    | "0" | "n" | "no" | "off" | "false" => {
      Some(false)
    }
    | _ => None
  }
}
