use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

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

use crate::remote::{
  DEFAULT_API_BASE,
  PLACEHOLDER_API_KEY,
  SheetsSettings
};

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

const DEFAULTS: &[(&str, &str)] = &[
  ("data.location", "~/.sitetrack"),
  ("sheets.api_base", DEFAULT_API_BASE),
  ("sheets.spreadsheet_id", ""),
  ("sheets.api_key", PLACEHOLDER_API_KEY),
  ("sheets.sheet_name", "Sheet1"),
  ("sheets.timeout_secs", "30"),
  ("script.url", ""),
  ("sync.push_mode", "sheet"),
  ("sync.auto", "off"),
  ("sync.interval_secs", "300"),
  ("progress.areas", "TEMPLE,PRASADAM"),
  ("color", "on")
];

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading config");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no sitetrackrc found; using \
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
      debug!(key = %key, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<u64>().with_context(
          || {
            format!(
              "config key {key} must be \
               a whole number, got {v}"
            )
          }
        )
      })
      .transpose()
  }

  /// Comma-separated list, blanks dropped.
  pub fn get_list(
    &self,
    key: &str
  ) -> Vec<String> {
    self
      .map
      .get(key)
      .map(|raw| {
        raw
          .split(',')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default()
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
        line.split_once(" #")
      {
        line = before.trim();
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
      trace!(key = %key, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum PushMode {
  /// Look the row up and PUT/append
  /// against the values endpoint.
  Sheet,
  /// POST the task to a script
  /// endpoint.
  Script
}

/// Typed view of the sync-related keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
  pub sheets:         SheetsSettings,
  pub script_url:     String,
  pub push_mode:      PushMode,
  pub auto_sync:      bool,
  pub auto_interval:  Duration,
  pub progress_areas: Vec<String>
}

impl SyncSettings {
  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    let timeout = cfg
      .get_u64("sheets.timeout_secs")?
      .unwrap_or(30);
    let interval = cfg
      .get_u64("sync.interval_secs")?
      .unwrap_or(300);
    if interval == 0 {
      return Err(anyhow!(
        "sync.interval_secs must be \
         greater than zero"
      ));
    }

    let push_mode = match cfg
      .get("sync.push_mode")
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "" | "sheet" => PushMode::Sheet,
      | "script" => PushMode::Script,
      | other => {
        return Err(anyhow!(
          "invalid sync.push_mode: \
           {other} (expected sheet or \
           script)"
        ));
      }
    };

    let api_key = cfg
      .get("sheets.api_key")
      .filter(|k| !k.trim().is_empty());

    Ok(Self {
      sheets: SheetsSettings {
        api_base: cfg
          .get("sheets.api_base")
          .unwrap_or_else(|| {
            DEFAULT_API_BASE.to_string()
          }),
        spreadsheet_id: cfg
          .get("sheets.spreadsheet_id")
          .unwrap_or_default(),
        api_key,
        sheet_name: cfg
          .get("sheets.sheet_name")
          .unwrap_or_else(|| {
            "Sheet1".to_string()
          }),
        timeout: Duration::from_secs(
          timeout
        )
      },
      script_url: cfg
        .get("script.url")
        .unwrap_or_default(),
      push_mode,
      auto_sync: cfg
        .get_bool("sync.auto")
        .unwrap_or(false),
      auto_interval: Duration::from_secs(
        interval
      ),
      progress_areas: cfg
        .get_list("progress.areas")
    })
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
    std::env::var("SITETRACKRC")
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
    home.join(".sitetrackrc");
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
  Ok(home.join(".sitetrack"))
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

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
