use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::Arc;
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
  CommandToken,
  EnvToken,
  TokenProvider
};
use crate::sync::ConflictPolicy;

pub const DEFAULT_BACKEND_URL: &str =
  "http://localhost:8000";
pub const DEFAULT_TOKEN_ENV: &str =
  "SOLACE_TOKEN";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rcfile_override
  ))]
  pub fn load(
    rcfile_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();

    let rcfile = resolve_rcfile_path(
      rcfile_override
    )?;
    if let Some(path) = rcfile {
      info!(rcfile = %path.display(), "loading solacerc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no solacerc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    for (key, value) in [
      ("backend.url", DEFAULT_BACKEND_URL),
      ("backend.timeout", "30"),
      ("auth.token_env", DEFAULT_TOKEN_ENV),
      ("sync.on_conflict", "reject"),
      ("default.command", "checkins"),
      ("color", "on")
    ] {
      cfg
        .map
        .insert(key.to_string(), value.to_string());
    }

    cfg
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

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  pub fn backend_url(&self) -> String {
    self
      .get("backend.url")
      .filter(|url| !url.trim().is_empty())
      .unwrap_or_else(|| {
        DEFAULT_BACKEND_URL.to_string()
      })
  }

  pub fn timeout(
    &self
  ) -> anyhow::Result<Duration> {
    let Some(raw) =
      self.get("backend.timeout")
    else {
      return Ok(Duration::from_secs(
        DEFAULT_TIMEOUT_SECS
      ));
    };
    let secs =
      raw.trim().parse::<u64>().map_err(
        |_| {
          anyhow!(
            "invalid backend.timeout \
             value: {raw}"
          )
        }
      )?;
    if secs == 0 {
      return Err(anyhow!(
        "backend.timeout must be at \
         least 1 second"
      ));
    }
    Ok(Duration::from_secs(secs))
  }

  pub fn conflict_policy(
    &self
  ) -> anyhow::Result<ConflictPolicy> {
    self
      .get("sync.on_conflict")
      .map(|raw| {
        raw.parse::<ConflictPolicy>()
      })
      .transpose()
      .map(Option::unwrap_or_default)
  }

  pub fn user_id(
    &self
  ) -> anyhow::Result<String> {
    self
      .get("user.id")
      .map(|id| id.trim().to_string())
      .filter(|id| !id.is_empty())
      .ok_or_else(|| {
        anyhow!(
          "user.id is not configured; \
           set it in ~/.solacerc or \
           pass rc.user.id=<id>"
        )
      })
  }

  /// A token command takes precedence
  /// over the environment variable.
  pub fn token_provider(
    &self
  ) -> Arc<dyn TokenProvider> {
    if let Some(command) = self
      .get("auth.token_command")
      .filter(|cmd| !cmd.trim().is_empty())
    {
      debug!("using token command");
      return Arc::new(CommandToken {
        command
      });
    }

    let var = self
      .get("auth.token_env")
      .filter(|var| !var.trim().is_empty())
      .unwrap_or_else(|| {
        DEFAULT_TOKEN_ENV.to_string()
      });
    debug!(var = %var, "using token environment variable");
    Arc::new(EnvToken {
      var
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
      trace!(key = %key, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rcfile_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("SOLACERC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory"
    );
    return Ok(None);
  };
  let candidate = home.join(".solacerc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
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
