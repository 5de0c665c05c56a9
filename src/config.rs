use crate::queue::DueQuery;
use crate::scheduler::SchedulerParams;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// User whose progress the CLI works on (default: "local")
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Ease factor for new cards (default: 2.5)
    #[serde(default = "default_ease_factor")]
    pub default_ease_factor: f64,

    /// Lower bound for the ease factor (default: 1.3)
    #[serde(default = "default_minimum_ease_factor")]
    pub minimum_ease_factor: f64,

    /// Interval in days after a successful first review (default: 1)
    #[serde(default = "default_initial_interval")]
    pub initial_interval_days: f64,

    /// Interval in days after a failed first review, and the floor for all intervals (default: 0.1)
    #[serde(default = "default_lapse_interval")]
    pub lapse_interval_days: f64,

    /// Cards with shorter intervals are still learning (default: 4)
    #[serde(default = "default_graduation_interval")]
    pub graduation_interval_days: f64,

    /// Upper bound for all intervals in days (default: 36500)
    #[serde(default = "default_maximum_interval")]
    pub maximum_interval_days: f64,

    /// Maximum number of cards offered per review queue (default: unlimited)
    #[serde(default)]
    pub daily_review_limit: Option<usize>,

    /// Only review cards in these topics (default: all topics)
    #[serde(default)]
    pub topic_filters: Vec<String>,

    /// Path to database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_ease_factor() -> f64 {
    SchedulerParams::default().default_ease_factor
}

fn default_minimum_ease_factor() -> f64 {
    SchedulerParams::default().minimum_ease_factor
}

fn default_initial_interval() -> f64 {
    SchedulerParams::default().initial_interval_days
}

fn default_lapse_interval() -> f64 {
    SchedulerParams::default().minimum_interval_days
}

fn default_graduation_interval() -> f64 {
    SchedulerParams::default().graduation_interval_days
}

fn default_maximum_interval() -> f64 {
    SchedulerParams::default().maximum_interval_days
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("flashrep").join("flashrep.db"))
        .unwrap_or_else(|| PathBuf::from("flashrep.db"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            default_ease_factor: default_ease_factor(),
            minimum_ease_factor: default_minimum_ease_factor(),
            initial_interval_days: default_initial_interval(),
            lapse_interval_days: default_lapse_interval(),
            graduation_interval_days: default_graduation_interval(),
            maximum_interval_days: default_maximum_interval(),
            daily_review_limit: None,
            topic_filters: Vec::new(),
            db_path: default_db_path(),
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(suffix) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(suffix);
    }
    path.to_path_buf()
}

impl Config {
    /// Load config from the default location or return defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        config.db_path = expand_tilde(&config.db_path);
        config.validate()?;

        Ok(config)
    }

    /// Path to config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("flashrep").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Reject parameters that would break the scheduling floors
    fn validate(&self) -> Result<()> {
        if !self.minimum_ease_factor.is_finite() || self.minimum_ease_factor <= 0.0 {
            anyhow::bail!("minimum_ease_factor must be positive");
        }
        if self.default_ease_factor < self.minimum_ease_factor {
            anyhow::bail!("default_ease_factor must not be below minimum_ease_factor");
        }
        if !self.lapse_interval_days.is_finite() || self.lapse_interval_days <= 0.0 {
            anyhow::bail!("lapse_interval_days must be positive");
        }
        if self.initial_interval_days < self.lapse_interval_days {
            anyhow::bail!("initial_interval_days must not be below lapse_interval_days");
        }
        if self.graduation_interval_days < self.lapse_interval_days {
            anyhow::bail!("graduation_interval_days must not be below lapse_interval_days");
        }
        if !self.maximum_interval_days.is_finite()
            || self.maximum_interval_days < self.initial_interval_days
            || self.maximum_interval_days < self.graduation_interval_days
        {
            anyhow::bail!(
                "maximum_interval_days must be finite and not below the initial or graduation interval"
            );
        }
        Ok(())
    }

    pub fn scheduler_params(&self) -> SchedulerParams {
        SchedulerParams {
            default_ease_factor: self.default_ease_factor,
            minimum_ease_factor: self.minimum_ease_factor,
            initial_interval_days: self.initial_interval_days,
            minimum_interval_days: self.lapse_interval_days,
            graduation_interval_days: self.graduation_interval_days,
            maximum_interval_days: self.maximum_interval_days,
        }
    }

    pub fn due_query(&self) -> DueQuery {
        DueQuery {
            topics: self.topic_filters.clone(),
            limit: self.daily_review_limit,
        }
    }

    /// Ensure the database directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(())
    }
}
