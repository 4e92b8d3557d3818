//! TOML-based scenario configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::ActionProfile;
use crate::chronics::{ChronicsSource, GenerationParams};
use crate::grid::{GridObjects, presets};
use crate::runner::Runner;
use crate::sim::{AgentKind, EnvBuilder, EnvParameters, RewardKind};

/// Top-level scenario configuration parsed from TOML.
///
/// All sections have defaults. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or start from a preset with
/// [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Grid to simulate.
    #[serde(default)]
    pub grid: GridConfig,
    /// Data feed, tagged by `source`.
    #[serde(default)]
    pub chronics: ChronicsSource,
    /// Rules, reward and seed of the environment.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Agent playing the episodes, tagged by `kind`.
    #[serde(default)]
    pub agent: AgentKind,
    /// Episode count, parallelism and logging.
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Built-in grid by name, or a grid description file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// One of [`presets::GRIDS`], ignored when `path` is set.
    pub name: String,
    /// JSON grid description.
    pub path: Option<PathBuf>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            name: "case14".to_string(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub reward: RewardKind,
    /// Master random seed.
    pub seed: u64,
    pub parameters: EnvParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    pub episodes: usize,
    /// Threads playing episodes (must be > 0).
    pub workers: usize,
    /// Steps cap per episode.
    pub max_iter: Option<usize>,
    /// Root of the episode logs; nothing is logged when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            episodes: 1,
            workers: 1,
            max_iter: None,
            log_dir: None,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"runner.workers"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

fn error(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError {
        field: field.to_string(),
        message: message.into(),
    }
}

impl ScenarioConfig {
    /// Five-bus grid, two daily scenarios, idle agent.
    pub fn case5() -> Self {
        Self {
            grid: GridConfig {
                name: "case5".to_string(),
                path: None,
            },
            chronics: ChronicsSource::Generated(GenerationParams {
                n_scenarios: 2,
                ..GenerationParams::default()
            }),
            ..Self::default()
        }
    }

    /// IEEE 14 bus, four daily scenarios, random redispatching.
    pub fn case14() -> Self {
        Self {
            chronics: ChronicsSource::Generated(GenerationParams {
                n_scenarios: 4,
                ..GenerationParams::default()
            }),
            agent: AgentKind::RandomRedispatch {
                probability: 0.2,
                max_mw: 5.0,
            },
            runner: RunnerConfig {
                episodes: 4,
                workers: 2,
                ..RunnerConfig::default()
            },
            ..Self::default()
        }
    }

    /// IEEE 14 bus over a week with maintenance, hazards and cooldowns,
    /// scored by redispatching cost.
    pub fn case14_realistic() -> Self {
        Self {
            chronics: ChronicsSource::Generated(GenerationParams {
                n_steps: 7 * 288,
                n_scenarios: 8,
                maintenance_rate: 0.02,
                hazard_rate: 0.000_05,
                ..GenerationParams::default()
            }),
            environment: EnvironmentConfig {
                reward: RewardKind::Redisp,
                seed: 0,
                parameters: EnvParameters {
                    line_cooldown: 3,
                    sub_cooldown: 3,
                    ..EnvParameters::default()
                },
            },
            runner: RunnerConfig {
                episodes: 8,
                workers: 4,
                ..RunnerConfig::default()
            },
            ..Self::default()
        }
    }

    /// IEEE 14 bus with two batteries agents may drive.
    pub fn case14_storage() -> Self {
        Self {
            grid: GridConfig {
                name: "case14_storage".to_string(),
                path: None,
            },
            environment: EnvironmentConfig {
                reward: RewardKind::Economic,
                seed: 0,
                parameters: EnvParameters {
                    action_profile: ActionProfile::Playable,
                    ..EnvParameters::default()
                },
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["case5", "case14", "case14_realistic", "case14_storage"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "case5" => Ok(Self::case5()),
            "case14" => Ok(Self::case14()),
            "case14_realistic" => Ok(Self::case14_realistic()),
            "case14_storage" => Ok(Self::case14_storage()),
            _ => Err(error(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| error("scenario", format!("cannot read \"{}\": {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| error("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        match &self.grid.path {
            Some(path) if !path.is_file() => errors.push(error(
                "grid.path",
                format!("\"{}\" is not a file", path.display()),
            )),
            None if !presets::GRIDS.contains(&self.grid.name.as_str()) => errors.push(error(
                "grid.name",
                format!(
                    "unknown grid \"{}\", available: {}",
                    self.grid.name,
                    presets::GRIDS.join(", ")
                ),
            )),
            _ => {}
        }

        match &self.chronics {
            ChronicsSource::Generated(g) => validate_generation(g, &mut errors),
            ChronicsSource::Csv { path } | ChronicsSource::MultiFolder { path } => {
                if !path.is_dir() {
                    errors.push(error(
                        "chronics.path",
                        format!("\"{}\" is not a directory", path.display()),
                    ));
                }
            }
            ChronicsSource::ChangeNothing { max_iter } => {
                if *max_iter == Some(0) {
                    errors.push(error("chronics.max_iter", "must be > 0"));
                }
                let bounded = max_iter.is_some()
                    || self.environment.parameters.max_steps.is_some()
                    || self.runner.max_iter.is_some();
                if !bounded {
                    errors.push(error(
                        "chronics.max_iter",
                        "required when neither environment.parameters.max_steps \
                         nor runner.max_iter bounds the episode",
                    ));
                }
            }
        }

        let p = &self.environment.parameters;
        if !(p.delta_time_minutes > 0.0) {
            errors.push(error("environment.parameters.delta_time_minutes", "must be > 0"));
        }
        if p.max_steps == Some(0) {
            errors.push(error("environment.parameters.max_steps", "must be > 0"));
        }

        if let AgentKind::RandomRedispatch {
            probability,
            max_mw,
        } = &self.agent
        {
            if !(0.0..=1.0).contains(probability) {
                errors.push(error("agent.probability", "must be in [0.0, 1.0]"));
            }
            if !(*max_mw >= 0.0) {
                errors.push(error("agent.max_mw", "must be >= 0"));
            }
        }

        let r = &self.runner;
        if r.episodes == 0 {
            errors.push(error("runner.episodes", "must be > 0"));
        }
        if r.workers == 0 {
            errors.push(error("runner.workers", "must be > 0"));
        }
        if r.max_iter == Some(0) {
            errors.push(error("runner.max_iter", "must be > 0"));
        }

        errors
    }

    /// Loads the configured grid.
    pub fn load_grid(&self) -> Result<Arc<GridObjects>, ConfigError> {
        let grid = match &self.grid.path {
            Some(path) => {
                let json = fs::read_to_string(path).map_err(|e| {
                    error("grid.path", format!("cannot read \"{}\": {e}", path.display()))
                })?;
                GridObjects::from_json(&json)
            }
            None => presets::by_name(&self.grid.name),
        };
        grid.map(Arc::new).map_err(|e| error("grid", e.to_string()))
    }

    pub fn env_builder(&self) -> Result<EnvBuilder, ConfigError> {
        Ok(EnvBuilder::new(self.load_grid()?)
            .chronics(self.chronics.clone())
            .params(self.environment.parameters.clone())
            .reward(self.environment.reward)
            .seed(self.environment.seed))
    }

    /// Runner playing the configured agent.
    pub fn runner(&self) -> Result<Runner, ConfigError> {
        Ok(Runner::from_kind(
            self.env_builder()?,
            self.agent.clone(),
            self.environment.seed,
        )
        .max_iter(self.runner.max_iter))
    }
}

fn validate_generation(g: &GenerationParams, errors: &mut Vec<ConfigError>) {
    let positive = [
        ("chronics.n_steps", g.n_steps),
        ("chronics.steps_per_day", g.steps_per_day),
        ("chronics.n_scenarios", g.n_scenarios),
        ("chronics.maintenance_duration", g.maintenance_duration),
        ("chronics.hazard_duration", g.hazard_duration),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(error(field, "must be > 0"));
        }
    }
    let non_negative = [
        ("chronics.load_noise", g.load_noise),
        ("chronics.load_amplitude", g.load_amplitude),
        ("chronics.wind_variability", g.wind_variability),
        ("chronics.solar_noise", g.solar_noise),
    ];
    for (field, value) in non_negative {
        if !(value >= 0.0) {
            errors.push(error(field, "must be >= 0"));
        }
    }
    for (field, value) in [
        ("chronics.maintenance_rate", g.maintenance_rate),
        ("chronics.hazard_rate", g.hazard_rate),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(error(field, "must be in [0.0, 1.0]"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ScenarioConfig::default().validate().is_empty());
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name).unwrap();
            let errors = cfg.validate();
            assert!(errors.is_empty(), "{name}: {:?}", errors);
        }
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("case9000").unwrap_err();
        assert_eq!(err.field, "preset");
        assert!(err.message.contains("case14_storage"));
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[grid]
name = "case5"

[chronics]
source = "generated"
n_steps = 96
n_scenarios = 3
maintenance_rate = 0.1

[environment]
reward = "redisp"
seed = 7

[environment.parameters]
max_steps = 50
line_cooldown = 2
action_profile = "playable"

[agent]
kind = "random_redispatch"
probability = 0.5

[runner]
episodes = 3
workers = 2
log_dir = "logs"
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).unwrap();
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.grid.name, "case5");
        let ChronicsSource::Generated(g) = &cfg.chronics else {
            panic!("expected generated chronics");
        };
        assert_eq!(g.n_steps, 96);
        assert_eq!(g.steps_per_day, 288);
        assert_eq!(cfg.environment.reward, RewardKind::Redisp);
        assert_eq!(cfg.environment.parameters.max_steps, Some(50));
        assert_eq!(cfg.environment.parameters.max_sub_changed, 1);
        assert_eq!(
            cfg.agent,
            AgentKind::RandomRedispatch {
                probability: 0.5,
                max_mw: 5.0
            }
        );
        assert_eq!(cfg.runner.log_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[runner]
episodes = 2
threads = 4
"#;
        let err = ScenarioConfig::from_toml_str(toml).unwrap_err();
        assert_eq!(err.field, "toml");
    }

    #[test]
    fn change_nothing_chronics_parse() {
        let cfg = ScenarioConfig::from_toml_str(
            "[chronics]\nsource = \"change_nothing\"\nmax_iter = 10\n",
        )
        .unwrap();
        assert_eq!(cfg.chronics, ChronicsSource::ChangeNothing { max_iter: Some(10) });
    }

    #[test]
    fn unbounded_change_nothing_is_rejected() {
        let cfg =
            ScenarioConfig::from_toml_str("[chronics]\nsource = \"change_nothing\"\n").unwrap();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "chronics.max_iter");

        let capped = ScenarioConfig::from_toml_str(
            "[chronics]\nsource = \"change_nothing\"\n\n[runner]\nmax_iter = 20\n",
        )
        .unwrap();
        assert!(capped.validate().is_empty());

        let mut capped = cfg.clone();
        capped.environment.parameters.max_steps = Some(20);
        assert!(capped.validate().is_empty());
    }

    #[test]
    fn validation_collects_every_error() {
        let mut cfg = ScenarioConfig::from_preset("case5").unwrap();
        cfg.grid.name = "case9000".to_string();
        cfg.runner.workers = 0;
        cfg.environment.parameters.delta_time_minutes = 0.0;
        cfg.agent = AgentKind::RandomRedispatch {
            probability: 2.0,
            max_mw: 1.0,
        };
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "grid.name",
                "environment.parameters.delta_time_minutes",
                "agent.probability",
                "runner.workers",
            ]
        );
    }

    #[test]
    fn validation_checks_generation() {
        let cfg = ScenarioConfig {
            chronics: ChronicsSource::Generated(GenerationParams {
                n_steps: 0,
                hazard_rate: 1.5,
                ..GenerationParams::default()
            }),
            ..ScenarioConfig::default()
        };
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["chronics.n_steps", "chronics.hazard_rate"]);
    }

    #[test]
    fn builds_an_environment() {
        let mut cfg = ScenarioConfig::from_preset("case5").unwrap();
        cfg.environment.seed = 4;
        let env = cfg.env_builder().unwrap().build().unwrap();
        assert_eq!(env.grid().name(), "case5");
        assert_eq!(env.seed(), 4);
        assert_eq!(env.n_chronics(), 2);
    }

    #[test]
    fn preset_differences() {
        let realistic = ScenarioConfig::case14_realistic();
        assert_eq!(realistic.environment.parameters.line_cooldown, 3);
        let storage = ScenarioConfig::case14_storage();
        assert_eq!(storage.grid.name, "case14_storage");
        assert_eq!(storage.environment.reward, RewardKind::Economic);
    }
}
