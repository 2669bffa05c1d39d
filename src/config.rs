// config.rs — runtime configuration
//
// Sources, later ones win:
// - built-in defaults
// - JSON file: --config <path> or HOTSPOT_MAPPER_CONFIG
// - env: HOTSPOT_MAPPER_LANG, HOTSPOT_MAPPER_MODE
// - CLI: --lang <code>, --mode panorama|flat

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::drag::LeavePolicy;
use crate::error::ConfigError;
use crate::geometry::{CoordinateSpace, EquirectDims, SPHERE_RADIUS};

const ENV_CONFIG: &str = "HOTSPOT_MAPPER_CONFIG";
const ENV_LANG: &str = "HOTSPOT_MAPPER_LANG";
const ENV_MODE: &str = "HOTSPOT_MAPPER_MODE";

/// Which viewer the editor runs; fixes the coordinate space of loaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerMode {
    Panorama,
    Flat,
}

impl ViewerMode {
    pub fn space(self) -> CoordinateSpace {
        match self {
            Self::Panorama => CoordinateSpace::Sphere,
            Self::Flat => CoordinateSpace::Pixel,
        }
    }

    /// Flat markers are small DOM-like boxes a fast pointer easily outruns,
    /// so only leaving the whole viewer ends a drag there.
    pub fn leave_policy(self) -> LeavePolicy {
        match self {
            Self::Panorama => LeavePolicy::Marker,
            Self::Flat => LeavePolicy::Container,
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "panorama" | "360" => Ok(Self::Panorama),
            "flat" | "2d" => Ok(Self::Flat),
            _ => Err(ConfigError::InvalidValue {
                key: "mode".into(),
                value: value.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub lang: String,
    pub mode: ViewerMode,
    pub equirect_width: f64,
    pub equirect_height: f64,
    pub sphere_radius: f64,
    pub sensitivity: f64,
    pub log_filter: String,
    /// Command-line arguments that were not understood. Kept so they can be
    /// reported once logging is up.
    #[serde(skip)]
    pub ignored_args: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lang: "en".into(),
            mode: ViewerMode::Panorama,
            equirect_width: EquirectDims::CANONICAL.width,
            equirect_height: EquirectDims::CANONICAL.height,
            sphere_radius: SPHERE_RADIUS,
            sensitivity: 1.0,
            log_filter: "info".into(),
            ignored_args: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Resolve from the process arguments and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_sources(std::env::args().skip(1), |k| std::env::var(k).ok())
    }

    pub fn from_sources(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let cli = CliArgs::parse(args)?;

        let config_path = cli
            .config
            .clone()
            .or_else(|| env(ENV_CONFIG).filter(|v| !v.trim().is_empty()).map(PathBuf::from));

        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(v) = env(ENV_LANG).filter(|v| !v.trim().is_empty()) {
            config.lang = v;
        }
        if let Some(v) = env(ENV_MODE).filter(|v| !v.trim().is_empty()) {
            config.mode = ViewerMode::parse(&v)?;
        }

        if let Some(v) = cli.lang {
            config.lang = v;
        }
        if let Some(v) = cli.mode {
            config.mode = v;
        }
        config.ignored_args = cli.ignored;

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("equirect_width", self.equirect_width),
            ("equirect_height", self.equirect_height),
            ("sphere_radius", self.sphere_radius),
            ("sensitivity", self.sensitivity),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Canonical equirect size stamped on newly added panorama files.
    pub fn equirect(&self) -> EquirectDims {
        EquirectDims::new(self.equirect_width, self.equirect_height)
    }
}

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    lang: Option<String>,
    mode: Option<ViewerMode>,
    ignored: Vec<String>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        let mut out = Self::default();
        let mut it = args.into_iter();
        while let Some(a) = it.next() {
            let mut value = |key: &str| it.next().ok_or_else(|| ConfigError::MissingValue(key.into()));
            match a.as_str() {
                "--config" => out.config = Some(PathBuf::from(value("--config")?)),
                "--lang" => out.lang = Some(value("--lang")?),
                "--mode" => out.mode = Some(ViewerMode::parse(&value("--mode")?)?),
                "--flat" => out.mode = Some(ViewerMode::Flat),
                other => out.ignored.push(other.to_string()),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults() {
        let c = AppConfig::from_sources(args(&[]), no_env).unwrap();
        assert_eq!(c, AppConfig::default());
        assert_eq!(c.equirect(), EquirectDims::CANONICAL);
        assert_eq!(c.mode.space(), CoordinateSpace::Sphere);
    }

    #[test]
    fn cli_overrides_env() {
        let env: HashMap<&str, &str> = [(ENV_LANG, "fr"), (ENV_MODE, "flat")].into();
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        let c = AppConfig::from_sources(args(&[]), lookup).unwrap();
        assert_eq!(c.lang, "fr");
        assert_eq!(c.mode, ViewerMode::Flat);

        let c = AppConfig::from_sources(args(&["--lang", "ja", "--mode", "panorama"]), lookup).unwrap();
        assert_eq!(c.lang, "ja");
        assert_eq!(c.mode, ViewerMode::Panorama);
    }

    #[test]
    fn flat_flag() {
        let c = AppConfig::from_sources(args(&["--flat"]), no_env).unwrap();
        assert_eq!(c.mode, ViewerMode::Flat);
        assert_eq!(c.mode.leave_policy(), LeavePolicy::Container);
    }

    #[test]
    fn unknown_arguments_are_kept_for_reporting() {
        let c = AppConfig::from_sources(args(&["--verbose", "--flat", "extra"]), no_env).unwrap();
        assert_eq!(c.mode, ViewerMode::Flat);
        assert_eq!(c.ignored_args, args(&["--verbose", "extra"]));
    }

    #[test]
    fn missing_flag_value_is_an_error() {
        let err = AppConfig::from_sources(args(&["--lang"]), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue(k) if k == "--lang"));
    }

    #[test]
    fn bad_mode_is_an_error() {
        let err = AppConfig::from_sources(args(&["--mode", "cube"]), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn file_values_apply_with_defaults_for_the_rest() {
        let dir = std::env::temp_dir().join(format!("hotspot_mapper_cfg_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{ "mode": "flat", "equirect_width": 8000, "equirect_height": 4000 }"#).unwrap();

        let c = AppConfig::from_sources(args(&["--config", path.to_str().unwrap()]), no_env).unwrap();
        assert_eq!(c.mode, ViewerMode::Flat);
        assert_eq!(c.equirect(), EquirectDims::new(8000.0, 4000.0));
        assert_eq!(c.sphere_radius, SPHERE_RADIUS);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn non_positive_dimensions_are_rejected() {
        let dir = std::env::temp_dir().join(format!("hotspot_mapper_cfg_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{ "sphere_radius": 0 }"#).unwrap();

        let err = AppConfig::from_file(&path).and_then(|c| c.validate().map(|_| c)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "sphere_radius"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
