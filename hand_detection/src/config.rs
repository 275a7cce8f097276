use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub onnx_file: String,
    pub model_dir: PathBuf,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub input_layout: InputLayout,
    pub scores_output: String,
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
    /// Return the best anchor score instead of the fixed 1.0 / 0.0.
    #[serde(default)]
    pub report_detector_score: bool,
    #[serde(default)]
    pub use_cuda: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    #[default]
    Nchw,
    Nhwc,
}

fn default_model_instances() -> usize {
    1
}

fn default_input_size() -> u32 {
    192
}

fn default_min_detection_confidence() -> f32 {
    0.5
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        if self.num_instances == 0 {
            return Err("model.num_instances must be at least 1".to_string());
        }
        if self.input_size == 0 {
            return Err("model.input_size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(format!(
                "model.min_detection_confidence must be within [0, 1], got {}",
                self.min_detection_confidence
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no working directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("HAND")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config = config.try_deserialize::<Config>()?;
    if let Err(e) = config.model.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert!(matches!(
            Environment::try_from("Production".to_string()),
            Ok(Environment::Production)
        ));
        assert!(Environment::try_from("staging".to_string()).is_err());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::try_from("DEBUG".to_string()).unwrap().as_str(), "debug");
        assert!(LogLevel::try_from("trace".to_string()).is_err());
    }

    fn model_config(dir: &str) -> ModelConfig {
        ModelConfig {
            onnx_file: "palm_detection.onnx".to_string(),
            model_dir: PathBuf::from(dir),
            num_instances: 1,
            input_size: 192,
            input_layout: InputLayout::Nchw,
            scores_output: "classificators".to_string(),
            min_detection_confidence: 0.5,
            report_detector_score: false,
            use_cuda: false,
        }
    }

    #[test]
    fn test_missing_model_file_fails_validation() {
        let err = model_config("./does_not_exist").validate().unwrap_err();
        assert!(err.contains("Model file not found"));
    }

    #[test]
    fn test_out_of_range_confidence_fails_validation() {
        let dir = std::env::temp_dir().join(format!(
            "hand_detection_confidence_validation_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("palm_detection.onnx"), b"").unwrap();

        let mut model = model_config(dir.to_str().unwrap());
        let valid = model.validate();
        model.min_detection_confidence = 1.5;
        let out_of_range = model.validate();
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(valid.is_ok());
        assert!(out_of_range.unwrap_err().contains("min_detection_confidence"));
    }

    #[test]
    fn test_server_address() {
        let server = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_body_bytes: default_max_body_bytes(),
        };
        assert_eq!(server.get_address(), "127.0.0.1:8000");
    }
}
