//! Main application settings and configuration management

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use validator::Validate;

use graphguard_errors::{GraphGuardError, Result};

use crate::{
    EngineSettings, GeneratorSettings, GraphSettings, LoggingSettings, MetadataSettings,
    MonitorSettings, ShutdownSettings, WarmupSettings,
};

/// Main application settings structure
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppSettings {
    /// Application metadata
    #[validate(nested)]
    pub application: ApplicationSettings,

    /// Graph server connections
    #[validate(nested)]
    pub graph: GraphSettings,

    /// Transaction generator
    #[validate(nested)]
    pub generator: GeneratorSettings,

    /// Fraud engine
    #[validate(nested)]
    pub engine: EngineSettings,

    /// Metadata counter store
    #[validate(nested)]
    pub metadata: MetadataSettings,

    /// Performance monitor
    #[validate(nested)]
    pub monitor: MonitorSettings,

    /// Startup warmup
    #[validate(nested)]
    pub warmup: WarmupSettings,

    /// Shutdown drain policy
    #[validate(nested)]
    pub shutdown: ShutdownSettings,

    /// Log sink
    #[validate(nested)]
    pub logging: LoggingSettings,
}

/// Application metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApplicationSettings {
    #[validate(length(min = 1))]
    pub name: String,

    #[validate(length(min = 1))]
    pub environment: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "graphguard".to_string(),
            environment: "development".to_string(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            application: ApplicationSettings::default(),
            graph: GraphSettings::default(),
            generator: GeneratorSettings::default(),
            engine: EngineSettings::default(),
            metadata: MetadataSettings::default(),
            monitor: MonitorSettings::default(),
            warmup: WarmupSettings::default(),
            shutdown: ShutdownSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppSettings {
    /// Load configuration from the default `config/` directory
    pub fn load() -> Result<Self> {
        Self::load_from_dir("config")
    }

    /// Load configuration layered over the built-in defaults:
    /// `default.yaml` -> `{RUN_ENV}.yaml` -> `local.yaml` -> `GRAPHGUARD__*`
    /// environment variables. Validation failures abort startup.
    pub fn load_from_dir<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();

        // Pick up a .env file when present; ignored otherwise
        let _ = dotenvy::dotenv();

        let defaults = Config::try_from(&AppSettings::default())
            .map_err(|e| GraphGuardError::configuration(e.to_string(), None))?;
        let mut builder = Config::builder().add_source(defaults);

        let default_path = config_dir.join("default.yaml");
        if default_path.exists() {
            builder = builder.add_source(File::from(default_path).format(FileFormat::Yaml));
        }

        let run_env = env::var("RUN_ENV").unwrap_or_else(|_| "development".to_string());
        let env_path = config_dir.join(format!("{}.yaml", run_env));
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path).format(FileFormat::Yaml));
        }

        // Local overrides, not committed to version control
        let local_path = config_dir.join("local.yaml");
        if local_path.exists() {
            builder = builder.add_source(File::from(local_path).format(FileFormat::Yaml));
        }

        builder = builder.add_source(
            Environment::with_prefix("GRAPHGUARD")
                .separator("__")
                .try_parsing(true),
        );

        let settings: AppSettings = builder
            .build()
            .map_err(|e| GraphGuardError::configuration(e.to_string(), None))?
            .try_deserialize()
            .map_err(|e| GraphGuardError::configuration(e.to_string(), None))?;

        settings.check()?;
        Ok(settings)
    }

    /// Validate field ranges and cross-field constraints
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| GraphGuardError::configuration(format!("{e}"), None))?;

        if self.generator.amount_min >= self.generator.amount_max {
            return Err(GraphGuardError::configuration(
                "amount_min must be below amount_max",
                Some("generator.amount_min"),
            ));
        }
        if self.generator.transaction_worker_pool_size
            > self.generator.transaction_worker_max_pool_size
        {
            return Err(GraphGuardError::configuration(
                "transaction_worker_pool_size exceeds its max",
                Some("generator.transaction_worker_pool_size"),
            ));
        }
        if self.engine.fraud_worker_pool_size > self.engine.fraud_worker_max_pool_size {
            return Err(GraphGuardError::configuration(
                "fraud_worker_pool_size exceeds its max",
                Some("engine.fraud_worker_pool_size"),
            ));
        }
        Ok(())
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.application.environment == "development"
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.application.environment == "production"
    }
}
