use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_u16, parse_u32, parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AiSettings, ApiSettings, BillingSettings, ConfigError, CorsSettings, DatabaseSettings,
    QueueSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings,
    Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("IELTS_HOST", "0.0.0.0");
        let port = env_or_default("IELTS_PORT", "8000");

        let environment =
            parse_environment(env_optional("IELTS_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("IELTS_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "IELTS Writing Assessment API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let explicit_secret = env_optional("SECRET_KEY");
        let secret_key_missing = explicit_secret.is_none();
        let secret_key = match explicit_secret {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "ielts");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "ielts_assess");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DATABASE_MAX_CONNECTIONS", env_or_default("DATABASE_MAX_CONNECTIONS", "20"))?;

        let api_key = env_or_default("ANTHROPIC_API_KEY", "");
        let base_url = env_or_default("ANTHROPIC_BASE_URL", "https://api.anthropic.com");
        let api_version = env_or_default("ANTHROPIC_VERSION", "2023-06-01");
        let model = env_or_default("CLAUDE_MODEL", "claude-3-5-sonnet-20241022");
        let max_tokens =
            parse_u32("CLAUDE_MAX_TOKENS", env_or_default("CLAUDE_MAX_TOKENS", "4000"))?;
        let temperature =
            parse_f64("CLAUDE_TEMPERATURE", env_or_default("CLAUDE_TEMPERATURE", "0.3"))?;
        let request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;

        let max_requests =
            parse_u32("QUEUE_MAX_REQUESTS", env_or_default("QUEUE_MAX_REQUESTS", "5"))?;
        let interval_seconds =
            parse_u64("QUEUE_INTERVAL_SECONDS", env_or_default("QUEUE_INTERVAL_SECONDS", "60"))?;
        let retry_delay_minutes = parse_u64(
            "QUEUE_RETRY_DELAY_MINUTES",
            env_or_default("QUEUE_RETRY_DELAY_MINUTES", "30"),
        )?;
        let auto_retry_failed = env_optional("QUEUE_AUTO_RETRY_FAILED")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let maintenance_interval_seconds = parse_u64(
            "QUEUE_MAINTENANCE_INTERVAL_SECONDS",
            env_or_default("QUEUE_MAINTENANCE_INTERVAL_SECONDS", "900"),
        )?;

        let credits_enforced =
            env_optional("CREDITS_ENFORCED").map(|value| parse_bool(&value)).unwrap_or(true);

        let log_level = env_or_default("IELTS_LOG_LEVEL", "info");
        let json = env_optional("IELTS_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            ai: AiSettings {
                api_key,
                base_url,
                api_version,
                model,
                max_tokens,
                temperature,
                request_timeout,
            },
            queue: QueueSettings {
                max_requests,
                interval_seconds,
                retry_delay_minutes,
                auto_retry_failed,
                maintenance_interval_seconds,
            },
            billing: BillingSettings { credits_enforced },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate(secret_key_missing)?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &super::types::ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &super::types::SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &super::types::CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &super::types::DatabaseSettings {
        &self.database
    }

    pub(crate) fn ai(&self) -> &super::types::AiSettings {
        &self.ai
    }

    pub(crate) fn queue(&self) -> &super::types::QueueSettings {
        &self.queue
    }

    pub(crate) fn billing(&self) -> &super::types::BillingSettings {
        &self.billing
    }

    pub(crate) fn telemetry(&self) -> &super::types::TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &super::types::RuntimeSettings {
        &self.runtime
    }

    fn validate(&self, secret_key_missing: bool) -> Result<(), ConfigError> {
        if self.queue.max_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "QUEUE_MAX_REQUESTS",
                value: "0".to_string(),
            });
        }

        if self.queue.interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "QUEUE_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.queue.maintenance_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "QUEUE_MAINTENANCE_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.ai.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "CLAUDE_TEMPERATURE",
                value: self.ai.temperature.to_string(),
            });
        }

        if self.ai.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CLAUDE_MAX_TOKENS",
                value: "0".to_string(),
            });
        }

        if self.ai.request_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "AI_REQUEST_TIMEOUT",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if secret_key_missing {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }
        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.ai.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("ANTHROPIC_API_KEY"));
        }

        Ok(())
    }
}
