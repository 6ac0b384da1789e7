use super::parsing::{
    env_optional, env_or_default, parse_backend_url, parse_bool, parse_cors_origins,
    parse_environment, parse_u64,
};
use super::types::{
    ApiSettings, BackendSettings, ConfigError, CorsSettings, RuntimeSettings, ServerHost,
    ServerPort, ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMGRADER_HOST", "0.0.0.0");
        let port = env_or_default("EXAMGRADER_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAMGRADER_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("EXAMGRADER_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Exam Grader API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let backend_url = parse_backend_url(env_optional("GRADING_BACKEND_URL"))?;
        let backend_timeout_seconds = parse_u64(
            "GRADING_BACKEND_TIMEOUT_SECONDS",
            env_or_default("GRADING_BACKEND_TIMEOUT_SECONDS", "30"),
        )?;
        let backend_connect_timeout_seconds = parse_u64(
            "GRADING_BACKEND_CONNECT_TIMEOUT_SECONDS",
            env_or_default("GRADING_BACKEND_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;

        let log_level = env_or_default("EXAMGRADER_LOG_LEVEL", "info");
        let json = env_optional("EXAMGRADER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost::parse(host)?, port: ServerPort::parse(port)? },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            backend: BackendSettings {
                url: backend_url,
                timeout_seconds: backend_timeout_seconds,
                connect_timeout_seconds: backend_connect_timeout_seconds,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
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

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn backend(&self) -> &BackendSettings {
        &self.backend
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.api.api_v1_str.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "API_V1_STR",
                value: self.api.api_v1_str.clone(),
            });
        }

        if self.backend.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADING_BACKEND_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.cors.origins.iter().any(|origin| origin == "*") {
            return Err(ConfigError::InvalidCors("wildcard origin".to_string()));
        }

        Ok(())
    }
}
