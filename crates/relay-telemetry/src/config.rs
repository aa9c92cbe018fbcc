//! Telemetry configuration from environment variables.

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name reported in logs
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to write logs to stdout
    pub console_output: bool,

    /// Whether to emit logs as JSON lines
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "relay".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Build configuration from environment variables.
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("RELAY_SERVICE_NAME").unwrap_or_else(|_| "relay".to_string());

        let log_level = std::env::var("RELAY_LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let console_output = std::env::var("RELAY_CONSOLE_OUTPUT")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        // JSON logs default to on inside containers where a collector
        // scrapes stdout, and off for interactive runs.
        let json_logs = std::env::var("RELAY_JSON_LOGS")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or_else(|_| running_in_container());

        Self {
            service_name,
            log_level,
            console_output,
            json_logs,
        }
    }

    /// Override the service name.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }
}

fn running_in_container() -> bool {
    std::path::Path::new("/.dockerenv").exists()
        || std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
}
