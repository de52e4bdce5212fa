//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;

/// Default upload limit per file (25 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Local database location
    pub persistence: PersistenceConfig,
    /// Hosted store; `None` means the local SQLite store is used
    pub supabase: Option<SupabaseConfig>,
    /// Completion API settings
    pub openai: OpenAiConfig,
    /// Attachment settings
    pub uploads: UploadConfig,
    /// Reconciler timing
    pub sync: SyncConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Base directory for local data
    pub data_dir: String,
    /// SQLite database file
    pub database_path: String,
}

/// Supabase project credentials
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Service-role key used for REST and Storage calls
    pub service_role_key: String,
}

/// OpenAI configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key; empty disables completions
    pub api_key: String,
    /// Model name
    pub model: String,
    /// API base URL
    pub base_url: String,
}

/// Attachment upload configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Storage bucket name
    pub bucket: String,
    /// Largest accepted file, in bytes
    pub max_bytes: usize,
}

/// Reconciler timing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Message sync debounce window
    pub debounce_ms: u64,
    /// Visual delay before a deleted session leaves the list
    pub session_removal_delay_ms: u64,
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let data_dir = var("DATA_DIR").unwrap_or_else(|| {
            // Default to ~/.botchat or current directory
            if let Some(home) = env::var_os("HOME") {
                format!("{}/.botchat", home.to_string_lossy())
            } else {
                ".botchat".to_string()
            }
        });
        let database_path =
            var("DATABASE_PATH").unwrap_or_else(|| format!("{}/botchat.db", data_dir));

        let supabase_url = var("SUPABASE_URL").or_else(|| var("NEXT_PUBLIC_SUPABASE_URL"));
        let supabase = match (supabase_url, var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(SupabaseConfig {
                url,
                service_role_key,
            }),
            _ => None,
        };

        Self {
            server: ServerConfig {
                port: parsed("PORT", 8080),
                host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            },
            persistence: PersistenceConfig {
                data_dir,
                database_path,
            },
            supabase,
            openai: OpenAiConfig {
                api_key: var("OPENAI_API_KEY").unwrap_or_default(),
                model: var("OPENAI_MODEL").unwrap_or_else(|| "gpt-5-mini".to_string()),
                base_url: var("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            },
            uploads: UploadConfig {
                bucket: var("ATTACHMENTS_BUCKET")
                    .unwrap_or_else(|| "chat-attachments".to_string()),
                max_bytes: parsed("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            },
            sync: SyncConfig {
                debounce_ms: parsed("SYNC_DEBOUNCE_MS", 250),
                session_removal_delay_ms: parsed("SESSION_REMOVAL_DELAY_MS", 180),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 12] = [
        "PORT",
        "HOST",
        "DATA_DIR",
        "DATABASE_PATH",
        "SUPABASE_URL",
        "NEXT_PUBLIC_SUPABASE_URL",
        "SUPABASE_SERVICE_ROLE_KEY",
        "OPENAI_API_KEY",
        "OPENAI_MODEL",
        "MAX_UPLOAD_BYTES",
        "SYNC_DEBOUNCE_MS",
        "SESSION_REMOVAL_DELAY_MS",
    ];

    fn clear_env() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        env::set_var("DATA_DIR", "/tmp/botchat-test");

        let config = Config::from_env();
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.persistence.database_path, "/tmp/botchat-test/botchat.db");
        assert!(config.supabase.is_none());
        assert_eq!(config.openai.model, "gpt-5-mini");
        assert_eq!(config.uploads.max_bytes, 25 * 1024 * 1024);
        assert_eq!(config.uploads.bucket, "chat-attachments");
        assert_eq!(
            config.sync,
            SyncConfig {
                debounce_ms: 250,
                session_removal_delay_ms: 180
            }
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_supabase_needs_url_and_key() {
        clear_env();
        env::set_var("NEXT_PUBLIC_SUPABASE_URL", "https://demo.supabase.co");
        assert!(Config::from_env().supabase.is_none());

        env::set_var("SUPABASE_SERVICE_ROLE_KEY", "secret");
        let supabase = Config::from_env().supabase.unwrap();
        assert_eq!(supabase.url, "https://demo.supabase.co");

        env::set_var("SUPABASE_URL", "https://primary.supabase.co");
        assert_eq!(
            Config::from_env().supabase.unwrap().url,
            "https://primary.supabase.co"
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fall_back() {
        clear_env();
        env::set_var("PORT", "not-a-port");
        env::set_var("SYNC_DEBOUNCE_MS", "-5");

        let config = Config::from_env();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sync.debounce_ms, 250);

        clear_env();
    }
}
