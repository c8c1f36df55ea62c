// src/config.rs
//! Process-env configuration. Everything is optional: without an LLM key the
//! pipeline still ingests and serves articles, without SMTP the weekly digest
//! is built but not sent.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Chat-completions credentials; absence disables extraction.
    pub llm_api_key: Option<String>,
    pub llm_api_url: String,
    pub llm_model: String,
    /// SMTP submission; absence disables the weekly send.
    pub smtp: Option<SmtpConfig>,
    pub digest_recipients: Vec<String>,
    pub admin_token: Option<String>,
    pub port: u16,
    pub db_path: PathBuf,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let smtp = match (env_opt("SMTP_HOST"), env_opt("SMTP_USER"), env_opt("SMTP_PASS")) {
            (Some(host), Some(user), Some(password)) => Some(SmtpConfig {
                port: env_opt("SMTP_PORT")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(587),
                from: env_opt("SMTP_FROM").unwrap_or_else(|| user.clone()),
                host,
                user,
                password,
            }),
            _ => None,
        };

        let digest_recipients = env_opt("DIGEST_RECIPIENTS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            llm_api_key: env_opt("LLM_API_KEY"),
            llm_api_url: env_opt("LLM_API_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),
            llm_model: env_opt("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            smtp,
            digest_recipients,
            admin_token: env_opt("ADMIN_TOKEN"),
            port: env_opt("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            db_path: env_opt("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/events.db")),
        }
    }

    pub fn extraction_enabled(&self) -> bool {
        self.llm_api_key.is_some()
    }

    pub fn email_enabled(&self) -> bool {
        self.smtp.is_some() && !self.digest_recipients.is_empty()
    }
}
