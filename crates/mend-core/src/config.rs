use std::collections::HashMap;

/// Session configuration, read once from env/.env and immutable afterward.
/// API keys come from the environment only; everything else has a default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Healing attempts per session (`MEND_MAX_ATTEMPTS`, legacy
    /// `MAX_RETRIES` also honored).
    pub max_attempts: u32,

    // Model
    pub model_api_key: String,
    pub model_name: String,

    // Git attribution; both must be set to override the ambient identity
    pub git_author_name: String,
    pub git_author_email: String,

    // Sandbox
    /// "auto" (default), "docker", or "host".
    pub sandbox_backend: String,
    pub sandbox_memory_mb: u64,
    /// CPU quota per 100ms scheduling period, in microseconds.
    pub sandbox_cpu_quota: i64,
}

fn parse_dotenv() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_u32(key: &str, dotenv: &HashMap<String, String>, default: u32) -> u32 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u64(key: &str, dotenv: &HashMap<String, String>, default: u64) -> u64 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_i64(key: &str, dotenv: &HashMap<String, String>, default: i64) -> i64 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn load() -> Self {
        let dotenv = parse_dotenv();
        let max_attempts = get("MEND_MAX_ATTEMPTS", &dotenv)
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| get_u32("MAX_RETRIES", &dotenv, 5));
        Self {
            max_attempts,
            model_api_key: get_str("GEMINI_API_KEY", &dotenv, ""),
            model_name: get_str("MEND_MODEL", &dotenv, "gemini-2.5-flash"),
            git_author_name: get_str("GIT_AUTHOR_NAME", &dotenv, ""),
            git_author_email: get_str("GIT_AUTHOR_EMAIL", &dotenv, ""),
            sandbox_backend: get_str("SANDBOX_BACKEND", &dotenv, "auto"),
            sandbox_memory_mb: get_u64("SANDBOX_MEMORY_MB", &dotenv, 512),
            sandbox_cpu_quota: get_i64("SANDBOX_CPU_QUOTA", &dotenv, 50_000),
        }
    }

    /// Commit author override, only when both halves are configured.
    pub fn git_author(&self) -> Option<(&str, &str)> {
        if self.git_author_name.is_empty() || self.git_author_email.is_empty() {
            None
        } else {
            Some((&self.git_author_name, &self.git_author_email))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            model_api_key: String::new(),
            model_name: "gemini-2.5-flash".to_string(),
            git_author_name: String::new(),
            git_author_email: String::new(),
            sandbox_backend: "auto".to_string(),
            sandbox_memory_mb: 512,
            sandbox_cpu_quota: 50_000,
        }
    }
}
