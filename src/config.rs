use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Config {
    pub bind: String,
    pub port: u16,
    pub call_timeout: Duration,
    pub seed_demo: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let call_timeout = std::env::var("STUDYHUB_CALL_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CALL_TIMEOUT);

        Self {
            bind: std::env::var("STUDYHUB_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            call_timeout,
            seed_demo: std::env::var("STUDYHUB_SEED_DEMO")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
