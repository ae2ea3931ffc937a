use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// 0 disables the periodic recompute job.
    pub recompute_interval_minutes: u64,
    pub recompute_concurrency: usize,
    /// Default `min_score` for the active alerts listing.
    pub alert_score_threshold: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            recompute_interval_minutes: env::var("RECOMPUTE_INTERVAL_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
            recompute_concurrency: env::var("RECOMPUTE_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap_or(8),
            alert_score_threshold: env::var("ALERT_SCORE_THRESHOLD")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50.0),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
