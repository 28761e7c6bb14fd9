use std::env;

/// Application configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    /// "http" for the real gateway, "mock" for local development.
    pub gateway_mode: String,
    /// Verify pushed paid-claims against the gateway before committing.
    pub verify_events: bool,
    pub sweep_interval_secs: u64,
    /// Default platform fee in basis points when a tenant has no override.
    pub platform_fee_bps: i64,
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let bus_type = env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string());

        let nats_url =
            env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8091".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let gateway_mode = env::var("GATEWAY_MODE").unwrap_or_else(|_| "http".to_string());

        let verify_events = env::var("VERIFY_GATEWAY_EVENTS")
            .map(|v| v == "true")
            .unwrap_or(true);

        let sweep_interval_secs: u64 = env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| "SWEEP_INTERVAL_SECS must be a valid u64".to_string())?;

        let platform_fee_bps: i64 = env::var("PLATFORM_FEE_BPS")
            .unwrap_or_else(|_| "40".to_string())
            .parse()
            .map_err(|_| "PLATFORM_FEE_BPS must be a valid i64".to_string())?;

        let webhook_secret = env::var("GATEWAY_WEBHOOK_SECRET").ok();

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            host,
            port,
            gateway_mode,
            verify_events,
            sweep_interval_secs,
            platform_fee_bps,
            webhook_secret,
        })
    }
}
