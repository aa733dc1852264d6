use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub settlement: SettlementConfig,
    pub offers: OfferConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementConfig {
    pub platform_fee_percent: f64,
    pub tds_percent: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OfferConfig {
    /// Window applied when a broadcast request does not name its own expiry.
    pub default_window_minutes: i64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("server.port", 8080_i64)?
            .set_default("settlement.platform_fee_percent", 3.0)?
            .set_default("settlement.tds_percent", 1.0)?
            .set_default("offers.default_window_minutes", 60_i64)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("MANDI").separator("__"))
            .build()?
            .try_deserialize()
    }
}
