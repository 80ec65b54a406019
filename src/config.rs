//! Configuration module for the L3 estimator

use serde::Deserialize;
use std::env;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// WebSocket endpoint for the depth stream
    pub ws_endpoint: String,

    /// REST API endpoint for snapshots
    pub rest_endpoint: String,

    /// Address the fan-out server binds to
    pub bind_addr: String,

    /// Directory of static chart assets
    pub static_dir: String,

    /// Depth levels requested in the initial snapshot
    pub snapshot_depth: usize,

    /// Price levels included per side in each pushed snapshot
    pub top_levels: usize,

    /// Interval between snapshot pushes in milliseconds
    pub broadcast_interval_ms: u64,

    /// Base reconnect delay in milliseconds
    pub reconnect_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            ws_endpoint: env::var("WS_ENDPOINT")
                .unwrap_or_else(|_| "wss://fstream.binance.com".to_string()),
            rest_endpoint: env::var("REST_ENDPOINT")
                .unwrap_or_else(|_| "https://fapi.binance.com/fapi/v1".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
            snapshot_depth: env::var("SNAPSHOT_DEPTH")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            top_levels: env::var("TOP_LEVELS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            broadcast_interval_ms: env::var("BROADCAST_INTERVAL_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            reconnect_delay_ms: env::var("RECONNECT_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://fstream.binance.com".to_string(),
            rest_endpoint: "https://fapi.binance.com/fapi/v1".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            static_dir: "static".to_string(),
            snapshot_depth: 1000,
            top_levels: 100,
            broadcast_interval_ms: 100,
            reconnect_delay_ms: 1000,
        }
    }
}
