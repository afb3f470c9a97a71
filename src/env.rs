use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenv::dotenv;

use crate::config::WorkerConfig;

const AMQP_HOST: &str = "AMQP_HOST";
const AMQP_PORT: &str = "AMQP_PORT";
const AMQP_VHOST: &str = "AMQP_VHOST";
const AMQP_USERNAME: &str = "AMQP_USERNAME";
const AMQP_PASSWORD: &str = "AMQP_PASSWORD";
const AMQP_FRAME_MAX: &str = "AMQP_FRAME_MAX";
const AMQP_HEARTBEAT_SECONDS: &str = "AMQP_HEARTBEAT_SECONDS";
const AMQP_CONNECT_TIMEOUT_MS: &str = "AMQP_CONNECT_TIMEOUT_MS";
const WORKER_QUEUE: &str = "WORKER_QUEUE";
const WORKER_MISSING_REPLY_TO: &str = "WORKER_MISSING_REPLY_TO";
const WORKER_PUBLISHER_CONFIRMS: &str = "WORKER_PUBLISHER_CONFIRMS";

impl WorkerConfig {
    /// Loads `.env` if present, then overrides fields from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        dotenv().ok();
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let connection = &mut self.connection;
        if let Some(host) = lookup(AMQP_HOST) {
            connection.host = host;
        }
        if let Some(vhost) = lookup(AMQP_VHOST) {
            connection.vhost = vhost;
        }
        if let Some(username) = lookup(AMQP_USERNAME) {
            connection.username = username;
        }
        if let Some(password) = lookup(AMQP_PASSWORD) {
            connection.password = password;
        }
        override_parsed(&lookup, AMQP_PORT, &mut connection.port)?;
        override_parsed(&lookup, AMQP_FRAME_MAX, &mut connection.frame_max)?;
        override_parsed(&lookup, AMQP_HEARTBEAT_SECONDS, &mut connection.heartbeat_seconds)?;
        override_parsed(&lookup, AMQP_CONNECT_TIMEOUT_MS, &mut connection.connection_timeout_ms)?;

        let worker = &mut self.worker;
        if let Some(queue) = lookup(WORKER_QUEUE) {
            worker.queue = queue;
        }
        override_parsed(&lookup, WORKER_MISSING_REPLY_TO, &mut worker.missing_reply_to)?;
        override_parsed(&lookup, WORKER_PUBLISHER_CONFIRMS, &mut worker.publisher_confirms)?;

        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value '{}' for {}", raw, key))?;
    }
    Ok(())
}
