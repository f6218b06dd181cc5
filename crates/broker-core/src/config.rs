use std::env;

/// Process-wide configuration, loaded once at startup from the environment
/// and then passed by value into every collaborator. No component reads
/// `std::env` itself past this point, which keeps the dispatch loop
/// constructible from fakes in tests.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub bind_addr: String,
    pub static_dir: String,
    pub backend_addrs: Vec<String>,
    pub default_recipe_path: String,
    pub node_sampler: String,
    pub node_image: String,
    pub node_text: String,
    pub default_proc_time_secs: f64,
    pub store_url: String,
    pub s3_region: Option<String>,
    pub s3_bucket: Option<String>,
    pub sms_url: Option<String>,
    pub sms_key: Option<String>,
    pub log_sink_url: Option<String>,
}

impl BrokerConfig {
    /// Load configuration from environment variables, falling back to
    /// documented defaults whenever a variable is unset or fails to parse.
    /// Unknown variables are ignored.
    pub fn from_env() -> Self {
        let backend_addrs = (1..=4)
            .filter_map(|i| env::var(format!("BROKER_BACKEND_{i}")).ok())
            .collect();

        BrokerConfig {
            bind_addr: env::var("BROKER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            static_dir: env::var("BROKER_STATIC_DIR").unwrap_or_else(|_| "./data".into()),
            backend_addrs,
            default_recipe_path: env::var("BROKER_DEFAULT_RECIPE")
                .unwrap_or_else(|_| "./recipes/default.json".into()),
            node_sampler: env::var("BROKER_NODE_SAMPLER").unwrap_or_else(|_| "3".into()),
            node_image: env::var("BROKER_NODE_IMAGE").unwrap_or_else(|_| "10".into()),
            node_text: env::var("BROKER_NODE_TEXT").unwrap_or_else(|_| "6".into()),
            default_proc_time_secs: env::var("BROKER_DEFAULT_PROC_TIME")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(80.0),
            store_url: env::var("BROKER_STORE_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            s3_region: env::var("BROKER_S3_REGION").ok(),
            s3_bucket: env::var("BROKER_S3_BUCKET").ok(),
            sms_url: env::var("BROKER_SMS_URL").ok(),
            sms_key: env::var("BROKER_SMS_KEY").ok(),
            log_sink_url: env::var("BROKER_LOG_SINK_URL").ok(),
        }
    }

    /// Whether enough S3 configuration is present to use the S3-backed
    /// object store instead of the local filesystem fallback.
    pub fn s3_enabled(&self) -> bool {
        self.s3_region.is_some() && self.s3_bucket.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_proc_time_is_eighty_seconds() {
        let cfg = BrokerConfig {
            bind_addr: String::new(),
            static_dir: String::new(),
            backend_addrs: vec![],
            default_recipe_path: String::new(),
            node_sampler: String::new(),
            node_image: String::new(),
            node_text: String::new(),
            default_proc_time_secs: 80.0,
            store_url: String::new(),
            s3_region: None,
            s3_bucket: None,
            sms_url: None,
            sms_key: None,
            log_sink_url: None,
        };
        assert_eq!(cfg.default_proc_time_secs, 80.0);
        assert!(!cfg.s3_enabled());
    }
}
