use std::{fs, path::Path};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// number of async worker threads, range [1, 32768), defaults to 16
    pub async_worker_thread_number: u16,
    /// capacity of the compiled plan cache, defaults to 1024
    pub plan_cache_capacity: usize,
    /// capacity of each call session's event queue, defaults to 100
    pub session_queue_size: usize,
    /// DTMF timeout in seconds for ivr nodes that don't set one, defaults to 5
    pub default_ivr_timeout: u64,
    /// rotation allocator config
    pub rotation: RotationConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RotationConfig {
    /// tenant-local midnight offset from UTC in minutes, defaults to 0;
    /// daily call counters reset when the local calendar date changes
    pub tenant_utc_offset_minutes: i32,
    /// optional fixed seed for the weighted draw; unset seeds from entropy
    pub weighted_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_worker_thread_number: 16,
            plan_cache_capacity: 1024,
            session_queue_size: 100,
            default_ivr_timeout: 5,
            rotation: RotationConfig::default(),
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            tenant_utc_offset_minutes: 0,
            weighted_seed: None,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Self {
        let data = fs::read_to_string(path.as_ref()).expect(&format!("failed to load config file {:?}", path.as_ref()));

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Self {
        let config = toml::from_str::<Config>(toml_str).expect("failed to parse the toml str");
        config
    }
}

#[cfg(test)]
mod test {
    use crate::Config;

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
        async_worker_thread_number = 10
        plan_cache_capacity = 64
        session_queue_size = 32
        default_ivr_timeout = 8

        [rotation]
        tenant_utc_offset_minutes = -300
        weighted_seed = 7
        "#;
        let config = Config::load_from_str(toml_str);
        assert_eq!(config.async_worker_thread_number, 10);
        assert_eq!(config.plan_cache_capacity, 64);
        assert_eq!(config.session_queue_size, 32);
        assert_eq!(config.default_ivr_timeout, 8);
        assert_eq!(config.rotation.tenant_utc_offset_minutes, -300);
        assert_eq!(config.rotation.weighted_seed, Some(7));
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.async_worker_thread_number, 16);
        assert_eq!(config.rotation.tenant_utc_offset_minutes, 0);
        assert_eq!(config.rotation.weighted_seed, None);
    }
}
