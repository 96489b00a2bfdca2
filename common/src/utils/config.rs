use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    /// Public key identifying the author node every artifact links back to.
    pub author_key: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,
    #[serde(default = "default_watch_dir")]
    pub watch_dir: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    /// Pipeline variants as `converter:chunker:embedder` triples.
    #[serde(default = "default_variants")]
    pub variants: Vec<String>,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_archive_dir() -> String {
    "./archive".to_string()
}

fn default_watch_dir() -> String {
    "./papers".to_string()
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_variants() -> Vec<String> {
    vec!["plain:fixed_length:hashed".to_string()]
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_keys_fail() {
        let config = Config::builder().build().unwrap();
        let result: Result<AppConfig, ConfigError> = config.try_deserialize();
        assert!(result.is_err());
    }

    #[test]
    fn defaults_are_substituted() {
        let config = Config::builder()
            .set_override("surrealdb_address", "mem://")
            .unwrap()
            .set_override("surrealdb_username", "root")
            .unwrap()
            .set_override("surrealdb_password", "root")
            .unwrap()
            .set_override("surrealdb_namespace", "test")
            .unwrap()
            .set_override("surrealdb_database", "test")
            .unwrap()
            .set_override("author_key", "0xabc")
            .unwrap()
            .build()
            .unwrap();

        let parsed: AppConfig = config.try_deserialize().unwrap();
        assert_eq!(parsed.data_dir, "./data");
        assert_eq!(parsed.storage, StorageKind::Local);
        assert_eq!(parsed.variants, vec!["plain:fixed_length:hashed"]);
    }
}
