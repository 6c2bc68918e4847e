//! Warehouse credential resolution.
//!
//! Credentials are stored as a JSON document under a named secret.
//! The default source reads secrets from environment variables, which
//! is how the scheduler injects them.

use serde::Deserialize;
use snafu::prelude::*;

use crate::error::{InvalidJsonSnafu, NotFoundSnafu, SecretError};

/// Source of named secrets.
pub trait SecretSource {
    fn fetch(&self, name: &str) -> Result<String, SecretError>;
}

/// Reads secrets from environment variables named after the secret,
/// uppercased with `-` replaced by `_`.
#[derive(Debug, Default)]
pub struct EnvSecretSource;

impl SecretSource for EnvSecretSource {
    fn fetch(&self, name: &str) -> Result<String, SecretError> {
        let var = name.to_uppercase().replace('-', "_");
        std::env::var(&var).ok().context(NotFoundSnafu { name })
    }
}

/// Connection parameters for the warehouse.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseCredentials {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

fn default_port() -> u16 {
    5439
}

impl WarehouseCredentials {
    /// Resolve credentials from a named secret.
    pub fn from_secret(
        source: &dyn SecretSource,
        name: &str,
    ) -> Result<Self, SecretError> {
        let raw = source.fetch(name)?;
        serde_json::from_str(&raw).context(InvalidJsonSnafu { name })
    }

    /// Connection string in `tokio_postgres` key-value form.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.user, self.password, self.dbname
        )
    }
}
