use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub templates: String,
    #[serde(default)]
    pub session: SessionSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub path: String,
    pub temporary: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionSettings {
    /// Cookie signing secret, at least 32 bytes. A random key is used if unset.
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub filter: String,
}

impl Settings {
    /// Reads `filmoteca.toml` if present, then `FILMOTECA__*` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::builder()?
            .add_source(config::File::with_name("filmoteca").required(false))
            .add_source(config::Environment::with_prefix("FILMOTECA").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "filmoteca.db")?
            .set_default("database.temporary", false)?
            .set_default("templates", concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*"))?
            .set_default("log.filter", "filmoteca=debug,actix_web=info")
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }

    pub fn open_database(&self) -> sled::Result<sled::Db> {
        let config = sled::Config::new();
        if self.database.temporary {
            config.temporary(true).open()
        } else {
            config.path(&self.database.path).open()
        }
    }
}
