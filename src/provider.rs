//! Named tile sources (map types) and the URL templates behind them.

use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

use crate::error::{ConfigError, TileError};
use crate::tile::Tile;
use crate::url::UrlFormat;

/// Map type used when the caller doesn't name one.
pub const DEFAULT_MAP_TYPE: &str = "default";

const OSM_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
const OSM_SERVERS: &[&str] = &["a", "b", "c"];

fn default_shards() -> Vec<String> {
    (1..=4).map(|s| s.to_string()).collect()
}

/// A tile source: URL template plus the shard values substituted for `{s}`.
#[derive(Clone, Debug, PartialEq)]
pub struct Provider {
    name: String,
    url: UrlFormat,
    shards: Vec<String>,
}

impl Provider {
    pub fn new(
        name: impl Into<String>,
        url: UrlFormat,
        shards: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if url.uses_shards() && shards.is_empty() {
            return Err(ConfigError::NoShards(name));
        }

        Ok(Self { name, url, shards })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &UrlFormat {
        &self.url
    }

    pub fn shards(&self) -> &[String] {
        &self.shards
    }

    /// Resolves the URL to request `tile` from, with a random shard.
    pub fn tile_url(&self, tile: &Tile) -> Result<String, TileError> {
        self.url.tile_url(tile, &self.shards)
    }
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    url: String,
    #[serde(default = "default_shards")]
    shards: Vec<String>,
}

/// Maps map type names to providers.
#[derive(Clone, Debug)]
pub struct ProviderRegistry {
    providers: HashMap<String, Provider>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Parses a JSON object of the form
    /// `{ "<map type>": { "url": "...", "shards": ["a", "b"] } }`.
    ///
    /// `shards` may be omitted and then defaults to `1` through `4`.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let entries: HashMap<String, ProviderEntry> = serde_json::from_str(json)?;

        let mut registry = Self::empty();
        for (name, entry) in entries {
            let url = UrlFormat::parse(entry.url)?;
            registry.insert(Provider::new(name, url, entry.shards)?);
        }

        Ok(registry)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::ProviderFile {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json_str(&json)
    }

    /// Adds or replaces the provider registered under its name.
    pub fn insert(&mut self, provider: Provider) {
        self.providers.insert(provider.name.clone(), provider);
    }

    pub fn get(&self, map_type: &str) -> Result<&Provider, ConfigError> {
        self.providers
            .get(map_type)
            .ok_or_else(|| ConfigError::UnknownMapType(map_type.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl Default for ProviderRegistry {
    /// OpenStreetMap, registered as both `default` and `osm`.
    fn default() -> Self {
        let shards: Vec<String> = OSM_SERVERS.iter().map(|s| s.to_string()).collect();

        let mut registry = Self::empty();
        for name in &[DEFAULT_MAP_TYPE, "osm"] {
            registry.providers.insert(
                name.to_string(),
                Provider {
                    name: name.to_string(),
                    url: UrlFormat::parse(OSM_URL).expect("built-in template is valid"),
                    shards: shards.clone(),
                },
            );
        }

        registry
    }
}
