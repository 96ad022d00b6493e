use std::{collections::HashMap, fmt};

use maplit::hashmap;
use rand::Rng;
use strfmt::strfmt;

use crate::error::{ConfigError, TileError};
use crate::tile::Tile;

const PLACEHOLDERS: &[&str] = &["x", "y", "z", "s"];

/// Replaces every `{key}` in `template` with the matching substitution.
///
/// Fails if the template references a key that has no substitution or is
/// syntactically broken (e.g. an unclosed brace).
///
/// # Example
/// ```rust
/// # use mosaic_tile_downloader::format_template;
/// # use std::collections::HashMap;
/// let mut vars = HashMap::new();
/// vars.insert("z".to_owned(), "3".to_owned());
/// assert_eq!(format_template("/{z}/", &vars).unwrap(), "/3/");
/// ```
pub fn format_template(
    template: &str,
    substitutions: &HashMap<String, String>,
) -> Result<String, String> {
    strfmt(template, substitutions).map_err(|e| e.to_string())
}

/// A tile URL template with the replacement specifiers `{x}`, `{y}`, `{z}`
/// and optionally `{s}` for the shard.
#[derive(Clone, PartialEq)]
pub struct UrlFormat {
    format_str: String,
}

impl UrlFormat {
    /// Parses a template, making sure it only uses known specifiers and
    /// contains all of `{x}`, `{y}` and `{z}`.
    pub fn parse(format_str: impl Into<String>) -> Result<Self, ConfigError> {
        let format_str = format_str.into();
        let invalid = |reason: String| ConfigError::InvalidTemplate {
            template: format_str.clone(),
            reason,
        };

        let probe_vars: HashMap<String, String> = PLACEHOLDERS
            .iter()
            .map(|key| (key.to_string(), format!("<{}>", key)))
            .collect();
        let rendered = format_template(&format_str, &probe_vars).map_err(&invalid)?;

        for key in &["x", "y", "z"] {
            if !rendered.contains(&format!("<{}>", key)) {
                return Err(invalid(format!("missing `{{{}}}`", key)));
            }
        }

        Ok(Self { format_str })
    }

    pub fn as_str(&self) -> &str {
        &self.format_str
    }

    /// Whether the template distributes requests over shards.
    pub fn uses_shards(&self) -> bool {
        self.format_str.contains("{s}")
    }

    /// Resolves the URL of `tile`, picking one of `shards` uniformly at random.
    pub fn tile_url(&self, tile: &Tile, shards: &[String]) -> Result<String, TileError> {
        let shard = match shards.len() {
            0 => String::new(),
            1 => shards[0].clone(),
            n => shards[rand::thread_rng().gen_range(0..n)].clone(),
        };

        self.tile_url_with_shard(tile, &shard)
    }

    pub fn tile_url_with_shard(&self, tile: &Tile, shard: &str) -> Result<String, TileError> {
        let vars = hashmap! {
            "s".to_owned() => shard.to_owned(),
            "x".to_owned() => tile.x.to_string(),
            "y".to_owned() => tile.y.to_string(),
            "z".to_owned() => tile.z.to_string(),
        };

        format_template(&self.format_str, &vars).map_err(TileError::Template)
    }
}

impl fmt::Debug for UrlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlFormat")
            .field("format_str", &self.format_str)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_all_specifiers() {
        let url = UrlFormat::parse("https://{s}.tile.example.org/{z}/{x}/{y}.png").unwrap();
        let tile = Tile::new(3, 5, 7);

        assert_eq!(
            url.tile_url_with_shard(&tile, "b").unwrap(),
            "https://b.tile.example.org/7/3/5.png"
        );
    }

    #[test]
    fn shard_is_one_of_the_configured() {
        let url = UrlFormat::parse("https://mt{s}.example.org/{z}/{x}/{y}").unwrap();
        let shards: Vec<String> = (1..=4).map(|s| s.to_string()).collect();
        let tile = Tile::new(0, 0, 0);

        for _ in 0..50 {
            let resolved = url.tile_url(&tile, &shards).unwrap();
            let shard = &resolved["https://mt".len().."https://mt".len() + 1];
            assert!(shards.iter().any(|s| s == shard), "{}", resolved);
        }
    }

    #[test]
    fn rejects_unknown_specifier() {
        assert!(matches!(
            UrlFormat::parse("https://example.org/{z}/{x}/{y}?key={apikey}"),
            Err(ConfigError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn rejects_missing_specifier() {
        assert!(UrlFormat::parse("https://example.org/{z}/{x}.png").is_err());
    }

    #[test]
    fn template_without_shards() {
        let url = UrlFormat::parse("https://example.org/{z}/{x}/{y}.png").unwrap();
        assert!(!url.uses_shards());
        assert_eq!(
            url.tile_url(&Tile::new(1, 2, 3), &[]).unwrap(),
            "https://example.org/3/1/2.png"
        );
    }

    #[test]
    fn format_template_reports_missing_keys() {
        let vars = HashMap::new();
        assert!(format_template("{x}", &vars).is_err());
        assert_eq!(format_template("plain", &vars).unwrap(), "plain");
    }
}
