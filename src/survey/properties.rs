//! HiPS `properties` file parsing.
//!
//! The properties file is a flat INI-like `key = value` document (no
//! sections, `#` comments). All keys are retained as a bag; a handful
//! drive the survey's order range, tile size, format, and release date.

use crate::survey::date::parse_hips_date;
use ini::Ini;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Tile image format of a survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileFormat {
    #[default]
    Jpg,
    Png,
    Webp,
    /// Ephemerides payloads. Surveys in this format have no all-sky
    /// image.
    Eph,
}

impl TileFormat {
    /// File extension used in tile URLs.
    pub fn ext(&self) -> &'static str {
        match self {
            TileFormat::Jpg => "jpg",
            TileFormat::Png => "png",
            TileFormat::Webp => "webp",
            TileFormat::Eph => "eph",
        }
    }
}

/// Failure to acquire or parse the properties file. Either one marks the
/// survey permanently not-ready.
#[derive(Debug, Error)]
pub enum PropertiesError {
    #[error("cannot fetch properties file (status {0})")]
    Fetch(u16),
    #[error("cannot parse properties file: {0}")]
    Parse(#[from] ini::ParseError),
}

/// Values extracted from a properties document.
#[derive(Debug, Default)]
pub(crate) struct ParsedProperties {
    /// Every key of the document, verbatim.
    pub all: HashMap<String, String>,
    pub order_max: Option<i32>,
    pub order_min: Option<i32>,
    pub tile_width: Option<i32>,
    pub release_date: Option<f64>,
    pub format: Option<TileFormat>,
}

/// Pick the first recognized format out of a `hips_tile_format` value,
/// which may list several (e.g. `"jpeg png"`).
fn parse_tile_format(value: &str) -> Option<TileFormat> {
    if value.contains("webp") {
        Some(TileFormat::Webp)
    } else if value.contains("jpeg") {
        Some(TileFormat::Jpg)
    } else if value.contains("png") {
        Some(TileFormat::Png)
    } else if value.contains("eph") {
        Some(TileFormat::Eph)
    } else {
        warn!(format = value, "unknown hips tile format");
        None
    }
}

pub(crate) fn parse_properties(data: &str) -> Result<ParsedProperties, PropertiesError> {
    let ini = Ini::load_from_str(data)?;
    let mut props = ParsedProperties::default();
    for (key, value) in ini.general_section().iter() {
        props.all.insert(key.to_string(), value.to_string());
        match key {
            "hips_order" => props.order_max = value.trim().parse().ok(),
            "hips_order_min" => props.order_min = value.trim().parse().ok(),
            "hips_tile_width" => props.tile_width = value.trim().parse().ok(),
            "hips_release_date" => props.release_date = Some(parse_hips_date(value)),
            "hips_tile_format" => props.format = parse_tile_format(value),
            // hips_service_url is deliberately not honored: it can switch
            // the protocol between https and http.
            // TODO: decide whether the key is authoritative or a hint.
            _ => {}
        }
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typical_properties() {
        let data = "\
# DSS colored survey
obs_collection = DSS colored
hips_order = 9
hips_order_min= 3
hips_tile_width = 512
hips_tile_format = jpeg png
hips_release_date = 2019-01-02T15:27Z
";
        let props = parse_properties(data).unwrap();
        assert_eq!(props.order_max, Some(9));
        assert_eq!(props.order_min, Some(3));
        assert_eq!(props.tile_width, Some(512));
        assert_eq!(props.format, Some(TileFormat::Jpg));
        assert!((props.release_date.unwrap() - 58485.64375).abs() < 1e-9);
        assert_eq!(props.all.get("obs_collection").unwrap(), "DSS colored");
    }

    #[test]
    fn test_webp_takes_precedence() {
        assert_eq!(parse_tile_format("jpeg webp"), Some(TileFormat::Webp));
    }

    #[test]
    fn test_eph_format_recognized() {
        let props = parse_properties("hips_tile_format = eph\n").unwrap();
        assert_eq!(props.format, Some(TileFormat::Eph));
    }

    #[test]
    fn test_unknown_format_ignored() {
        let props = parse_properties("hips_tile_format = fits\n").unwrap();
        assert_eq!(props.format, None);
    }

    #[test]
    fn test_service_url_is_not_extracted() {
        let props = parse_properties("hips_service_url = http://elsewhere\n").unwrap();
        // Retained in the bag only.
        assert_eq!(props.all.get("hips_service_url").unwrap(), "http://elsewhere");
    }
}
