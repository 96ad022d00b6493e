use clap::{
    app_from_crate, crate_authors, crate_description, crate_name, crate_version, value_t,
    AppSettings, Arg, ArgMatches, SubCommand,
};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::validators::*;
use mosaic_tile_downloader::{
    Backoff, ConfigError, DownloadConfig, Fixture, GeoBox, OutputSpec, TileBox, DEFAULT_MAP_TYPE,
    DEFAULT_OUTPUT_NAME,
};

const BBOX_CMD: &str = "bbox";
const TILES_CMD: &str = "tiles";

const BBOX_FIXTURE_ARG: &str = "fixture";
const BBOX_NORTH_ARG: &str = "north";
const BBOX_SOUTH_ARG: &str = "south";
const BBOX_WEST_ARG: &str = "west";
const BBOX_EAST_ARG: &str = "east";
const LEFT_ARG: &str = "left";
const RIGHT_ARG: &str = "right";
const TOP_ARG: &str = "top";
const BOTTOM_ARG: &str = "bottom";
const ZOOM_ARG: &str = "zoom";
const NAME_ARG: &str = "name";
const MAP_TYPE_ARG: &str = "map_type";
const SUFFIX_ARG: &str = "suffix";
const ROOT_ARG: &str = "root";
const PROVIDERS_ARG: &str = "providers";
const WORKERS_ARG: &str = "workers";
const DELAY_ARG: &str = "delay_ms";
const REQUEST_RETRIES_ARG: &str = "num_retries";
const TIMEOUT_ARG: &str = "timeout";
const DRY_RUN_ARG: &str = "dry_run";

/// The area to download.
pub enum Area {
    Geo { geo: GeoBox, zoom: u8 },
    Tiles(TileBox),
}

impl Area {
    /// The tiles covered by the area, checked the same way a real run checks them.
    pub fn tile_box(&self) -> Result<TileBox, ConfigError> {
        match self {
            Area::Geo { geo, zoom } => geo.to_tile_box(*zoom),
            Area::Tiles(tile_box) => tile_box.validate().map(|()| *tile_box),
        }
    }
}

pub struct Args {
    pub area: Area,
    pub output: OutputSpec,
    pub config: DownloadConfig,
    pub providers: Option<PathBuf>,
    pub dry_run: bool,
}

impl Args {
    pub fn parse() -> Self {
        let matches = get_matches();

        let (area, sub) = match matches.subcommand() {
            (BBOX_CMD, Some(sub)) => (parse_geo(sub), sub),
            (TILES_CMD, Some(sub)) => (parse_tiles(sub), sub),
            // clap enforces a subcommand
            _ => unreachable!(),
        };

        let output = OutputSpec::new(sub.value_of(SUFFIX_ARG).unwrap_or_default())
            .name(sub.value_of(NAME_ARG).unwrap_or(DEFAULT_OUTPUT_NAME))
            .map_type(sub.value_of(MAP_TYPE_ARG).unwrap_or(DEFAULT_MAP_TYPE));

        let defaults = DownloadConfig::default();
        let config = DownloadConfig {
            root: sub
                .value_of(ROOT_ARG)
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            workers: value(sub, WORKERS_ARG),
            request_delay: Duration::from_millis(value(sub, DELAY_ARG)),
            retries: value(sub, REQUEST_RETRIES_ARG),
            backoff: Backoff::default(),
            timeout: Duration::from_secs(value(sub, TIMEOUT_ARG)),
        };

        Self {
            area,
            output,
            config,
            providers: sub.value_of(PROVIDERS_ARG).map(PathBuf::from),
            dry_run: sub.is_present(DRY_RUN_ARG),
        }
    }
}

fn value<T: FromStr>(matches: &ArgMatches<'_>, name: &str) -> T {
    value_t!(matches, name, T).unwrap_or_else(|e| e.exit())
}

fn parse_geo(matches: &ArgMatches<'_>) -> Area {
    let geo = match matches.value_of(BBOX_FIXTURE_ARG) {
        // if a fixture is specified, construct the bounding box from that
        Some(f) => match f.parse::<Fixture>() {
            Ok(fixture) => GeoBox::from(fixture),
            Err(e) => clap::Error::with_description(e, clap::ErrorKind::InvalidValue).exit(),
        },
        // otherwise, parse the 4 coords separately
        None => GeoBox::new(
            value(matches, BBOX_NORTH_ARG),
            value(matches, BBOX_WEST_ARG),
            value(matches, BBOX_SOUTH_ARG),
            value(matches, BBOX_EAST_ARG),
        ),
    };

    Area::Geo {
        geo,
        zoom: value(matches, ZOOM_ARG),
    }
}

fn parse_tiles(matches: &ArgMatches<'_>) -> Area {
    Area::Tiles(TileBox::new(
        value(matches, LEFT_ARG),
        value(matches, RIGHT_ARG),
        value(matches, TOP_ARG),
        value(matches, BOTTOM_ARG),
        value(matches, ZOOM_ARG),
    ))
}

fn geo_arg(name: &'static str, short: &'static str, help: &'static str) -> Arg<'static, 'static> {
    Arg::with_name(name)
        .help(help)
        .required_unless(BBOX_FIXTURE_ARG)
        .validator(is_geo_coord)
        .takes_value(true)
        .allow_hyphen_values(true)
        .short(short)
        .long(name)
}

fn tile_arg(name: &'static str, help: &'static str) -> Arg<'static, 'static> {
    Arg::with_name(name)
        .help(help)
        .required(true)
        .validator(is_tile_index)
        .takes_value(true)
        .long(name)
}

fn shared_args() -> Vec<Arg<'static, 'static>> {
    vec![
        Arg::with_name(ZOOM_ARG)
            .help("The zoom level to fetch")
            .validator(is_zoom)
            .required(true)
            .takes_value(true)
            .short("z")
            .long("zoom"),
        Arg::with_name(SUFFIX_ARG)
            .help("File extension of the stored tiles, e.g. `png` or `jpg`")
            .required(true)
            .takes_value(true)
            .long("suffix"),
        Arg::with_name(NAME_ARG)
            .help("Name of the mosaic; tiles are stored below <root>/<name>/")
            .default_value(DEFAULT_OUTPUT_NAME)
            .takes_value(true)
            .short("o")
            .long("name"),
        Arg::with_name(MAP_TYPE_ARG)
            .help("The map type (provider) to fetch tiles from")
            .default_value(DEFAULT_MAP_TYPE)
            .takes_value(true)
            .short("m")
            .long("map-type"),
        Arg::with_name(ROOT_ARG)
            .help("The folder below which mosaics are stored")
            .default_value("tiles")
            .takes_value(true)
            .long("root"),
        Arg::with_name(PROVIDERS_ARG)
            .help("JSON file mapping map types to URL templates with the format specifiers `{x}`, `{y}`, `{z}` and `{s}`, e.g. {\"sat\": {\"url\": \"https://mt{s}.example.com/{z}/{x}/{y}\", \"shards\": [\"0\", \"1\"]}}")
            .takes_value(true)
            .long("providers"),
        Arg::with_name(WORKERS_ARG)
            .help("The amount of tiles fetched in parallel.")
            .validator(is_numeric_min(1))
            .default_value("4")
            .takes_value(true)
            .short("r")
            .long("workers"),
        Arg::with_name(DELAY_ARG)
            .help("Minimum delay (in milliseconds) between two requests of the same worker.")
            .validator(is_numeric_min(0))
            .default_value("500")
            .takes_value(true)
            .long("delay-ms"),
        Arg::with_name(REQUEST_RETRIES_ARG)
            .help("The amount of times to retry a failed HTTP request.")
            .validator(is_numeric_min(0))
            .default_value("3")
            .takes_value(true)
            .long("retries"),
        Arg::with_name(TIMEOUT_ARG)
            .help("The timeout (in seconds) for fetching a single tile. Pass 0 for no timeout.")
            .validator(is_numeric_min(0))
            .default_value("30")
            .takes_value(true)
            .short("t")
            .long("timeout"),
        Arg::with_name(DRY_RUN_ARG)
            .help("Don't actually fetch anything, just determine how many tiles would be fetched.")
            .required(false)
            .takes_value(false)
            .long("dry-run"),
    ]
}

fn get_matches() -> ArgMatches<'static> {
    app_from_crate!()
        .setting(AppSettings::GlobalVersion)
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name(BBOX_CMD)
                .about("Fetch the tiles covering a geographic bounding box")
                .arg(geo_arg(
                    BBOX_NORTH_ARG,
                    "n",
                    "Latitude of north bounding box boundary (in degrees)",
                ))
                .arg(geo_arg(
                    BBOX_SOUTH_ARG,
                    "s",
                    "Latitude of south bounding box boundary (in degrees)",
                ))
                .arg(geo_arg(
                    BBOX_EAST_ARG,
                    "e",
                    "Longitude of east bounding box boundary (in degrees)",
                ))
                .arg(geo_arg(
                    BBOX_WEST_ARG,
                    "w",
                    "Longitude of west bounding box boundary (in degrees)",
                ))
                .arg(
                    Arg::with_name(BBOX_FIXTURE_ARG)
                        .help("Use a known, named bounding box (eg. USA)")
                        .validator(is_bb_fixture)
                        .takes_value(true)
                        .short("f")
                        .long("fixture"),
                )
                .args(&shared_args()),
        )
        .subcommand(
            SubCommand::with_name(TILES_CMD)
                .about("Fetch an explicit, inclusive rectangle of tile indices")
                .arg(tile_arg(LEFT_ARG, "Westernmost tile column (x)"))
                .arg(tile_arg(RIGHT_ARG, "Easternmost tile column (x)"))
                .arg(tile_arg(TOP_ARG, "Northernmost tile row (y)"))
                .arg(tile_arg(BOTTOM_ARG, "Southernmost tile row (y)"))
                .args(&shared_args()),
        )
        .get_matches()
}
