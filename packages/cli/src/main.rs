#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Withdrawal volume analytics from the command line.
//!
//! ```text
//! prelev entity-trends --records obs.csv --output trends.geojson
//! prelev zone-trends --records obs.csv --zones basins.geojson --output zones.geojson
//! prelev entity-ratios --records obs.csv --authorizations auth.csv --output ratios.csv
//! prelev zone-ratios --records obs.csv --authorizations auth.csv --zones basins.geojson --output zones.csv
//! ```
//!
//! Attribute names are mapped with `--config fields.toml`. Logging is
//! controlled by `RUST_LOG`.

mod commands;
mod progress;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use prelev_models::{DEFAULT_MIN_YEARS, SlopeMethod, TheilSenStrategy, YearRange};
use prelev_trend::TrendOptions;

#[derive(Parser)]
#[command(
    name = "prelev",
    about = "Trend and compliance analytics over yearly withdrawal volumes"
)]
struct Cli {
    /// TOML file mapping input attributes to fields
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Volume trend per entity
    EntityTrends {
        /// Observation layer (CSV or GeoJSON)
        #[arg(long)]
        records: PathBuf,
        /// Polygon layer restricting kept records
        #[arg(long)]
        study_area: Option<PathBuf>,
        #[command(flatten)]
        trend: TrendArgs,
        /// Output file (.csv or .geojson)
        #[arg(long)]
        output: PathBuf,
    },
    /// Volume trend per zone
    ZoneTrends {
        /// Observation layer (CSV or GeoJSON)
        #[arg(long)]
        records: PathBuf,
        /// Zone polygons (GeoJSON)
        #[arg(long)]
        zones: PathBuf,
        #[command(flatten)]
        trend: TrendArgs,
        /// Output file (.csv or .geojson)
        #[arg(long)]
        output: PathBuf,
        /// Optional zone × year sum table
        #[arg(long)]
        zone_year_output: Option<PathBuf>,
    },
    /// Observed vs authorized volume per entity for one year
    EntityRatios {
        /// Observation layer (CSV or GeoJSON)
        #[arg(long)]
        records: PathBuf,
        /// Authorization table (CSV or GeoJSON)
        #[arg(long)]
        authorizations: PathBuf,
        /// Polygon layer restricting kept records
        #[arg(long)]
        study_area: Option<PathBuf>,
        /// Compared year (0 or omitted: latest available)
        #[arg(long)]
        year: Option<i32>,
        /// List entities without authorization
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        include_unmatched: bool,
        /// Output file (.csv or .geojson)
        #[arg(long)]
        output: PathBuf,
    },
    /// Observed vs authorized volume per zone for one year
    ZoneRatios {
        /// Observation layer (CSV or GeoJSON)
        #[arg(long)]
        records: PathBuf,
        /// Authorization table (CSV or GeoJSON)
        #[arg(long)]
        authorizations: PathBuf,
        /// Zone polygons (GeoJSON)
        #[arg(long)]
        zones: PathBuf,
        /// Compared year (0 or omitted: latest available)
        #[arg(long)]
        year: Option<i32>,
        /// Output file (.csv or .geojson)
        #[arg(long)]
        output: PathBuf,
    },
}

/// Options shared by the trend subcommands.
#[derive(Args)]
struct TrendArgs {
    /// Slope estimator (ols, theil-sen)
    #[arg(long, default_value = "ols")]
    method: SlopeMethod,
    /// Theil-Sen median strategy (pairwise, selection)
    #[arg(long, default_value = "selection")]
    theil_sen: TheilSenStrategy,
    /// Minimum number of valid years for a slope
    #[arg(long, default_value_t = DEFAULT_MIN_YEARS)]
    min_years: usize,
    /// First year kept (inclusive)
    #[arg(long)]
    start_year: Option<i32>,
    /// Last year kept (inclusive)
    #[arg(long)]
    end_year: Option<i32>,
}

impl TrendArgs {
    fn into_options(self) -> TrendOptions {
        let year_range = match (self.start_year, self.end_year) {
            (None, None) => None,
            (start, end) => Some(YearRange::new(
                start.unwrap_or(i32::MIN),
                end.unwrap_or(i32::MAX),
            )),
        };
        TrendOptions {
            method: self.method,
            theil_sen: self.theil_sen,
            min_years: self.min_years,
            year_range,
            ..TrendOptions::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = progress::init_logger();
    let cli = Cli::parse();

    let selectors = match &cli.config {
        Some(path) => prelev_io::FieldSelectors::load(path)?,
        None => prelev_io::FieldSelectors::default(),
    };

    let bar = progress::IndicatifProgress::stage_bar(&multi, "Loading inputs");
    let ctx = prelev_models::progress::RunContext::new().with_progress(bar.clone());

    let result = match cli.command {
        Commands::EntityTrends {
            records,
            study_area,
            trend,
            output,
        } => commands::entity_trends(
            &selectors,
            &records,
            study_area.as_deref(),
            &trend.into_options(),
            &output,
            &ctx,
        ),
        Commands::ZoneTrends {
            records,
            zones,
            trend,
            output,
            zone_year_output,
        } => commands::zone_trends(
            &selectors,
            &records,
            &zones,
            &trend.into_options(),
            &output,
            zone_year_output.as_deref(),
            &ctx,
        ),
        Commands::EntityRatios {
            records,
            authorizations,
            study_area,
            year,
            include_unmatched,
            output,
        } => commands::entity_ratios(
            &selectors,
            &records,
            &authorizations,
            study_area.as_deref(),
            &prelev_compliance::RatioOptions {
                year,
                include_unmatched,
                ..prelev_compliance::RatioOptions::default()
            },
            &output,
            &ctx,
        ),
        Commands::ZoneRatios {
            records,
            authorizations,
            zones,
            year,
            output,
        } => commands::zone_ratios(
            &selectors,
            &records,
            &authorizations,
            &zones,
            &prelev_compliance::RatioOptions {
                year,
                include_unmatched: false,
                ..prelev_compliance::RatioOptions::default()
            },
            &output,
            &ctx,
        ),
    };

    bar.finish_and_clear();
    result
}
