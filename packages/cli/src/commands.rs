//! One function per subcommand: load inputs, run the pipeline, write the
//! report and print a short summary.

use std::error::Error;
use std::path::Path;

use prelev_compliance::{RatioOptions, entity_ratio_report, zone_ratio_report};
use prelev_io::FieldSelectors;
use prelev_models::progress::RunContext;
use prelev_spatial::ZoneIndex;
use prelev_trend::TrendOptions;

type CommandResult = Result<(), Box<dyn Error>>;

fn load_zone_index(path: &Path, selectors: &FieldSelectors) -> Result<ZoneIndex, Box<dyn Error>> {
    let zones = prelev_io::load_zones(path, selectors)?;
    if zones.is_empty() {
        log::warn!("{} has no usable zone polygon", path.display());
    }
    Ok(ZoneIndex::new(zones))
}

pub fn entity_trends(
    selectors: &FieldSelectors,
    records: &Path,
    study_area: Option<&Path>,
    options: &TrendOptions,
    output: &Path,
    ctx: &RunContext,
) -> CommandResult {
    let layer = prelev_io::load_record_layer(records, selectors)?;
    let study_area = study_area
        .map(|path| load_zone_index(path, selectors))
        .transpose()?;
    let options = TrendOptions {
        layer_has_geometry: layer.has_geometry,
        ..*options
    };

    let report = prelev_trend::entity_trends(&layer.records, study_area.as_ref(), &options, ctx)?;
    let written = prelev_io::write_entity_trends(output, &report)?;

    let with_slope = report.rows.iter().filter(|r| r.metrics.slope.is_some()).count();
    println!("Records: {}", report.stats);
    println!(
        "{written} entities written to {} ({with_slope} with a {} slope)",
        output.display(),
        options.method
    );
    Ok(())
}

pub fn zone_trends(
    selectors: &FieldSelectors,
    records: &Path,
    zones: &Path,
    options: &TrendOptions,
    output: &Path,
    zone_year_output: Option<&Path>,
    ctx: &RunContext,
) -> CommandResult {
    let records = prelev_io::load_records(records, selectors)?;
    let zones = load_zone_index(zones, selectors)?;

    let report = prelev_trend::zone_trends(&records, &zones, options, ctx)?;
    let written = prelev_io::write_zone_trends(output, &report)?;

    println!("Records: {}", report.stats);
    println!(
        "{written} zones written to {} ({} entities outside every zone)",
        output.display(),
        report.unassigned
    );

    if let Some(path) = zone_year_output {
        let rows = prelev_io::write_zone_years(path, &report)?;
        println!("{rows} zone-year rows written to {}", path.display());
    }
    Ok(())
}

pub fn entity_ratios(
    selectors: &FieldSelectors,
    records: &Path,
    authorizations: &Path,
    study_area: Option<&Path>,
    options: &RatioOptions,
    output: &Path,
    ctx: &RunContext,
) -> CommandResult {
    let layer = prelev_io::load_record_layer(records, selectors)?;
    let authorizations = prelev_io::load_authorizations(authorizations, selectors)?;
    let study_area = study_area
        .map(|path| load_zone_index(path, selectors))
        .transpose()?;
    let options = RatioOptions {
        layer_has_geometry: layer.has_geometry,
        ..*options
    };

    let report = entity_ratio_report(
        &layer.records,
        &authorizations,
        study_area.as_ref(),
        &options,
        ctx,
    )?;
    let written = prelev_io::write_entity_ratios(output, &report)?;

    let over = report
        .rows
        .iter()
        .filter(|r| r.result.ratio.is_some_and(|ratio| ratio > 1.0))
        .count();
    println!("Records: {}", report.stats);
    println!(
        "{written} entities for {} written to {} ({over} above their authorized volume)",
        report.year,
        output.display()
    );
    Ok(())
}

pub fn zone_ratios(
    selectors: &FieldSelectors,
    records: &Path,
    authorizations: &Path,
    zones: &Path,
    options: &RatioOptions,
    output: &Path,
    ctx: &RunContext,
) -> CommandResult {
    let records = prelev_io::load_records(records, selectors)?;
    let authorizations = prelev_io::load_authorizations(authorizations, selectors)?;
    let zones = load_zone_index(zones, selectors)?;

    let report = zone_ratio_report(&records, &authorizations, &zones, options, ctx)?;
    let written = prelev_io::write_zone_ratios(output, &report)?;

    println!("Records: {}", report.stats);
    println!(
        "{written} zone rows for {} written to {} ({} entities matched, {} without authorization)",
        report.year,
        output.display(),
        report.matched,
        report.unmatched
    );
    Ok(())
}
