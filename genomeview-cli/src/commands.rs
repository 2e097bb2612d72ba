use anyhow::{Context, Result, bail};
use shared::ranges;
use shared::{ControllerSnapshot, ViewerConfig};
use std::fmt::Write;
use std::sync::Arc;
use viewer::{GeneTable, Selection, SelectionContext};

/// Range text given on the command line, in one of the two range units.
pub enum RangeInput {
    Locations(String),
    Segments(String),
}

fn selection_context(config: &ViewerConfig) -> Result<(SelectionContext, bool)> {
    let table = GeneTable::from_config(config).context("Invalid project section")?;
    let has_genes = !table.is_empty();
    let interval = config.project.interval()?;
    Ok((SelectionContext::new(interval, Arc::new(table)), has_genes))
}

fn describe(out: &mut String, selection: &Selection) -> Result<()> {
    writeln!(out, "Unit:      {}", selection.unit())?;
    writeln!(
        out,
        "Locations: {}",
        ranges::format(&selection.as_locations()?)
    )?;
    writeln!(out, "Segments:  {}", ranges::format(&selection.as_segments()?))?;
    Ok(())
}

pub async fn convert(config: &ViewerConfig, input: RangeInput) -> Result<String> {
    let (context, has_genes) = selection_context(config)?;
    let selection = match input {
        RangeInput::Locations(text) => {
            let locations = ranges::parse(&text).context("Invalid location ranges")?;
            Selection::from_locations(&context, locations)
        }
        RangeInput::Segments(text) => {
            let segments = ranges::parse(&text).context("Invalid segment ranges")?;
            Selection::from_segments(&context, segments)?
        }
    };

    let mut out = String::new();
    describe(&mut out, &selection)?;
    if has_genes {
        let genes = selection.as_genes().await?;
        writeln!(out, "Genes:     {}", ranges::format_gene_list(&genes))?;
    } else {
        log::info!("Config has no gene table; skipping gene lookup");
    }
    Ok(out)
}

pub async fn genes(config: &ViewerConfig, names: &str) -> Result<String> {
    let genes = ranges::parse_gene_list(names);
    if genes.is_empty() {
        bail!("No gene names given");
    }
    let (context, _) = selection_context(config)?;
    let selection = Selection::from_genes(&context, genes).await?;

    let mut out = String::new();
    describe(&mut out, &selection)?;
    Ok(out)
}

pub fn inspect(token: &str) -> Result<String> {
    let snapshot = ControllerSnapshot::from_token(token).context("Not a controller state token")?;
    Ok(serde_json::to_string_pretty(&snapshot)?)
}
