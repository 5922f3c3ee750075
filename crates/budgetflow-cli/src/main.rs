use anyhow::{Context, Result};
use budgetflow_core::{GraphDocument, ParameterError};
use budgetflow_graph::{
    Bounds, GraphModel, LayoutConfig, LayoutDocument, LayoutEngine, LayoutParams, LayoutRequest,
    TracingObserver,
};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input graph document (JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the layout; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Layout config file (JSON); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep this many projects per ministry
    #[arg(long, allow_negative_numbers = true)]
    top_projects: Option<i64>,

    /// Keep this many recipients overall
    #[arg(long, allow_negative_numbers = true)]
    top_recipients: Option<i64>,

    /// Amount threshold for zoom-driven level of detail
    #[arg(long, allow_negative_numbers = true)]
    threshold: Option<f64>,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    zoom: f64,

    /// Cull to minX,minY,maxX,maxY
    #[arg(long, value_parser = parse_viewport, allow_negative_numbers = true)]
    viewport: Option<Bounds>,

    /// Compute one view per zoom level from a shared base layout
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    presets: Vec<f64>,

    #[arg(long)]
    node_width: Option<f64>,

    #[arg(long)]
    node_spacing_x: Option<f64>,

    #[arg(long)]
    node_spacing_y: Option<f64>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

impl Args {
    fn request(&self) -> LayoutRequest {
        LayoutRequest {
            top_projects: self.top_projects,
            top_recipients: self.top_recipients,
            threshold: self.threshold,
            zoom: Some(self.zoom),
            viewport: self.viewport,
            node_width: self.node_width,
            node_spacing_x: self.node_spacing_x,
            node_spacing_y: self.node_spacing_y,
        }
    }
}

fn parse_viewport(value: &str) -> Result<Bounds, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid viewport number: {e}"))?;
    match parts.as_slice() {
        &[min_x, min_y, max_x, max_y] => Ok(Bounds::new(min_x, min_y, max_x, max_y)),
        _ => Err(format!(
            "viewport needs 4 comma-separated numbers, got {}",
            parts.len()
        )),
    }
}

fn read_document(path: &Path) -> Result<GraphDocument> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph document {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse graph document {}", path.display()))
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn preset_key(zoom: f64) -> String {
    format!("{zoom}")
}

/// Each preset works on its own copy of the base layout.
fn layout_presets(
    engine: &LayoutEngine,
    model: &GraphModel,
    params: &LayoutParams,
    presets: &[f64],
) -> Result<BTreeMap<String, LayoutDocument>> {
    let base = engine.base_layout(model, params)?;
    let views = presets
        .par_iter()
        .map(|&zoom| -> Result<(String, LayoutDocument), ParameterError> {
            let local = base.clone();
            let doc = engine.view(&local, &params.with_zoom(zoom))?;
            Ok((preset_key(zoom), doc))
        })
        .collect::<Result<BTreeMap<_, _>, ParameterError>>()?;
    Ok(views)
}

fn run(args: &Args) -> Result<String> {
    let document = read_document(&args.input)?;
    let config = match &args.config {
        Some(path) => LayoutConfig::load(path)?,
        None => LayoutConfig::default(),
    };
    let params = LayoutParams::try_from(args.request())?;

    let start = Instant::now();
    let model = GraphModel::from_document(document);
    let engine = LayoutEngine::new(config).with_observer(Arc::new(TracingObserver));

    let json = if args.presets.is_empty() {
        let doc = engine.layout(&model, &params)?;
        tracing::info!(
            nodes = doc.metadata.node_count,
            edges = doc.metadata.edge_count,
            aggregates = doc.metadata.aggregate_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "layout complete"
        );
        to_json(&doc, args.pretty)?
    } else {
        let views = layout_presets(&engine, &model, &params, &args.presets)?;
        tracing::info!(
            presets = views.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "preset layouts complete"
        );
        to_json(&views, args.pretty)?
    };
    Ok(json)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let json = run(&args)?;

    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Failed to write layout {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
