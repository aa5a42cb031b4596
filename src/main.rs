use std::env;
use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;

use crystal_reconciler::canvas::Frame;
use crystal_reconciler::{
    parse_element, Canvas, CanvasConfig, FixedViewport, HeadlessSink, NodeId, SceneGraph,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let config = CanvasConfig {
        width: options.width,
        height: options.height,
        ..CanvasConfig::default()
    };
    let viewport = Arc::new(FixedViewport::from_config(&config));
    let mut canvas = Canvas::new(&config, viewport, HeadlessSink::new())?;

    for path in &options.documents {
        let xml = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
        let element = parse_element(&xml).with_context(|| format!("failed to parse {path}"))?;
        canvas
            .set_children(element)
            .with_context(|| format!("failed to render {path}"))?;
        let mounted = canvas.scene().read().traverse(canvas.scene_node()).len() - 1;
        println!("Rendered {path}: {mounted} node(s) mounted");
    }

    for _ in 0..options.frames {
        canvas.frame()?;
    }
    info!("presented {} frame(s)", canvas.frames());
    println!(
        "Presented {} frame(s) at {}x{}",
        canvas.frames(),
        options.width,
        options.height
    );
    if !options.summary_only {
        for frame in canvas.sink().frames() {
            print_frame(frame);
        }
    }

    {
        let graph = canvas.scene().read();
        println!("Final scene graph:");
        print_node(&graph, canvas.scene_node(), 0);
    }

    canvas.unmount()?;
    println!("Unmounted scene");
    Ok(())
}

fn print_frame(frame: &Frame) {
    println!(
        "Frame {}: {} drawable(s), {} light(s)",
        frame.index,
        frame.drawables.len(),
        frame.lights.len()
    );
}

fn print_node(graph: &SceneGraph, id: NodeId, depth: usize) {
    let Some(node) = graph.node(id) else {
        return;
    };
    let object = node.object();
    let position = object.position();
    let mut line = format!(
        "{:indent$} - {} {} pos=({:.2}, {:.2}, {:.2})",
        "",
        object.kind(),
        id,
        position.x,
        position.y,
        position.z,
        indent = depth * 2
    );
    if let Some(color) = object.object("material").and_then(|m| m.vec3("color")) {
        line.push_str(&format!(
            " color=({:.2}, {:.2}, {:.2})",
            color.x, color.y, color.z
        ));
    }
    println!("{line}");
    for child in node.children() {
        print_node(graph, *child, depth + 1);
    }
}

struct CliOptions {
    documents: Vec<String>,
    frames: u32,
    width: u32,
    height: u32,
    summary_only: bool,
}

const USAGE: &str = "Usage: crystal-reconciler <scene.xml> [<update.xml>...] \
    [--frames N] [--size WxH] [--summary-only]";

impl CliOptions {
    fn parse() -> Result<Self> {
        Self::from_args(env::args().skip(1))
    }

    fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let defaults = CanvasConfig::default();
        let mut options = Self {
            documents: Vec::new(),
            frames: 1,
            width: defaults.width,
            height: defaults.height,
            summary_only: false,
        };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => options.summary_only = true,
                "--frames" => {
                    let value = args.next().ok_or_else(|| anyhow!("--frames needs a count"))?;
                    options.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count {value}"))?;
                }
                "--size" => {
                    let value = args.next().ok_or_else(|| anyhow!("--size needs WxH"))?;
                    let (width, height) = parse_size(&value)?;
                    options.width = width;
                    options.height = height;
                }
                other if other.starts_with("--") => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --frames, --size or --summary-only"
                    ));
                }
                _ => options.documents.push(arg),
            }
        }
        if options.documents.is_empty() {
            return Err(anyhow!(USAGE));
        }
        Ok(options)
    }
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| anyhow!("size must look like WxH, got {value}"))?;
    let width: u32 = width.parse().with_context(|| format!("invalid width in {value}"))?;
    let height: u32 = height.parse().with_context(|| format!("invalid height in {value}"))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("size must be non-zero, got {value}"));
    }
    Ok((width, height))
}
