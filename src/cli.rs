// ============================================================================
// TemporalPaint CLI — replay a command script against a headless document
// ============================================================================
//
// Usage examples:
//   TemporalPaint --script session.txt
//   TemporalPaint --script session.txt --width 256 --height 256 --layers-json
//   TemporalPaint -s session.txt --config engine.cfg --verbose
//
// Script format: one command per line, whitespace-separated arguments,
// `#` starts a comment.  Pointer commands accept an optional trailing
// timestamp in milliseconds.
//
//   tool temporal            brush_size 4          gray 200
//   press 10 10 0            move 40 10 120        release 80 10 300
//   stroke 0 5 20 5 40 5     fill 3 3
//   add_layer                opacity 1 0.5         blend 1 multiply
//   resize 128 64 topLeft    levels 0 10 240 128   undo / redo
// ============================================================================

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::canvas::{BlendMode, CanvasAnchor};
use crate::components::tools::ToolMode;
use crate::error::{CanvasError, ScriptError};
use crate::project::Project;
use crate::settings::EngineSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// TemporalPaint headless runner.
///
/// Builds a document, replays a command script against it and prints the
/// resulting layer stack.
#[derive(Parser, Debug)]
#[command(
    name = "TemporalPaint",
    about = "Replay a TemporalPaint command script without a GUI",
    long_about = "Creates a blank document, replays the pointer and layer commands in\n\
                  a script file, and prints layer metadata, history availability and\n\
                  composite statistics.\n\n\
                  Example:\n  \
                  TemporalPaint --script session.txt --width 512 --height 512"
)]
pub struct CliArgs {
    /// Command script to replay.
    #[arg(short, long, value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Canvas width (overrides the config file).
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,

    /// Canvas height (overrides the config file).
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,

    /// Engine settings file (`key=value` lines).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print layer metadata as JSON instead of a table.
    #[arg(long)]
    pub layers_json: bool,

    /// Echo each command and log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Script commands
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum ScriptCommand {
    Press { x: f32, y: f32, time_ms: Option<f64> },
    Move { x: f32, y: f32, time_ms: Option<f64> },
    Release { x: f32, y: f32, time_ms: Option<f64> },
    /// Press at the first point, move through the middle, release at the last.
    Stroke(Vec<(f32, f32)>),
    /// Press + release with the current tool (intended for `tool fill`).
    Click { x: f32, y: f32 },
    BrushSize(i64),
    Gray(i64),
    Tool(ToolMode),
    TempStart(f32),
    TempEnd(f32),
    PauseOnIdle(bool),
    Tolerance(i64),
    SampleAll(bool),
    Contiguous(bool),
    AddLayer,
    DuplicateLayer(usize),
    DeleteLayer(usize),
    SetActive(usize),
    Opacity(usize, f32),
    Visible(usize, bool),
    Blend(usize, BlendMode),
    Rename(usize, String),
    MoveLayer(usize, usize),
    LayerUp(usize),
    LayerDown(usize),
    Resize(u32, u32, CanvasAnchor),
    Levels { index: usize, min: i64, max: i64, center: i64 },
    Undo,
    Redo,
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

impl ScriptCommand {
    /// Parse one script line.  `Ok(None)` for blank and comment lines.
    pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Self>, ScriptError> {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(None);
        }
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let bad = |expected: &'static str| ScriptError::BadArguments {
            line: line_no,
            command: name.to_string(),
            expected,
        };
        let num = |i: usize, expected: &'static str| -> Result<f64, ScriptError> {
            args.get(i).and_then(|s| s.parse::<f64>().ok()).ok_or_else(|| bad(expected))
        };
        let index = |i: usize, expected: &'static str| -> Result<usize, ScriptError> {
            args.get(i).and_then(|s| s.parse::<usize>().ok()).ok_or_else(|| bad(expected))
        };
        let flag = |i: usize, expected: &'static str| -> Result<bool, ScriptError> {
            args.get(i).and_then(|s| parse_bool(s)).ok_or_else(|| bad(expected))
        };
        let point = |expected: &'static str| -> Result<(f32, f32, Option<f64>), ScriptError> {
            if args.len() < 2 || args.len() > 3 {
                return Err(bad(expected));
            }
            let t = if args.len() == 3 { Some(num(2, expected)?) } else { None };
            Ok((num(0, expected)? as f32, num(1, expected)? as f32, t))
        };

        const POINT: &str = "X Y [TIME_MS]";
        let cmd = match name {
            "press" => {
                let (x, y, time_ms) = point(POINT)?;
                ScriptCommand::Press { x, y, time_ms }
            }
            "move" => {
                let (x, y, time_ms) = point(POINT)?;
                ScriptCommand::Move { x, y, time_ms }
            }
            "release" => {
                let (x, y, time_ms) = point(POINT)?;
                ScriptCommand::Release { x, y, time_ms }
            }
            "stroke" => {
                const PAIRS: &str = "at least one X Y pair";
                if args.is_empty() || args.len() % 2 != 0 {
                    return Err(bad(PAIRS));
                }
                let mut pts = Vec::with_capacity(args.len() / 2);
                for i in (0..args.len()).step_by(2) {
                    pts.push((num(i, PAIRS)? as f32, num(i + 1, PAIRS)? as f32));
                }
                ScriptCommand::Stroke(pts)
            }
            "fill" | "click" => ScriptCommand::Click {
                x: num(0, "X Y")? as f32,
                y: num(1, "X Y")? as f32,
            },
            "brush_size" => ScriptCommand::BrushSize(num(0, "SIZE")? as i64),
            "gray" => ScriptCommand::Gray(num(0, "VALUE (0-255)")? as i64),
            "tool" => ScriptCommand::Tool(ToolMode::parse(args.first().ok_or_else(|| bad("MODE"))?)),
            "temp_start" => ScriptCommand::TempStart(num(0, "FRACTION")? as f32),
            "temp_end" => ScriptCommand::TempEnd(num(0, "FRACTION")? as f32),
            "pause_on_idle" => ScriptCommand::PauseOnIdle(flag(0, "true|false")?),
            "tolerance" => ScriptCommand::Tolerance(num(0, "PERCENT")? as i64),
            "sample_all" => ScriptCommand::SampleAll(flag(0, "true|false")?),
            "contiguous" => ScriptCommand::Contiguous(flag(0, "true|false")?),
            "add_layer" => ScriptCommand::AddLayer,
            "duplicate_layer" => ScriptCommand::DuplicateLayer(index(0, "INDEX")?),
            "delete_layer" => ScriptCommand::DeleteLayer(index(0, "INDEX")?),
            "active" => ScriptCommand::SetActive(index(0, "INDEX")?),
            "opacity" => ScriptCommand::Opacity(index(0, "INDEX VALUE")?, num(1, "INDEX VALUE")? as f32),
            "visible" => ScriptCommand::Visible(index(0, "INDEX true|false")?, flag(1, "INDEX true|false")?),
            "blend" => ScriptCommand::Blend(
                index(0, "INDEX MODE")?,
                BlendMode::parse(args.get(1).ok_or_else(|| bad("INDEX MODE"))?),
            ),
            "rename" => {
                let idx = index(0, "INDEX NAME")?;
                if args.len() < 2 {
                    return Err(bad("INDEX NAME"));
                }
                ScriptCommand::Rename(idx, args[1..].join(" "))
            }
            "move_layer" => ScriptCommand::MoveLayer(index(0, "FROM TO")?, index(1, "FROM TO")?),
            "layer_up" => ScriptCommand::LayerUp(index(0, "INDEX")?),
            "layer_down" => ScriptCommand::LayerDown(index(0, "INDEX")?),
            "resize" => {
                const SIZE: &str = "WIDTH HEIGHT [ANCHOR]";
                let w = num(0, SIZE)?.max(0.0) as u32;
                let h = num(1, SIZE)?.max(0.0) as u32;
                let anchor = args.get(2).map(|a| CanvasAnchor::parse(a)).unwrap_or_default();
                ScriptCommand::Resize(w, h, anchor)
            }
            "levels" => {
                const LEVELS: &str = "INDEX MIN MAX CENTER";
                ScriptCommand::Levels {
                    index: index(0, LEVELS)?,
                    min: num(1, LEVELS)? as i64,
                    max: num(2, LEVELS)? as i64,
                    center: num(3, LEVELS)? as i64,
                }
            }
            "undo" => ScriptCommand::Undo,
            "redo" => ScriptCommand::Redo,
            other => {
                return Err(ScriptError::UnknownCommand {
                    line: line_no,
                    command: other.to_string(),
                })
            }
        };
        Ok(Some(cmd))
    }

    /// Parse a whole script.
    pub fn parse_script(source: &str) -> Result<Vec<Self>, ScriptError> {
        let mut commands = Vec::new();
        for (i, line) in source.lines().enumerate() {
            if let Some(cmd) = Self::parse_line(i + 1, line)? {
                commands.push(cmd);
            }
        }
        Ok(commands)
    }

    /// Execute against `project`.  Returns whether the document changed.
    pub fn apply(&self, project: &mut Project) -> Result<bool, CanvasError> {
        let pointer = |project: &mut Project, kind: u8, x: f32, y: f32, t: Option<f64>| match (kind, t) {
            (0, Some(t)) => project.press_at(x, y, t),
            (0, None) => project.press(x, y),
            (1, Some(t)) => project.move_at(x, y, t),
            (1, None) => project.move_to(x, y),
            (_, Some(t)) => project.release_at(x, y, t),
            (_, None) => project.release(x, y),
        };
        Ok(match self {
            ScriptCommand::Press { x, y, time_ms } => pointer(project, 0, *x, *y, *time_ms),
            ScriptCommand::Move { x, y, time_ms } => pointer(project, 1, *x, *y, *time_ms),
            ScriptCommand::Release { x, y, time_ms } => pointer(project, 2, *x, *y, *time_ms),
            ScriptCommand::Stroke(points) => {
                let Some((&first, rest)) = points.split_first() else {
                    return Ok(false);
                };
                let mut changed = project.press(first.0, first.1);
                let last = rest.last().copied().unwrap_or(first);
                for &(x, y) in rest.iter().take(rest.len().saturating_sub(1)) {
                    changed |= project.move_to(x, y);
                }
                changed |= project.release(last.0, last.1);
                changed
            }
            ScriptCommand::Click { x, y } => {
                let pressed = project.press(*x, *y);
                project.release(*x, *y) || pressed
            }
            ScriptCommand::BrushSize(v) => project.set_brush_size(*v),
            ScriptCommand::Gray(v) => project.set_gray_value(*v),
            ScriptCommand::Tool(mode) => project.set_tool_mode(*mode),
            ScriptCommand::TempStart(v) => project.set_temp_start(*v),
            ScriptCommand::TempEnd(v) => project.set_temp_end(*v),
            ScriptCommand::PauseOnIdle(v) => project.set_temp_pause_on_idle(*v),
            ScriptCommand::Tolerance(v) => project.set_fill_tolerance(*v),
            ScriptCommand::SampleAll(v) => project.set_fill_sample_all_layers(*v),
            ScriptCommand::Contiguous(v) => project.set_fill_contiguous(*v),
            ScriptCommand::AddLayer => project.add_layer()?,
            ScriptCommand::DuplicateLayer(i) => project.duplicate_layer(*i),
            ScriptCommand::DeleteLayer(i) => project.delete_layer(*i),
            ScriptCommand::SetActive(i) => project.set_active_layer(*i),
            ScriptCommand::Opacity(i, v) => project.set_layer_opacity(*i, *v),
            ScriptCommand::Visible(i, v) => project.set_layer_visible(*i, *v),
            ScriptCommand::Blend(i, mode) => project.set_layer_blend_mode(*i, *mode),
            ScriptCommand::Rename(i, name) => project.rename_layer(*i, name),
            ScriptCommand::MoveLayer(from, to) => project.move_layer(*from, *to),
            ScriptCommand::LayerUp(i) => project.move_layer_up(*i),
            ScriptCommand::LayerDown(i) => project.move_layer_down(*i),
            ScriptCommand::Resize(w, h, anchor) => project.resize_canvas(*w, *h, *anchor)?,
            ScriptCommand::Levels { index, min, max, center } => {
                project.apply_levels(*index, *min, *max, *center)
            }
            ScriptCommand::Undo => project.undo(),
            ScriptCommand::Redo => project.redo(),
        })
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the script and print a summary.  `0` on success, `1` on any error.
pub fn run(args: CliArgs) -> ExitCode {
    match run_script(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_settings(args: &CliArgs) -> Result<EngineSettings, String> {
    let mut settings = match &args.config {
        Some(path) => EngineSettings::load(path).map_err(|e| format!("{}: {}", path.display(), e))?,
        None => EngineSettings::default(),
    };
    if let Some(w) = args.width {
        settings.default_width = w;
    }
    if let Some(h) = args.height {
        settings.default_height = h;
    }
    Ok(settings)
}

fn read_script(path: &Path) -> Result<Vec<ScriptCommand>, String> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read script '{}': {}", path.display(), ScriptError::from(e)))?;
    ScriptCommand::parse_script(&source).map_err(|e| format!("{}: {}", path.display(), e))
}

fn run_script(args: &CliArgs) -> Result<(), String> {
    let settings = load_settings(args)?;
    let commands = read_script(&args.script)?;
    let mut project = Project::with_settings(&settings).map_err(|e| e.to_string())?;
    project.name = args
        .script
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());

    let start = Instant::now();
    for (i, cmd) in commands.iter().enumerate() {
        let changed = cmd.apply(&mut project).map_err(|e| format!("command {}: {}", i + 1, e))?;
        if args.verbose {
            println!("  {:>4} {:<40} {}", i + 1, format!("{:?}", cmd), if changed { "changed" } else { "-" });
        }
        log::debug!("script command {} {:?} -> changed={}", i + 1, cmd, changed);
    }
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    print_summary(&mut project, args.layers_json, commands.len(), elapsed_ms)
}

fn print_summary(project: &mut Project, as_json: bool, count: usize, elapsed_ms: f64) -> Result<(), String> {
    println!(
        "{}: {} commands in {:.1}ms, canvas {}×{}",
        project.name,
        count,
        elapsed_ms,
        project.canvas_width(),
        project.canvas_height()
    );

    if as_json {
        let json = serde_json::to_string_pretty(&project.layers()).map_err(|e| e.to_string())?;
        println!("{}", json);
    } else {
        for info in project.layers().iter().rev() {
            println!("  {}", info.summary());
        }
    }

    println!(
        "undo: {} ({} steps)  redo: {} ({} steps)",
        project.can_undo(),
        project.history().undo_count(),
        project.can_redo(),
        project.history().redo_count()
    );

    let stats = CompositeStats::measure(project).map_err(|e| e.to_string())?;
    println!(
        "composite: {:.1}% covered, mean gray {:.1}",
        stats.coverage * 100.0,
        stats.mean_gray
    );
    Ok(())
}

/// Coverage and mean straight intensity of the composite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositeStats {
    /// Fraction of pixels with non-zero alpha.
    pub coverage: f64,
    /// Mean un-premultiplied red over covered pixels (0 when none).
    pub mean_gray: f64,
}

impl CompositeStats {
    pub fn measure(project: &mut Project) -> Result<Self, CanvasError> {
        let composite = project.composite()?;
        let total = composite.width() as u64 * composite.height() as u64;
        let (mut covered, mut sum) = (0u64, 0u64);
        for y in 0..composite.height() {
            for x in 0..composite.width() {
                if let Some(px) = composite.get_straight(x, y)
                    && px[3] > 0
                {
                    covered += 1;
                    sum += px[0] as u64;
                }
            }
        }
        Ok(Self {
            coverage: if total == 0 { 0.0 } else { covered as f64 / total as f64 },
            mean_gray: if covered == 0 { 0.0 } else { sum as f64 / covered as f64 },
        })
    }
}
