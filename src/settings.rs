use std::path::Path;

use crate::components::history::DEFAULT_HISTORY_SIZE;
use crate::components::tools::{ToolMode, ToolSettings};
use crate::error::SettingsError;

/// Engine configuration: initial canvas size, undo depth and the initial
/// tool settings.  Read from a plain `key=value` file.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub default_width: u32,
    pub default_height: u32,
    pub undo_limit: usize,
    pub tools: ToolSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_width: 1024,
            default_height: 1024,
            undo_limit: DEFAULT_HISTORY_SIZE,
            tools: ToolSettings::default(),
        }
    }
}

fn parse_value<T: std::str::FromStr>(line: usize, key: &str, val: &str) -> Result<T, SettingsError> {
    val.parse().map_err(|_| SettingsError::InvalidValue {
        line,
        key: key.to_string(),
        value: val.to_string(),
    })
}

impl EngineSettings {
    /// Apply one `key=value` line.  Blank lines, `#` comments and unknown
    /// keys are ignored; values go through the same clamps as the runtime
    /// setters.
    pub fn load_config_line(&mut self, line_no: usize, line: &str) -> Result<(), SettingsError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let Some((key, val)) = line.split_once('=') else {
            log::debug!("settings line {line_no}: no '=' in {line:?}, skipped");
            return Ok(());
        };
        let key = key.trim();
        let val = val.trim();
        match key {
            "default_width" => self.default_width = parse_value::<u32>(line_no, key, val)?.max(1),
            "default_height" => self.default_height = parse_value::<u32>(line_no, key, val)?.max(1),
            "undo_limit" => self.undo_limit = parse_value::<usize>(line_no, key, val)?.max(1),
            "brush_size" => {
                self.tools.set_brush_size(parse_value(line_no, key, val)?);
            }
            "gray_value" => {
                self.tools.set_gray_value(parse_value(line_no, key, val)?);
            }
            "tool_mode" => {
                self.tools.set_mode(ToolMode::parse(val));
            }
            "temp_start" => {
                self.tools.set_temp_start(parse_value(line_no, key, val)?);
            }
            "temp_end" => {
                self.tools.set_temp_end(parse_value(line_no, key, val)?);
            }
            "temp_pause_on_idle" => {
                self.tools.set_temp_pause_on_idle(parse_value(line_no, key, val)?);
            }
            "fill_tolerance" => {
                self.tools.set_fill_tolerance(parse_value(line_no, key, val)?);
            }
            "fill_sample_all_layers" => {
                self.tools.set_fill_sample_all_layers(parse_value(line_no, key, val)?);
            }
            "fill_contiguous" => {
                self.tools.set_fill_contiguous(parse_value(line_no, key, val)?);
            }
            other => log::debug!("settings line {line_no}: unknown key {other:?}"),
        }
        Ok(())
    }

    pub fn from_cfg_str(content: &str) -> Result<Self, SettingsError> {
        let mut s = Self::default();
        for (i, line) in content.lines().enumerate() {
            s.load_config_line(i + 1, line)?;
        }
        Ok(s)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_cfg_str(&content)?;
        log::info!("loaded engine settings from {}", path.display());
        Ok(settings)
    }

    /// Render in the format `from_cfg_str` reads.
    pub fn to_cfg_string(&self) -> String {
        let t = &self.tools;
        format!(
            "default_width={}\n\
             default_height={}\n\
             undo_limit={}\n\
             brush_size={}\n\
             gray_value={}\n\
             tool_mode={}\n\
             temp_start={}\n\
             temp_end={}\n\
             temp_pause_on_idle={}\n\
             fill_tolerance={}\n\
             fill_sample_all_layers={}\n\
             fill_contiguous={}\n",
            self.default_width,
            self.default_height,
            self.undo_limit,
            t.brush_size,
            t.gray_value,
            t.mode.as_str(),
            t.temp_start,
            t.temp_end,
            t.temp_pause_on_idle,
            t.fill_tolerance,
            t.fill_sample_all_layers,
            t.fill_contiguous,
        )
    }
}
