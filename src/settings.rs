use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const SETTINGS_FILE_NAME: &str = "settings.json";
const CONFIG_DIR_NAME: &str = "memoscribe";

/// Waveform display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformMode {
    /// Time-ordered history that shifts left as new samples arrive.
    Scrolling,
    /// Fixed-position bars updated in place, mirrored about the center.
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerSettings {
    pub mode: WaveformMode,

    /// Bar width in pixels.
    pub bar_width: u32,

    /// Gap between bars in pixels.
    pub bar_gap: u32,

    /// Minimum rendered bar height in pixels, so silence stays visible.
    pub min_bar_height: u32,

    /// Bar color as RGB.
    pub bar_color: [u8; 3],

    /// Fade bars out near the left/right edges instead of hard-clipping.
    pub fade_edges: bool,

    /// Width of the edge fade region in pixels.
    pub fade_width: u32,

    /// Multiplier applied to reduced amplitude values before clamping.
    pub sensitivity: f32,

    /// Analyser magnitude smoothing (0 = none, values near 1 = heavy).
    pub smoothing_time_constant: f32,

    /// FFT window size. Must be a power of two.
    pub fft_size: usize,

    /// Scrolling-mode history capacity in samples.
    pub history_size: usize,

    /// Minimum interval between analyser pulls, in milliseconds.
    /// The render loop runs every frame; sampling is rate-limited to this.
    pub update_rate_ms: u64,

    /// Per-frame interpolation factor for static-mode bar chasing.
    pub lerp_factor: f32,

    /// Draw a soft glow under bars above the intensity threshold.
    pub glow_enabled: bool,
}

impl Default for VisualizerSettings {
    fn default() -> Self {
        Self {
            mode: WaveformMode::Static,
            bar_width: 3,
            bar_gap: 1,
            min_bar_height: 4,
            bar_color: [93, 121, 223],
            fade_edges: true,
            fade_width: 24,
            sensitivity: 1.0,
            smoothing_time_constant: 0.8,
            fft_size: 256,
            history_size: 60,
            update_rate_ms: 30,
            lerp_factor: 0.15,
            glow_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub visualizer: VisualizerSettings,

    /// Language code sent to the transcription service.
    pub language_code: String,

    /// Preferred input device name. `None` uses the system default.
    pub input_device: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            visualizer: VisualizerSettings::default(),
            language_code: "en".to_string(),
            input_device: None,
        }
    }
}

fn settings_path() -> Result<PathBuf, String> {
    let dir =
        dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join(CONFIG_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Load settings from disk. Never fails: a missing or malformed file
/// falls back to defaults with a warning.
pub fn load_settings() -> AppSettings {
    let path = match settings_path() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Settings: {}", e);
            return AppSettings::default();
        }
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    let path = settings_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }
    let contents = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(&path, contents).map_err(|e| format!("Failed to write {:?}: {}", path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let settings = AppSettings::default();
        assert_eq!(settings.visualizer.fft_size, 256);
        assert!(settings.visualizer.fft_size.is_power_of_two());
        assert_eq!(settings.visualizer.history_size, 60);
        assert!(settings.visualizer.sensitivity > 0.0);
        assert_eq!(settings.language_code, "en");
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let parsed: AppSettings = serde_json::from_str(r#"{"language_code":"de"}"#).expect("parse");
        assert_eq!(parsed.language_code, "de");
        assert_eq!(parsed.visualizer.bar_width, 3);
    }

    #[test]
    fn test_mode_round_trips_lowercase() {
        let json = serde_json::to_string(&WaveformMode::Scrolling).expect("serialize");
        assert_eq!(json, "\"scrolling\"");
        let back: WaveformMode = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, WaveformMode::Scrolling);
    }
}
