//! Configuration for the external conversion tools.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Paths and limits for `ebook-convert`, `ffmpeg` and `ffprobe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to calibre's ebook-convert binary.
    #[serde(default = "default_ebook_convert_path")]
    pub ebook_convert_path: PathBuf,

    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Temporary directory for concat lists and chapter files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Timeout for a single tool invocation in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Timeout for ffprobe in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Default audio bitrate when re-encoding audiobooks.
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,
}

fn default_ebook_convert_path() -> PathBuf {
    PathBuf::from("ebook-convert")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("librarr-converter")
}

fn default_timeout() -> u64 {
    3600 // 1 hour
}

fn default_probe_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "warning".to_string()
}

fn default_audio_bitrate() -> u32 {
    64
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ebook_convert_path: default_ebook_convert_path(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            temp_dir: default_temp_dir(),
            timeout_secs: default_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            ffmpeg_log_level: default_log_level(),
            audio_bitrate_kbps: default_audio_bitrate(),
        }
    }
}

impl ConverterConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the ebook-convert path.
    pub fn with_ebook_convert(mut self, path: PathBuf) -> Self {
        self.ebook_convert_path = path;
        self
    }

    /// Sets the temp directory.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}
