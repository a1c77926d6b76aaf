//! Audiobook processing through `ffprobe` and `ffmpeg`.
//!
//! Supports probing, concatenating multi-part books into one file with
//! generated chapter markers, embedding chapters, splitting a chaptered
//! file back into parts and reading cue sheets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::command::run_tool;
use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::MediaProbe;
use crate::library::extension_of;

/// Cue sheet frames per second.
pub const CUE_FRAMES_PER_SECOND: f64 = 75.0;

/// One chapter marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// What ffprobe reports about an audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    pub path: PathBuf,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    pub format: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

/// Options for [`AudiobookProcessor::concat`].
#[derive(Debug, Clone, Default)]
pub struct ConcatOptions {
    /// Output bitrate; falls back to the configured default.
    pub bitrate_kbps: Option<u32>,
    /// Apply EBU R128 loudness normalization.
    pub normalize: bool,
    /// Explicit chapters. When `None`, one chapter per input is generated.
    pub chapters: Option<Vec<Chapter>>,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Wraps `ffprobe`/`ffmpeg` for audiobook work.
pub struct AudiobookProcessor {
    config: ConverterConfig,
}

impl AudiobookProcessor {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a processor with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Probe a file's duration, bitrate, codec and chapters.
    pub async fn probe_file(&self, path: &Path) -> Result<AudioInfo, ConverterError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            "-show_chapters".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = run_tool(
            "ffprobe",
            &self.config.ffprobe_path,
            &args,
            self.config.probe_timeout_secs,
        )
        .await
        .map_err(|e| match e {
            ConverterError::ConversionFailed { reason, stderr } => ConverterError::probe_failed(
                format!("{}: {}", reason, stderr.unwrap_or_default()),
            ),
            other => other,
        })?;

        parse_probe_output(path, &output.stdout)
    }

    /// Concatenate `inputs` (in order) into one re-encoded `output` with
    /// chapter markers.
    pub async fn concat(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &ConcatOptions,
    ) -> Result<AudioInfo, ConverterError> {
        if inputs.is_empty() {
            return Err(ConverterError::invalid_input("no input files to concatenate"));
        }
        for input in inputs {
            if !tokio::fs::try_exists(input).await.unwrap_or(false) {
                return Err(ConverterError::InputNotFound {
                    path: input.clone(),
                });
            }
        }

        let chapters = match &options.chapters {
            Some(chapters) => chapters.clone(),
            None => {
                let mut parts = Vec::with_capacity(inputs.len());
                for input in inputs {
                    let info = self.probe_file(input).await?;
                    parts.push((chapter_title_from_path(input), info.duration_secs));
                }
                chapters_from_durations(&parts)
            }
        };

        let work_dir = self.work_dir().await?;
        let list_path = work_dir.join("concat.txt");
        let meta_path = work_dir.join("chapters.txt");
        tokio::fs::write(&list_path, build_concat_list(inputs)).await?;
        tokio::fs::write(
            &meta_path,
            build_ffmetadata(
                &chapters,
                options.title.as_deref(),
                options.author.as_deref(),
            ),
        )
        .await?;

        ensure_parent(output).await?;

        let bitrate = options.bitrate_kbps.unwrap_or(self.config.audio_bitrate_kbps);
        let mut args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().to_string(),
            "-i".to_string(),
            meta_path.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:a".to_string(),
            "-map_metadata".to_string(),
            "1".to_string(),
            "-map_chapters".to_string(),
            "1".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", bitrate),
        ];
        if options.normalize {
            args.extend(["-af".to_string(), "loudnorm=I=-16:TP=-1.5:LRA=11".to_string()]);
        }
        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            output.to_string_lossy().to_string(),
        ]);

        let result = self.run_ffmpeg(&args).await;
        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        result?;

        self.verify_output(output).await?;
        info!(
            parts = inputs.len(),
            chapters = chapters.len(),
            output = %output.display(),
            "Audiobook concatenated"
        );

        Ok(AudioInfo {
            path: output.to_path_buf(),
            duration_secs: chapters.last().map(|c| c.end_secs).unwrap_or(0.0),
            bitrate_kbps: Some(bitrate),
            codec: Some("aac".to_string()),
            format: extension_of(output).unwrap_or_default(),
            chapters,
        })
    }

    /// Copy `input` to `output` with the given chapter markers.
    pub async fn embed_chapters(
        &self,
        input: &Path,
        output: &Path,
        chapters: &[Chapter],
    ) -> Result<(), ConverterError> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: input.to_path_buf(),
            });
        }
        if chapters.is_empty() {
            return Err(ConverterError::invalid_input("no chapters to embed"));
        }

        let work_dir = self.work_dir().await?;
        let meta_path = work_dir.join("chapters.txt");
        tokio::fs::write(&meta_path, build_ffmetadata(chapters, None, None)).await?;
        ensure_parent(output).await?;

        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-i".to_string(),
            meta_path.to_string_lossy().to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-map_metadata".to_string(),
            "0".to_string(),
            "-map_chapters".to_string(),
            "1".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            output.to_string_lossy().to_string(),
        ];

        let result = self.run_ffmpeg(&args).await;
        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        result?;
        self.verify_output(output).await?;
        Ok(())
    }

    /// Split a chaptered file into one file per chapter inside `out_dir`.
    pub async fn split_by_chapters(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let info = self.probe_file(input).await?;
        if info.chapters.is_empty() {
            return Err(ConverterError::invalid_input(format!(
                "{} has no chapters",
                input.display()
            )));
        }

        tokio::fs::create_dir_all(out_dir).await.map_err(|_| {
            ConverterError::OutputDirectoryFailed {
                path: out_dir.to_path_buf(),
            }
        })?;

        let ext = extension_of(input).unwrap_or_else(|| "m4a".to_string());
        let mut outputs = Vec::with_capacity(info.chapters.len());
        for (idx, chapter) in info.chapters.iter().enumerate() {
            let name = crate::library::sanitize_filename(&format!(
                "{:02} - {}",
                idx + 1,
                chapter.title
            ));
            let target = out_dir.join(format!("{}.{}", name, ext));
            let args = vec![
                "-y".to_string(),
                "-i".to_string(),
                input.to_string_lossy().to_string(),
                "-ss".to_string(),
                format!("{:.3}", chapter.start_secs),
                "-to".to_string(),
                format!("{:.3}", chapter.end_secs),
                "-map".to_string(),
                "0:a".to_string(),
                "-map_chapters".to_string(),
                "-1".to_string(),
                "-c".to_string(),
                "copy".to_string(),
                "-loglevel".to_string(),
                self.config.ffmpeg_log_level.clone(),
                target.to_string_lossy().to_string(),
            ];
            self.run_ffmpeg(&args).await?;
            self.verify_output(&target).await?;
            outputs.push(target);
        }

        debug!(input = %input.display(), parts = outputs.len(), "Split audiobook by chapters");
        Ok(outputs)
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), ConverterError> {
        run_tool(
            "ffmpeg",
            &self.config.ffmpeg_path,
            args,
            self.config.timeout_secs,
        )
        .await
        .map(|_| ())
    }

    async fn verify_output(&self, output: &Path) -> Result<(), ConverterError> {
        match tokio::fs::metadata(output).await {
            Ok(m) if m.len() > 0 => Ok(()),
            _ => Err(ConverterError::OutputMissing {
                path: output.to_path_buf(),
            }),
        }
    }

    async fn work_dir(&self) -> Result<PathBuf, ConverterError> {
        let dir = self
            .config
            .temp_dir
            .join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|_| ConverterError::OutputDirectoryFailed { path: dir.clone() })?;
        Ok(dir)
    }
}

#[async_trait]
impl MediaProbe for AudiobookProcessor {
    fn name(&self) -> &str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> Result<AudioInfo, ConverterError> {
        self.probe_file(path).await
    }
}

async fn ensure_parent(path: &Path) -> Result<(), ConverterError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|_| {
            ConverterError::OutputDirectoryFailed {
                path: parent.to_path_buf(),
            }
        })?;
    }
    Ok(())
}

/// Parses ffprobe JSON output into [`AudioInfo`].
pub fn parse_probe_output(path: &Path, output: &str) -> Result<AudioInfo, ConverterError> {
    #[derive(Deserialize)]
    struct ProbeOutput {
        format: ProbeFormat,
        #[serde(default)]
        streams: Vec<ProbeStream>,
        #[serde(default)]
        chapters: Vec<ProbeChapter>,
    }

    #[derive(Deserialize)]
    struct ProbeFormat {
        format_name: String,
        duration: Option<String>,
        bit_rate: Option<String>,
    }

    #[derive(Deserialize)]
    struct ProbeStream {
        codec_type: String,
        codec_name: Option<String>,
        bit_rate: Option<String>,
    }

    #[derive(Deserialize)]
    struct ProbeChapter {
        start_time: String,
        end_time: String,
        #[serde(default)]
        tags: Option<ProbeTags>,
    }

    #[derive(Deserialize)]
    struct ProbeTags {
        title: Option<String>,
    }

    let probe: ProbeOutput =
        serde_json::from_str(output).map_err(|e| ConverterError::ParseError {
            reason: format!("Failed to parse ffprobe output: {}", e),
        })?;

    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

    let bitrate_kbps = audio_stream
        .and_then(|s| s.bit_rate.as_ref())
        .or(probe.format.bit_rate.as_ref())
        .and_then(|b| b.parse::<u64>().ok())
        .map(|b| (b / 1000) as u32);

    let chapters = probe
        .chapters
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            Some(Chapter {
                title: c
                    .tags
                    .as_ref()
                    .and_then(|t| t.title.clone())
                    .unwrap_or_else(|| format!("Chapter {}", i + 1)),
                start_secs: c.start_time.parse().ok()?,
                end_secs: c.end_time.parse().ok()?,
            })
        })
        .collect();

    Ok(AudioInfo {
        path: path.to_path_buf(),
        duration_secs: probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0),
        bitrate_kbps,
        codec: audio_stream.and_then(|s| s.codec_name.clone()),
        format: probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string(),
        chapters,
    })
}

/// Lay chapters end to end from per-part durations.
pub fn chapters_from_durations(parts: &[(String, f64)]) -> Vec<Chapter> {
    let mut start = 0.0;
    parts
        .iter()
        .map(|(title, duration)| {
            let chapter = Chapter {
                title: title.clone(),
                start_secs: start,
                end_secs: start + duration.max(0.0),
            };
            start = chapter.end_secs;
            chapter
        })
        .collect()
}

/// Chapter title for a part file: its stem without a leading track number.
pub fn chapter_title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let stripped = stem
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches([' ', '-', '_', '.'])
        .trim();
    if stripped.is_empty() {
        stem
    } else {
        stripped.to_string()
    }
}

/// ffconcat list for the concat demuxer.
pub fn build_concat_list(inputs: &[PathBuf]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for input in inputs {
        let escaped = input.to_string_lossy().replace('\'', r"'\''");
        list.push_str(&format!("file '{}'\n", escaped));
    }
    list
}

fn escape_ffmetadata(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// FFMETADATA1 document with millisecond chapter markers.
pub fn build_ffmetadata(chapters: &[Chapter], title: Option<&str>, artist: Option<&str>) -> String {
    let mut doc = String::from(";FFMETADATA1\n");
    if let Some(title) = title {
        doc.push_str(&format!("title={}\n", escape_ffmetadata(title)));
        doc.push_str(&format!("album={}\n", escape_ffmetadata(title)));
    }
    if let Some(artist) = artist {
        doc.push_str(&format!("artist={}\n", escape_ffmetadata(artist)));
    }
    for chapter in chapters {
        doc.push_str("\n[CHAPTER]\nTIMEBASE=1/1000\n");
        doc.push_str(&format!(
            "START={}\nEND={}\ntitle={}\n",
            (chapter.start_secs * 1000.0).round() as u64,
            (chapter.end_secs * 1000.0).round() as u64,
            escape_ffmetadata(&chapter.title)
        ));
    }
    doc
}

/// Parse a cue timestamp `MM:SS:FF` (75 frames per second) into seconds.
pub fn parse_cue_timestamp(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let minutes: u64 = parts[0].parse().ok()?;
    let seconds: u64 = parts[1].parse().ok()?;
    let frames: u64 = parts[2].parse().ok()?;
    if seconds >= 60 || frames as f64 >= CUE_FRAMES_PER_SECOND {
        return None;
    }
    Some(minutes as f64 * 60.0 + seconds as f64 + frames as f64 / CUE_FRAMES_PER_SECOND)
}

/// Read chapter boundaries from a cue sheet. Each TRACK's `INDEX 01`
/// starts a chapter that ends where the next begins; the last one ends at
/// `total_duration` when known.
pub fn parse_cue_sheet(content: &str, total_duration: Option<f64>) -> Vec<Chapter> {
    let mut starts: Vec<(String, f64)> = Vec::new();
    let mut title: Option<String> = None;
    let mut in_track = false;

    for line in content.lines() {
        let line = line.trim();
        let upper = line.to_ascii_uppercase();
        if upper.starts_with("TRACK ") {
            in_track = true;
            title = None;
        } else if in_track && upper.starts_with("TITLE ") {
            title = Some(unquote(&line[6..]));
        } else if in_track && upper.starts_with("INDEX 01 ") {
            if let Some(start) = parse_cue_timestamp(&line[9..]) {
                let name = title
                    .clone()
                    .unwrap_or_else(|| format!("Chapter {}", starts.len() + 1));
                starts.push((name, start));
            }
        }
    }

    let mut chapters = Vec::with_capacity(starts.len());
    for (i, (name, start)) in starts.iter().enumerate() {
        let end = starts
            .get(i + 1)
            .map(|(_, s)| *s)
            .or(total_duration)
            .unwrap_or(*start);
        chapters.push(Chapter {
            title: name.clone(),
            start_secs: *start,
            end_secs: end.max(*start),
        });
    }
    chapters
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').to_string()
}
