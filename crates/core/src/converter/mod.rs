//! External conversion tools.
//!
//! Format conversion is delegated to mature binaries rather than done
//! in-process:
//!
//! - `ebook-convert` (calibre) for ebook reflow between formats
//! - `ffprobe` / `ffmpeg` for audiobook probing, concatenation, chapter
//!   embedding and splitting
//!
//! Every invocation runs as a `tokio::process` child with a deadline and
//! is killed if it overruns.

mod audiobook;
mod command;
mod config;
mod ebook;
mod error;
mod traits;

pub use audiobook::{
    build_concat_list, build_ffmetadata, chapter_title_from_path, chapters_from_durations,
    parse_cue_sheet, parse_cue_timestamp, parse_probe_output, AudioInfo, AudiobookProcessor,
    Chapter, ConcatOptions, CUE_FRAMES_PER_SECOND,
};
pub use config::ConverterConfig;
pub use ebook::{EbookConverter, EBOOK_OUTPUT_FORMATS};
pub use error::ConverterError;
pub use traits::MediaProbe;
