//! Quality profiles and best-candidate selection.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::indexer::SearchResult;
use crate::library::MediaType;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Plausible ebook size range.
pub const EBOOK_SIZE_RANGE: (u64, u64) = (100 * KB, 100 * MB);
/// Plausible audiobook size range.
pub const AUDIOBOOK_SIZE_RANGE: (u64, u64) = (50 * MB, 5 * GB);

/// Named policy ranking acceptable formats for a media type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityProfile {
    pub name: String,
    pub media_type: MediaType,
    /// Formats in order of preference, earliest best.
    pub formats: Vec<String>,
    /// Audiobook results with a known bitrate below this are discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bitrate_kbps: Option<u32>,
}

impl QualityProfile {
    /// Built-in profile used when none is configured for a media type.
    pub fn default_for(media_type: MediaType) -> Self {
        match media_type {
            MediaType::Ebook => Self {
                name: "Default Ebook".to_string(),
                media_type,
                formats: ["EPUB", "AZW3", "MOBI", "PDF"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                min_bitrate_kbps: None,
            },
            MediaType::Audiobook => Self {
                name: "Default Audiobook".to_string(),
                media_type,
                formats: ["M4B", "MP3", "M4A", "FLAC"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                min_bitrate_kbps: Some(64),
            },
        }
    }

    /// First configured profile for the media type, else the built-in one.
    pub fn for_media_type(profiles: &[QualityProfile], media_type: MediaType) -> Self {
        profiles
            .iter()
            .find(|p| p.media_type == media_type)
            .cloned()
            .unwrap_or_else(|| Self::default_for(media_type))
    }

    /// Pick the best result under this profile.
    pub fn best<'a>(&self, results: &'a [SearchResult]) -> Option<&'a SearchResult> {
        get_best_result(
            results,
            &self.formats,
            self.min_bitrate_kbps,
            self.media_type == MediaType::Audiobook,
        )
    }

    /// Order results under this profile, dropping disqualified ones.
    pub fn rank(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        rank_results(
            results,
            &self.formats,
            self.min_bitrate_kbps,
            self.media_type == MediaType::Audiobook,
        )
    }
}

/// Sort key, smaller is better.
type RankKey = (usize, bool, Reverse<u32>, bool);

fn rank_key(result: &SearchResult, format_ranking: &[String], is_audiobook: bool) -> RankKey {
    let format_rank = result
        .format
        .as_deref()
        .and_then(|f| {
            format_ranking
                .iter()
                .position(|r| r.eq_ignore_ascii_case(f))
        })
        .unwrap_or(format_ranking.len());

    let (min, max) = if is_audiobook {
        AUDIOBOOK_SIZE_RANGE
    } else {
        EBOOK_SIZE_RANGE
    };
    let plausible = (min..=max).contains(&result.size_bytes);

    (
        format_rank,
        !result.freeleech,
        Reverse(result.seeders),
        !plausible,
    )
}

fn passes_bitrate(result: &SearchResult, min_bitrate: Option<u32>, is_audiobook: bool) -> bool {
    match (is_audiobook, min_bitrate, result.bitrate_kbps) {
        (true, Some(min), Some(bitrate)) => bitrate >= min,
        _ => true,
    }
}

/// Choose the best candidate.
///
/// Format position in `format_ranking` decides first (unlisted formats
/// rank last but stay eligible), then freeleech, then seeders, then
/// whether the size is plausible for the media type. Ties keep input
/// order. Audiobook results with a known bitrate below `min_bitrate` are
/// discarded. `None` means no acceptable candidate.
pub fn get_best_result<'a>(
    results: &'a [SearchResult],
    format_ranking: &[String],
    min_bitrate: Option<u32>,
    is_audiobook: bool,
) -> Option<&'a SearchResult> {
    results
        .iter()
        .filter(|r| passes_bitrate(r, min_bitrate, is_audiobook))
        .map(|r| (rank_key(r, format_ranking, is_audiobook), r))
        // min_by_key returns the first minimum, which keeps ties stable
        .min_by_key(|(key, _)| *key)
        .map(|(_, r)| r)
}

/// Full ordering under the same rules as [`get_best_result`].
pub fn rank_results(
    results: Vec<SearchResult>,
    format_ranking: &[String],
    min_bitrate: Option<u32>,
    is_audiobook: bool,
) -> Vec<SearchResult> {
    let mut ranked: Vec<(RankKey, SearchResult)> = results
        .into_iter()
        .filter(|r| passes_bitrate(r, min_bitrate, is_audiobook))
        .map(|r| (rank_key(&r, format_ranking, is_audiobook), r))
        .collect();
    ranked.sort_by_key(|(key, _)| *key);
    ranked.into_iter().map(|(_, r)| r).collect()
}
