use std::time::Duration;

use crate::model::{Segment, TranscriptResult, WordSegment};
use crate::speakers::summarize_speakers;

/// Joins trimmed, non-empty segment texts with single spaces.
pub fn transcript_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mean of the confidences segments actually report. Segments without a
/// confidence are ignored rather than counted as zero; `None` when no
/// segment reports one.
pub fn average_confidence(segments: &[Segment]) -> Option<f64> {
    let present: Vec<f64> = segments.iter().filter_map(|s| s.confidence).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

/// Merges stage outputs into the terminal transcript record.
///
/// Pure: segments are put in start-time order (stable for equal starts),
/// artifact locators are left empty for the orchestrator to fill in.
pub fn aggregate(
    segments: Vec<Segment>,
    word_segments: Vec<WordSegment>,
    language: Option<String>,
    model_id: &str,
    precision_id: &str,
    elapsed: Duration,
) -> TranscriptResult {
    let mut segments = segments;
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut word_segments = word_segments;
    word_segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    TranscriptResult {
        transcript_text: transcript_text(&segments),
        confidence: average_confidence(&segments),
        speakers: summarize_speakers(&segments),
        segments,
        word_segments,
        language,
        processing_time: elapsed.as_secs_f64(),
        model_used: model_id.to_string(),
        compute_type_used: precision_id.to_string(),
        transcript_url: None,
        timestamps_url: None,
    }
}
