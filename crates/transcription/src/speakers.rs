//! Speaker attribution for diarized transcripts.

use std::collections::HashMap;

use crate::model::{Segment, SpeakerSummary, SpeakerTurn};

/// Overlap in seconds between `[a_start, a_end]` and `[b_start, b_end]`.
fn overlap(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

/// Picks the speaker with the largest total overlap over `[start, end]`.
///
/// Ties go to the speaker whose turn was seen first.
fn dominant_speaker(turns: &[SpeakerTurn], start: f64, end: f64) -> Option<String> {
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for turn in turns {
        let shared = overlap(start, end, turn.start, turn.end);
        if shared <= 0.0 {
            continue;
        }
        match totals.iter_mut().find(|(speaker, _)| *speaker == turn.speaker) {
            Some((_, total)) => *total += shared,
            None => totals.push((&turn.speaker, shared)),
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for (speaker, total) in totals {
        if best.is_none_or(|(_, best_total)| total > best_total) {
            best = Some((speaker, total));
        }
    }
    best.map(|(speaker, _)| speaker.to_string())
}

/// Labels every segment and word with the speaker that overlaps it most.
///
/// Segments and words that no turn overlaps keep no label.
pub fn assign_speakers(turns: &[SpeakerTurn], segments: &[Segment]) -> Vec<Segment> {
    segments
        .iter()
        .map(|segment| {
            let mut labelled = segment.clone();
            labelled.speaker = dominant_speaker(turns, segment.start, segment.end);
            for word in &mut labelled.words {
                word.speaker = dominant_speaker(turns, word.start, word.end);
            }
            labelled
        })
        .collect()
}

/// Per-speaker totals over segments that carry a speaker label, in order of
/// first appearance.
pub fn summarize_speakers(segments: &[Segment]) -> Vec<SpeakerSummary> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut summaries: Vec<SpeakerSummary> = Vec::new();

    for segment in segments {
        let Some(speaker) = segment.speaker.as_deref() else {
            continue;
        };
        let slot = *index.entry(speaker).or_insert_with(|| {
            summaries.push(SpeakerSummary {
                id: speaker.to_string(),
                total_speech_time: 0.0,
                segments_count: 0,
            });
            summaries.len() - 1
        });
        let summary = &mut summaries[slot];
        summary.total_speech_time += segment.duration();
        summary.segments_count += 1;
    }

    summaries
}
