//! Scripted model backends for exercising the pipeline without real weights.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::asr::{Aligner, Diarizer, ModelProvider, RecognitionRequest, Recognizer};
use crate::model::{ComputeType, ModelSize, Recognition, Segment, SpeakerTurn, WordSegment};

/// What the scripted recognizer does when asked to transcribe.
#[derive(Debug, Clone)]
pub enum RecognizerScript {
    Segments {
        segments: Vec<Segment>,
        language: Option<String>,
    },
    Fail(String),
    Panic,
}

#[derive(Debug, Clone)]
pub enum AlignerScript {
    /// Splits every segment's text on whitespace and spreads the words evenly
    /// over the segment.
    SplitWords,
    Fail(String),
    FailToLoad(String),
}

#[derive(Debug, Clone)]
pub enum DiarizerScript {
    Turns(Vec<SpeakerTurn>),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct Counters {
    pub recognizer_loads: AtomicUsize,
    pub aligner_loads: AtomicUsize,
    pub diarizer_loads: AtomicUsize,
    pub transcribe_calls: AtomicUsize,
    pub align_calls: AtomicUsize,
    pub diarize_calls: AtomicUsize,
    pub releases: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// A [`ModelProvider`] whose models follow a fixed script and count every
/// call made on them.
pub struct ScriptedProvider {
    recognizer: RecognizerScript,
    aligner: AlignerScript,
    diarizer: DiarizerScript,
    load_delay: Duration,
    /// Number of recognizer loads that fail before one succeeds.
    failing_recognizer_loads: AtomicUsize,
    counters: Arc<Counters>,
}

impl ScriptedProvider {
    pub fn new(segments: Vec<Segment>, language: Option<&str>) -> Self {
        Self {
            recognizer: RecognizerScript::Segments {
                segments,
                language: language.map(str::to_string),
            },
            aligner: AlignerScript::SplitWords,
            diarizer: DiarizerScript::Turns(Vec::new()),
            load_delay: Duration::ZERO,
            failing_recognizer_loads: AtomicUsize::new(0),
            counters: Arc::new(Counters::default()),
        }
    }

    /// One English segment: "hello world" over 0.0..1.5.
    pub fn hello_world() -> Self {
        Self::new(
            vec![Segment::new(0.0, 1.5, "hello world").with_confidence(0.9)],
            Some("en"),
        )
    }

    pub fn with_recognizer(mut self, script: RecognizerScript) -> Self {
        self.recognizer = script;
        self
    }

    pub fn with_aligner(mut self, script: AlignerScript) -> Self {
        self.aligner = script;
        self
    }

    pub fn with_diarizer(mut self, script: DiarizerScript) -> Self {
        self.diarizer = script;
        self
    }

    /// Every load sleeps this long on the blocking pool.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_failing_recognizer_loads(self, count: usize) -> Self {
        self.failing_recognizer_loads.store(count, Ordering::SeqCst);
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    fn pause(&self) {
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
    }
}

impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load_recognizer(
        &self,
        size: ModelSize,
        compute_type: ComputeType,
    ) -> anyhow::Result<Arc<dyn Recognizer>> {
        self.counters.recognizer_loads.fetch_add(1, Ordering::SeqCst);
        self.pause();

        let remaining = self.failing_recognizer_loads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_recognizer_loads
                .store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("weights for {} unavailable", size.as_str());
        }

        Ok(Arc::new(ScriptedRecognizer {
            name: format!("scripted-{}-{}", size.as_str(), compute_type.as_str()),
            script: self.recognizer.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn load_aligner(&self, language: &str) -> anyhow::Result<Arc<dyn Aligner>> {
        self.counters.aligner_loads.fetch_add(1, Ordering::SeqCst);
        self.pause();
        if let AlignerScript::FailToLoad(reason) = &self.aligner {
            anyhow::bail!("{}", reason);
        }
        Ok(Arc::new(ScriptedAligner {
            language: language.to_string(),
            script: self.aligner.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn load_diarizer(&self, _auth_token: &str) -> anyhow::Result<Arc<dyn Diarizer>> {
        self.counters.diarizer_loads.fetch_add(1, Ordering::SeqCst);
        self.pause();
        Ok(Arc::new(ScriptedDiarizer {
            script: self.diarizer.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn release(&self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedRecognizer {
    name: String,
    script: RecognizerScript,
    counters: Arc<Counters>,
}

impl Recognizer for ScriptedRecognizer {
    fn transcribe(&self, _request: &RecognitionRequest) -> anyhow::Result<Recognition> {
        self.counters.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            RecognizerScript::Segments { segments, language } => Ok(Recognition {
                segments: segments.clone(),
                language: language.clone(),
            }),
            RecognizerScript::Fail(reason) => anyhow::bail!("{}", reason),
            RecognizerScript::Panic => panic!("recognizer crashed"),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct ScriptedAligner {
    language: String,
    script: AlignerScript,
    counters: Arc<Counters>,
}

impl Aligner for ScriptedAligner {
    fn align(&self, segments: &[Segment], _audio_path: &Path) -> anyhow::Result<Vec<Segment>> {
        self.counters.align_calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            AlignerScript::SplitWords => Ok(segments.iter().map(split_words).collect()),
            AlignerScript::Fail(reason) | AlignerScript::FailToLoad(reason) => {
                anyhow::bail!("{}", reason)
            }
        }
    }

    fn language(&self) -> &str {
        &self.language
    }
}

fn split_words(segment: &Segment) -> Segment {
    let tokens: Vec<&str> = segment.text.split_whitespace().collect();
    let step = if tokens.is_empty() {
        0.0
    } else {
        segment.duration() / tokens.len() as f64
    };

    let mut aligned = segment.clone();
    aligned.words = tokens
        .iter()
        .enumerate()
        .map(|(i, token)| WordSegment {
            start: segment.start + step * i as f64,
            end: segment.start + step * (i + 1) as f64,
            text: token.to_string(),
            confidence: segment.confidence,
            speaker: None,
        })
        .collect();
    aligned
}

struct ScriptedDiarizer {
    script: DiarizerScript,
    counters: Arc<Counters>,
}

impl Diarizer for ScriptedDiarizer {
    fn diarize(&self, _audio_path: &Path) -> anyhow::Result<Vec<SpeakerTurn>> {
        self.counters.diarize_calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            DiarizerScript::Turns(turns) => Ok(turns.clone()),
            DiarizerScript::Fail(reason) => anyhow::bail!("{}", reason),
        }
    }
}

/// A diarization turn, for building scripts.
pub fn turn(start: f64, end: f64, speaker: &str) -> SpeakerTurn {
    SpeakerTurn {
        start,
        end,
        speaker: speaker.to_string(),
    }
}
