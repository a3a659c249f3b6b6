pub mod service;
pub mod transcription;
