/// A consent statement found in a transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsentDetection {
    /// The name the speaker gave, if the transcript contained one.
    pub name: Option<String>,
    /// The clause that triggered the detection, for logging.
    pub matched: String,
    /// How unambiguous the matched clause is, in (0, 1]. An explicit "I
    /// consent" scores 1.0; looser phrasings score lower.
    pub confidence: f32,
}

/// Scans a transcript for an explicit on-stream consent statement.
pub trait ConsentPhraseDetector: Send + Sync {
    fn detect(&self, transcript: &str) -> Option<ConsentDetection>;
}
