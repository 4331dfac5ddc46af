use regex_lite::Regex;

use crate::consent::domain::phrase::{ConsentDetection, ConsentPhraseDetector};

/// Phrase detector built from a fixed set of consent patterns.
///
/// Transcripts come from a small speech model, so the patterns tolerate
/// filler and punctuation between the consent clause and the name. The
/// statement must be explicit: a bare name or a bare "I agree" is not
/// enough on its own. Each pattern carries a confidence weight; the
/// explicit "I consent" forms score 1.0, looser phrasings less.
pub struct PatternPhraseDetector {
    consent_patterns: Vec<(Regex, f32)>,
    name_patterns: Vec<Regex>,
}

impl PatternPhraseDetector {
    pub fn new() -> Self {
        let consent: [(&str, f32); 4] = [
            (
                r"(?i)\bi\s+(?:consent|agree)\s+to\s+(?:be(?:ing)?\s+(?:shown|seen|filmed|recorded)|appear(?:ing)?)\b",
                1.0,
            ),
            (r"(?i)\bi\s+give\s+(?:my\s+)?consent\b", 1.0),
            (r"(?i)\byou\s+(?:can|may)\s+show\s+(?:me|my\s+face)\b", 0.8),
            (
                r"(?i)\bi(?:'m|\s+am)\s+(?:ok|okay|fine)\s+(?:with\s+)?being\s+(?:shown|on\s+(?:camera|stream))\b",
                0.8,
            ),
        ];
        let names = [
            r"(?i)\bmy\s+name\s+is\s+([a-z]+(?:\s+[a-z]+)?)",
            r"(?i)\bthis\s+is\s+([a-z]+(?:\s+[a-z]+)?)",
            r"(?i)\bi(?:'m|\s+am)\s+([a-z]+(?:\s+[a-z]+)?)\s*[,.]?\s+and\s+i\b",
            r"(?i)\bcall\s+me\s+([a-z]+(?:\s+[a-z]+)?)",
        ];
        Self {
            consent_patterns: consent
                .iter()
                .map(|(p, w)| (Regex::new(p).expect("invalid consent pattern"), *w))
                .collect(),
            name_patterns: names
                .iter()
                .map(|p| Regex::new(p).expect("invalid name pattern"))
                .collect(),
        }
    }

    fn extract_name(&self, transcript: &str) -> Option<String> {
        for pattern in &self.name_patterns {
            if let Some(caps) = pattern.captures(transcript) {
                let raw = caps.get(1)?.as_str().trim();
                // The capture may run into the consent clause ("Alice and
                // I consent..."); connectives end the name.
                let name = raw
                    .split_whitespace()
                    .take_while(|w| !matches!(w.to_ascii_lowercase().as_str(), "and" | "i"))
                    .take(2)
                    .collect::<Vec<_>>()
                    .join(" ");
                if !name.is_empty() {
                    return Some(name);
                }
            }
        }
        None
    }
}

impl Default for PatternPhraseDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentPhraseDetector for PatternPhraseDetector {
    fn detect(&self, transcript: &str) -> Option<ConsentDetection> {
        let (matched, confidence) = self
            .consent_patterns
            .iter()
            .find_map(|(p, w)| p.find(transcript).map(|m| (m, *w)))?;
        Some(ConsentDetection {
            name: self.extract_name(transcript),
            matched: matched.as_str().to_string(),
            confidence,
        })
    }
}
