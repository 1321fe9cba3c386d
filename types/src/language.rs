use std::fmt;

/// The language the assistant is currently speaking.
///
/// Drives the locale handed to speech capture and the label of the
/// language-toggle suggestion. It is never sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpokenLanguage {
    #[default]
    English,
    Hindi,
}

const DEVANAGARI: std::ops::RangeInclusive<char> = '\u{0900}'..='\u{097F}';

impl SpokenLanguage {
    /// Speech-recognition locale for this language.
    pub fn locale(&self) -> &'static str {
        match self {
            SpokenLanguage::English => "en-US",
            SpokenLanguage::Hindi => "hi-IN",
        }
    }

    /// The language the toggle suggestion switches to.
    pub fn other(&self) -> Self {
        match self {
            SpokenLanguage::English => SpokenLanguage::Hindi,
            SpokenLanguage::Hindi => SpokenLanguage::English,
        }
    }

    /// Detects the language of an assistant reply from its script.
    pub fn detect(text: &str) -> Self {
        if text.chars().any(|c| DEVANAGARI.contains(&c)) {
            SpokenLanguage::Hindi
        } else {
            SpokenLanguage::English
        }
    }

    /// Detects an explicit request to switch language in learner text.
    pub fn requested_in(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("hindi") || lower.contains("हिंदी") {
            Some(SpokenLanguage::Hindi)
        } else if lower.contains("english") || lower.contains("अंग्रेजी") {
            Some(SpokenLanguage::English)
        } else {
            None
        }
    }
}

impl fmt::Display for SpokenLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpokenLanguage::English => f.write_str("english"),
            SpokenLanguage::Hindi => f.write_str("hindi"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_devanagari() {
        assert_eq!(SpokenLanguage::detect("नमस्ते"), SpokenLanguage::Hindi);
        assert_eq!(SpokenLanguage::detect("Fees are ₹2000, धन्यवाद"), SpokenLanguage::Hindi);
        assert_eq!(SpokenLanguage::detect("Hello there"), SpokenLanguage::English);
    }

    #[test]
    fn test_requested_language() {
        assert_eq!(
            SpokenLanguage::requested_in("Explain in Hindi please"),
            Some(SpokenLanguage::Hindi)
        );
        assert_eq!(
            SpokenLanguage::requested_in("अंग्रेजी में बताइए"),
            Some(SpokenLanguage::English)
        );
        assert_eq!(SpokenLanguage::requested_in("What are the fees?"), None);
    }

    #[test]
    fn test_other_flips_language() {
        assert_eq!(SpokenLanguage::English.other(), SpokenLanguage::Hindi);
        assert_eq!(SpokenLanguage::Hindi.other(), SpokenLanguage::English);
    }

    #[test]
    fn test_locale() {
        assert_eq!(SpokenLanguage::Hindi.locale(), "hi-IN");
        assert_eq!(SpokenLanguage::English.locale(), "en-US");
    }
}
