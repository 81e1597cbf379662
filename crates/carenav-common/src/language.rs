use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// Languages guidance can be requested in. Serialized as the two-letter code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "zh")]
    Chinese,
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "pt")]
    Portuguese,
    #[serde(rename = "ar")]
    Arabic,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "it")]
    Italian,
    #[serde(rename = "ko")]
    Korean,
    #[serde(rename = "tr")]
    Turkish,
    #[serde(rename = "vi")]
    Vietnamese,
}

impl Language {
    pub const ALL: [Language; 14] = [
        Self::English,
        Self::Hindi,
        Self::Spanish,
        Self::French,
        Self::German,
        Self::Chinese,
        Self::Japanese,
        Self::Portuguese,
        Self::Arabic,
        Self::Russian,
        Self::Italian,
        Self::Korean,
        Self::Turkish,
        Self::Vietnamese,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Hindi => "hi",
            Self::Spanish => "es",
            Self::French => "fr",
            Self::German => "de",
            Self::Chinese => "zh",
            Self::Japanese => "ja",
            Self::Portuguese => "pt",
            Self::Arabic => "ar",
            Self::Russian => "ru",
            Self::Italian => "it",
            Self::Korean => "ko",
            Self::Turkish => "tr",
            Self::Vietnamese => "vi",
        }
    }

    /// English name, used when instructing the guidance service.
    pub fn name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
            Self::Spanish => "Spanish",
            Self::French => "French",
            Self::German => "German",
            Self::Chinese => "Chinese",
            Self::Japanese => "Japanese",
            Self::Portuguese => "Portuguese",
            Self::Arabic => "Arabic",
            Self::Russian => "Russian",
            Self::Italian => "Italian",
            Self::Korean => "Korean",
            Self::Turkish => "Turkish",
            Self::Vietnamese => "Vietnamese",
        }
    }

    /// Name of the language in the language itself.
    pub fn native_label(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "हिन्दी",
            Self::Spanish => "Español",
            Self::French => "Français",
            Self::German => "Deutsch",
            Self::Chinese => "中文",
            Self::Japanese => "日本語",
            Self::Portuguese => "Português",
            Self::Arabic => "العربية",
            Self::Russian => "Русский",
            Self::Italian => "Italiano",
            Self::Korean => "한국어",
            Self::Turkish => "Türkçe",
            Self::Vietnamese => "Tiếng Việt",
        }
    }

    /// BCP-47 locale handed to speech input/output engines.
    pub fn speech_locale(self) -> &'static str {
        match self {
            Self::English => "en-US",
            Self::Hindi => "hi-IN",
            Self::Spanish => "es-ES",
            Self::French => "fr-FR",
            Self::German => "de-DE",
            Self::Chinese => "zh-CN",
            Self::Japanese => "ja-JP",
            Self::Portuguese => "pt-PT",
            Self::Arabic => "ar-SA",
            Self::Russian => "ru-RU",
            Self::Italian => "it-IT",
            Self::Korean => "ko-KR",
            Self::Turkish => "tr-TR",
            Self::Vietnamese => "vi-VN",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }

    /// Comma-separated list of every supported code, for error messages.
    pub fn supported_codes() -> String {
        Self::ALL
            .iter()
            .map(|lang| lang.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Language {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Self::from_code(code).ok_or_else(|| CommonError::UnknownLanguage(code.to_string()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_the_fixed_vocabulary() {
        let codes: Vec<&str> = Language::ALL.iter().map(|l| l.code()).collect();
        assert_eq!(
            codes,
            ["en", "hi", "es", "fr", "de", "zh", "ja", "pt", "ar", "ru", "it", "ko", "tr", "vi"]
        );
    }

    #[test]
    fn test_parse_code() {
        assert_eq!("es".parse::<Language>().unwrap(), Language::Spanish);
        assert_eq!(" vi ".parse::<Language>().unwrap(), Language::Vietnamese);
        let err = "xx".parse::<Language>().unwrap_err();
        assert!(matches!(err, CommonError::UnknownLanguage(ref c) if c == "xx"));
        assert!("EN".parse::<Language>().is_err());
    }

    #[test]
    fn test_serde_uses_code() {
        assert_eq!(serde_json::to_string(&Language::Japanese).unwrap(), "\"ja\"");
        let lang: Language = serde_json::from_str("\"ko\"").unwrap();
        assert_eq!(lang, Language::Korean);
        assert_eq!(Language::default(), Language::English);
    }

    #[test]
    fn test_speech_locale() {
        assert_eq!(Language::Hindi.speech_locale(), "hi-IN");
        assert_eq!(Language::Portuguese.speech_locale(), "pt-PT");
    }
}
