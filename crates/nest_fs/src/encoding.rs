//! Legacy filename decoding for archive entries
//!
//! Zip archives written by older tools store names in the creator's locale
//! code page instead of UTF-8.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// Hint for encoding detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingHint {
    /// Prefer Japanese encodings (Shift_JIS)
    Japanese,
    /// Prefer Chinese Simplified (GBK/GB18030)
    ChineseSimplified,
    /// Prefer Chinese Traditional (Big5)
    ChineseTraditional,
    /// Prefer Korean (EUC-KR)
    Korean,
    /// No preference
    None,
}

impl EncodingHint {
    fn tld_and_fallback(self) -> Option<(&'static [u8], &'static Encoding)> {
        match self {
            EncodingHint::Japanese => Some((b"jp", encoding_rs::SHIFT_JIS)),
            EncodingHint::ChineseSimplified => Some((b"cn", encoding_rs::GBK)),
            EncodingHint::ChineseTraditional => Some((b"tw", encoding_rs::BIG5)),
            EncodingHint::Korean => Some((b"kr", encoding_rs::EUC_KR)),
            EncodingHint::None => None,
        }
    }
}

/// Detect the most likely encoding of a byte sequence
pub fn detect_encoding(bytes: &[u8], hint: EncodingHint) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return encoding_rs::UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);

    match hint.tld_and_fallback() {
        Some((tld, fallback)) => {
            let detected = detector.guess(Some(tld), true);
            // Short names rarely carry enough signal; trust the locale over Latin-1
            if detected == encoding_rs::WINDOWS_1252 {
                fallback
            } else {
                detected
            }
        }
        None => detector.guess(None, true),
    }
}

/// Decode bytes to UTF-8 string
///
/// Returns the decoded string and a flag indicating if there were errors
pub fn decode_bytes(bytes: &[u8], hint: EncodingHint) -> (String, bool) {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return (s.to_string(), false);
    }

    let encoding = detect_encoding(bytes, hint);
    let (result, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(encoding = encoding.name(), "lossy archive name decode");
    }
    (result.into_owned(), had_errors)
}

/// Get the default encoding hint from the `LANG` environment variable
pub fn system_encoding_hint() -> EncodingHint {
    std::env::var("LANG")
        .map(|lang| hint_for_locale(&lang))
        .unwrap_or(EncodingHint::None)
}

fn hint_for_locale(lang: &str) -> EncodingHint {
    let lang = lang.to_lowercase();
    if lang.starts_with("ja") {
        EncodingHint::Japanese
    } else if lang.starts_with("zh_cn") || lang.starts_with("zh-cn") {
        EncodingHint::ChineseSimplified
    } else if lang.starts_with("zh_tw") || lang.starts_with("zh-tw") {
        EncodingHint::ChineseTraditional
    } else if lang.starts_with("ko") {
        EncodingHint::Korean
    } else {
        EncodingHint::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_detection() {
        let bytes = "Hello, 世界!".as_bytes();
        let (decoded, had_errors) = decode_bytes(bytes, EncodingHint::None);
        assert_eq!(decoded, "Hello, 世界!");
        assert!(!had_errors);
    }

    #[test]
    fn test_shift_jis_detection() {
        // "テスト" in Shift_JIS
        let bytes = [0x83, 0x65, 0x83, 0x58, 0x83, 0x67];
        let (decoded, _) = decode_bytes(&bytes, EncodingHint::Japanese);
        assert_eq!(decoded, "テスト");
    }

    #[test]
    fn test_locale_hint() {
        assert_eq!(hint_for_locale("ja_JP.UTF-8"), EncodingHint::Japanese);
        assert_eq!(hint_for_locale("zh_TW.Big5"), EncodingHint::ChineseTraditional);
        assert_eq!(hint_for_locale("ko_KR"), EncodingHint::Korean);
        assert_eq!(hint_for_locale("en_US.UTF-8"), EncodingHint::None);
    }
}
