use base64::Engine as _;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};

use crate::normalize::SkipReason;

/// Gmail emits base64url, usually unpadded; accept both forms.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a part's `body.data` into UTF-8 text.
pub fn decode_body_data(data: &str) -> Result<String, SkipReason> {
    let bytes = URL_SAFE_LENIENT
        .decode(data.trim())
        .map_err(|e| SkipReason::Base64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| SkipReason::Utf8(e.to_string()))
}

/// Single-line preview for log output.
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(line);
        if out.chars().count() >= max_chars {
            break;
        }
    }
    out.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

    #[test]
    fn decodes_padded_and_unpadded() {
        let padded = URL_SAFE.encode("Plain text body!");
        let unpadded = URL_SAFE_NO_PAD.encode("Plain text body!");
        assert_ne!(padded, unpadded);
        assert_eq!(decode_body_data(&padded).unwrap(), "Plain text body!");
        assert_eq!(decode_body_data(&unpadded).unwrap(), "Plain text body!");
    }

    #[test]
    fn url_safe_alphabet() {
        // "??>" encodes to "Pz8-" in the url-safe alphabet
        assert_eq!(decode_body_data("Pz8-").unwrap(), "??>");
    }

    #[test]
    fn malformed_base64_is_a_skip() {
        assert!(matches!(
            decode_body_data("not base64 at all!"),
            Err(SkipReason::Base64(_))
        ));
    }

    #[test]
    fn invalid_utf8_is_a_skip() {
        let data = URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0xfd]);
        assert!(matches!(decode_body_data(&data), Err(SkipReason::Utf8(_))));
    }

    #[test]
    fn preview_joins_lines_and_truncates() {
        assert_eq!(preview("  Hi\n\n there \n", 80), "Hi there");
        assert_eq!(preview("abcdefghij", 4), "abcd");
    }
}
