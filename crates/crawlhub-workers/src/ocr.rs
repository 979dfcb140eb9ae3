//! OCR is a narrow external collaborator (§4.6): the core does not implement
//! a real OCR backend, only the trait a parse worker calls through and a
//! best-effort reference implementation for local runs and tests.

use crawlhub_types::EngineResult;

pub trait OcrEngine: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> EngineResult<String>;
}

/// Scans raw bytes for `http(s)://` substrings instead of running real OCR;
/// good enough to exercise the parse worker's link-discovery path against
/// image/PDF tasks without an external OCR dependency.
pub struct SubstringScanOcr;

impl OcrEngine for SubstringScanOcr {
    fn extract_text(&self, bytes: &[u8]) -> EngineResult<String> {
        let text = String::from_utf8_lossy(bytes);
        let mut found = Vec::new();
        for scheme in ["http://", "https://"] {
            let mut start = 0;
            while let Some(pos) = text[start..].find(scheme) {
                let begin = start + pos;
                let end = text[begin..]
                    .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '<')
                    .map(|rel| begin + rel)
                    .unwrap_or(text.len());
                found.push(text[begin..end].to_string());
                start = end.max(begin + 1);
            }
        }
        Ok(found.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_urls_embedded_in_noise() {
        let ocr = SubstringScanOcr;
        let text = ocr
            .extract_text(b"scanned label see https://example.com/page for details")
            .unwrap();
        assert_eq!(text, "https://example.com/page");
    }

    #[test]
    fn returns_empty_when_no_urls_present() {
        let ocr = SubstringScanOcr;
        let text = ocr.extract_text(b"no links here").unwrap();
        assert!(text.is_empty());
    }
}
