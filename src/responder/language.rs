//! Heuristic en/es language classification.
//!
//! Scores Spanish stopwords and orthography; anything ambiguous defaults to
//! English, matching the classifier-failure fallback.

use crate::models::Language;

/// Common Spanish function words and greetings. Word-boundary matched.
const SPANISH_STOPWORDS: &[&str] = &[
    "el", "la", "los", "las", "de", "que", "es", "en", "un", "una", "por", "para", "con", "como",
    "pero", "mi", "su", "este", "esta", "hola", "gracias", "usted", "ustedes", "necesito",
    "quiero", "tengo", "puede", "pueden", "cuando", "donde", "porque", "ayuda", "buenos", "buenas",
    "dias", "tardes", "noches", "hacer", "sobre", "tiene", "estoy",
];

/// Classify a message as English or Spanish.
pub fn detect_language(text: &str) -> Language {
    let lower = text.to_lowercase();

    // Inverted punctuation and ñ are strong Spanish signals on their own.
    let orthographic_hits = lower
        .chars()
        .filter(|c| matches!(c, '¿' | '¡' | 'ñ' | 'á' | 'é' | 'í' | 'ó' | 'ú'))
        .count();

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && !matches!(c, 'á' | 'é' | 'í' | 'ó' | 'ú' | 'ñ' | 'ü'))
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() && orthographic_hits == 0 {
        return Language::En;
    }

    let stopword_hits = words
        .iter()
        .filter(|w| SPANISH_STOPWORDS.contains(&w.to_string().as_str()))
        .count();

    let score = stopword_hits as f32 + orthographic_hits as f32 * 2.0;
    let threshold = (words.len() as f32 * 0.15).max(2.0);

    if score >= threshold {
        Language::Es
    } else {
        Language::En
    }
}
