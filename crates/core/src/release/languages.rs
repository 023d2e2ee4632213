//! Language detection over release titles.
//!
//! A fixed lexicon maps language names to the synonym tokens release
//! groups actually use. A title matches a language when any synonym
//! appears as a whole token after punctuation normalization.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use super::parser::tokenize;

/// Language name plus the tokens that imply it.
struct LanguageEntry {
    name: &'static str,
    synonyms: &'static [&'static str],
}

static LEXICON: Lazy<Vec<LanguageEntry>> = Lazy::new(|| {
    vec![
        entry("English", &["english", "eng"]),
        entry("French", &["french", "fre", "fra", "vf", "vff", "truefrench"]),
        entry("German", &["german", "ger", "deu", "deutsch"]),
        entry("Spanish", &["spanish", "spa", "esp", "castellano", "latino"]),
        entry("Italian", &["italian", "ita"]),
        entry("Portuguese", &["portuguese", "por", "dublado"]),
        entry("Russian", &["russian", "rus"]),
        entry("Japanese", &["japanese", "jpn", "jap"]),
        entry("Korean", &["korean", "kor"]),
        entry("Chinese", &["chinese", "chs", "cht", "mandarin", "cantonese"]),
        entry("Hindi", &["hindi", "hin"]),
        entry("Tamil", &["tamil", "tam"]),
        entry("Telugu", &["telugu", "tel"]),
        entry("Malayalam", &["malayalam", "mal"]),
        entry("Kannada", &["kannada", "kan"]),
        entry("Bengali", &["bengali", "ben"]),
        entry("Punjabi", &["punjabi", "pan"]),
        entry("Marathi", &["marathi"]),
        entry("Gujarati", &["gujarati"]),
        entry("Urdu", &["urdu"]),
        entry("Arabic", &["arabic", "ara"]),
        entry("Turkish", &["turkish", "tur"]),
        entry("Dutch", &["dutch", "nld", "flemish"]),
        entry("Polish", &["polish", "pol", "lektor"]),
        entry("Swedish", &["swedish", "swe"]),
        entry("Norwegian", &["norwegian", "nor"]),
        entry("Danish", &["danish", "dan"]),
        entry("Finnish", &["finnish", "fin"]),
        entry("Czech", &["czech", "cze"]),
        entry("Slovak", &["slovak", "slo"]),
        entry("Hungarian", &["hungarian", "hun"]),
        entry("Romanian", &["romanian", "rum"]),
        entry("Bulgarian", &["bulgarian", "bul"]),
        entry("Greek", &["greek", "gre"]),
        entry("Hebrew", &["hebrew", "heb"]),
        entry("Thai", &["thai", "tha"]),
        entry("Vietnamese", &["vietnamese", "vie"]),
        entry("Indonesian", &["indonesian", "indo"]),
        entry("Malay", &["malay", "msa"]),
        entry("Filipino", &["filipino", "tagalog"]),
        entry("Ukrainian", &["ukrainian", "ukr"]),
        entry("Persian", &["persian", "farsi"]),
        entry("Serbian", &["serbian", "srp"]),
        entry("Croatian", &["croatian", "hrv"]),
        entry("Slovenian", &["slovenian", "slv"]),
    ]
});

fn entry(name: &'static str, synonyms: &'static [&'static str]) -> LanguageEntry {
    LanguageEntry { name, synonyms }
}

/// Detect all languages referenced by a release title.
///
/// Returns language names in lexicon order; a title can match several.
pub fn detect_languages(title: &str) -> Vec<String> {
    let tokens: HashSet<String> = tokenize(title).into_iter().collect();

    LEXICON
        .iter()
        .filter(|lang| lang.synonyms.iter().any(|syn| tokens.contains(*syn)))
        .map(|lang| lang.name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_language() {
        assert_eq!(
            detect_languages("Movie.2023.1080p.Tamil.WEB"),
            vec!["Tamil"]
        );
        assert_eq!(
            detect_languages("Film.German.1080p.BluRay"),
            vec!["German"]
        );
    }

    #[test]
    fn test_multi_match() {
        let langs = detect_languages("Movie.2023.Hindi.Tamil.Telugu.WEB");
        assert_eq!(langs, vec!["Hindi", "Tamil", "Telugu"]);
    }

    #[test]
    fn test_synonyms() {
        assert_eq!(detect_languages("Movie.TRUEFRENCH.1080p"), vec!["French"]);
        assert_eq!(detect_languages("Movie.Dublado.720p"), vec!["Portuguese"]);
        assert_eq!(detect_languages("Film.Lektor.PL"), vec!["Polish"]);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        assert_eq!(detect_languages("movie-2023_TAMIL(web)"), vec!["Tamil"]);
    }

    #[test]
    fn test_whole_word_only() {
        // "engine" must not match "eng", "korea" must not match "kor".
        assert!(detect_languages("Engine.Overhaul.Documentary").is_empty());
        assert!(detect_languages("Korea.Travel.Guide").is_empty());
    }

    #[test]
    fn test_no_language() {
        assert!(detect_languages("Movie.2023.1080p.WEB.x264").is_empty());
        assert!(detect_languages("").is_empty());
    }

    #[test]
    fn test_lexicon_size() {
        assert!(LEXICON.len() >= 45, "lexicon shrank below 45 languages");
    }
}
