//! Question language detection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Letters that exist in Kyrgyz Cyrillic but not in Russian.
const KYRGYZ_LETTERS: [char; 6] = ['ң', 'ү', 'ө', 'Ң', 'Ү', 'Ө'];

/// Minimum letter count for a script to decide the language.
const SCRIPT_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Kyrgyz,
    Russian,
    English,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kyrgyz => "Kyrgyz",
            Self::Russian => "Russian",
            Self::English => "English",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_russian_letter(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

/// Guess the language a question is written in.
///
/// Any Kyrgyz-specific letter wins outright. Otherwise the dominant script decides,
/// provided it has more than five letters; short or mixed text defaults to English.
pub fn detect_language(text: &str) -> Language {
    if text.chars().any(|c| KYRGYZ_LETTERS.contains(&c)) {
        return Language::Kyrgyz;
    }

    let cyrillic = text.chars().filter(|&c| is_russian_letter(c)).count();
    let latin = text.chars().filter(|c| c.is_ascii_alphabetic()).count();

    if cyrillic > latin && cyrillic > SCRIPT_THRESHOLD {
        Language::Russian
    } else {
        Language::English
    }
}
