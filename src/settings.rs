use serde::{Deserialize, Serialize};

pub const INITIAL_GREETING_AR: &str = "مرحباً، أنا قلم. كيف يمكنني مساعدتك اليوم؟";
pub const INITIAL_GREETING_EN: &str = "Hello, I am Qalam. How can I assist you today?";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ar,
    En,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ar => "ar",
            Self::En => "en",
        }
    }

    pub fn greeting(self) -> &'static str {
        match self {
            Self::Ar => INITIAL_GREETING_AR,
            Self::En => INITIAL_GREETING_EN,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub theme: Theme,
}

impl AppSettings {
    /// Applies the given overrides. Returns whether anything changed.
    pub fn apply(&mut self, language: Option<Language>, theme: Option<Theme>) -> bool {
        let before = *self;
        if let Some(language) = language {
            self.language = language;
        }
        if let Some(theme) = theme {
            self.theme = theme;
        }
        *self != before
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Rtl,
    Ltr,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rtl => "rtl",
            Self::Ltr => "ltr",
        }
    }
}

fn is_arabic_script(c: char) -> bool {
    matches!(
        c,
        '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{08A0}'..='\u{08FF}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}'
    )
}

/// Text direction from the first visible character. Blank text defaults to RTL.
pub fn detect_direction(text: &str) -> Direction {
    match text.trim().chars().next() {
        Some(c) if !is_arabic_script(c) => Direction::Ltr,
        _ => Direction::Rtl,
    }
}
