//! Conversion configuration
//!
//! Every entry point takes its configuration explicitly; nothing is read from
//! global state. The defaults mirror what a device upload without any user
//! customization would do.

use std::{path::PathBuf, time::Duration};

/// Hyphenation settings for the generated `kte-css/hyphenation.css`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyphenationConfig {
    /// Whether to inject the hyphenation stylesheet at all
    pub enabled: bool,

    /// Minimum word length before a word gets hyphenated, 0 disables the stylesheet
    pub min_chars: u32,

    /// Minimum number of characters kept before a hyphen
    pub min_chars_before: u32,

    /// Minimum number of characters kept after a hyphen
    pub min_chars_after: u32,

    /// Maximum number of consecutive hyphenated lines, 0 means no limit
    pub limit_lines: u32,
}

impl Default for HyphenationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars: 6,
            min_chars_before: 3,
            min_chars_after: 3,
            limit_lines: 2,
        }
    }
}

impl HyphenationConfig {
    /// Returns the dictionary file name a device uses for `language`
    ///
    /// The dictionary itself is provided by the reading system, the pipeline
    /// only refers to it by name.
    pub fn dictionary_name(language: Option<&str>) -> String {
        match language.map(str::trim).filter(|lang| !lang.is_empty()) {
            Some(lang) => format!("hyph_{}.dic", lang.replace('-', "_")),
            None => "hyph.dic".to_string(),
        }
    }

    /// Whether the hyphenation stylesheet should be produced
    pub fn is_active(&self) -> bool {
        self.enabled && self.min_chars > 0
    }
}

/// Versioned rule deciding which elements count as Kobo markers
///
/// Older files were produced with an exact `class="koboSpan"` convention,
/// newer ones may carry extra class tokens or only the `kobo.N.M` identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MarkerRule {
    /// `<span>` elements whose class attribute is exactly `koboSpan`
    V1,

    /// `<span>` elements whose class contains the `koboSpan` token or whose id
    /// has the `kobo.<digits>.<digits>` shape, plus the `book-columns` and
    /// `book-inner` wrapper divs
    #[default]
    V2,
}

/// Configuration of the EPUB to KePub direction
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub hyphenation: HyphenationConfig,

    /// Forces hyphenation off with `kte-css/no-hyphens.css`
    ///
    /// Takes precedence over `hyphenation`.
    pub disable_hyphenation: bool,

    /// Run the markup cleanup pass
    pub clean_markup: bool,

    /// Add sentence spans and Kobo divs
    pub extended_features: bool,

    /// Inject `kte-css/stylehacks.css`
    pub style_hacks: bool,

    /// Replace straight quotes, double hyphens and three dots with typographic punctuation
    pub smarten_punctuation: bool,

    /// Script injected as `kobo.js` into every content document
    pub kobo_script: Option<Vec<u8>>,

    /// Fail with `DrmEncumbered` instead of passing such containers through
    pub reject_drm_encumbered: bool,

    /// Skip content documents that fail to convert instead of aborting
    pub best_effort: bool,

    /// Add a `plugininfo.kte` details file to the container
    pub write_details_file: bool,

    /// Directory receiving a copy of each converted file, for debugging
    pub copy_dir: Option<PathBuf>,

    /// Overall time budget for one conversion
    pub timeout: Option<Duration>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            hyphenation: HyphenationConfig::default(),
            disable_hyphenation: false,
            clean_markup: true,
            extended_features: true,
            style_hacks: false,
            smarten_punctuation: false,
            kobo_script: None,
            reject_drm_encumbered: true,
            best_effort: false,
            write_details_file: false,
            copy_dir: None,
            timeout: None,
        }
    }
}

impl OutputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hyphenation(&mut self, hyphenation: HyphenationConfig) -> &mut Self {
        self.hyphenation = hyphenation;
        self
    }

    /// Turns the hyphenation stylesheet on or off without forcing it off
    pub fn set_hyphenate(&mut self, enabled: bool) -> &mut Self {
        self.hyphenation.enabled = enabled;
        self
    }

    pub fn set_disable_hyphenation(&mut self, disable: bool) -> &mut Self {
        self.disable_hyphenation = disable;
        self
    }

    pub fn set_clean_markup(&mut self, clean: bool) -> &mut Self {
        self.clean_markup = clean;
        self
    }

    pub fn set_extended_features(&mut self, enabled: bool) -> &mut Self {
        self.extended_features = enabled;
        self
    }

    pub fn set_style_hacks(&mut self, enabled: bool) -> &mut Self {
        self.style_hacks = enabled;
        self
    }

    pub fn set_smarten_punctuation(&mut self, enabled: bool) -> &mut Self {
        self.smarten_punctuation = enabled;
        self
    }

    pub fn set_kobo_script(&mut self, script: Vec<u8>) -> &mut Self {
        self.kobo_script = Some(script);
        self
    }

    pub fn set_reject_drm_encumbered(&mut self, reject: bool) -> &mut Self {
        self.reject_drm_encumbered = reject;
        self
    }

    pub fn set_best_effort(&mut self, best_effort: bool) -> &mut Self {
        self.best_effort = best_effort;
        self
    }

    pub fn set_write_details_file(&mut self, write: bool) -> &mut Self {
        self.write_details_file = write;
        self
    }

    pub fn set_copy_dir(&mut self, dir: PathBuf) -> &mut Self {
        self.copy_dir = Some(dir);
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Configuration of the KePub to EPUB direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputConfig {
    /// Unwrap Kobo spans and divs
    pub strip_kobo_markers: bool,

    pub marker_rule: MarkerRule,

    /// Run the markup cleanup pass after stripping
    pub clean_markup: bool,

    pub best_effort: bool,

    pub reject_drm_encumbered: bool,

    pub timeout: Option<Duration>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            strip_kobo_markers: true,
            marker_rule: MarkerRule::default(),
            clean_markup: false,
            best_effort: false,
            reject_drm_encumbered: true,
            timeout: None,
        }
    }
}

impl InputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_strip_kobo_markers(&mut self, strip: bool) -> &mut Self {
        self.strip_kobo_markers = strip;
        self
    }

    pub fn set_marker_rule(&mut self, rule: MarkerRule) -> &mut Self {
        self.marker_rule = rule;
        self
    }

    pub fn set_clean_markup(&mut self, clean: bool) -> &mut Self {
        self.clean_markup = clean;
        self
    }

    pub fn set_best_effort(&mut self, best_effort: bool) -> &mut Self {
        self.best_effort = best_effort;
        self
    }

    pub fn set_reject_drm_encumbered(&mut self, reject: bool) -> &mut Self {
        self.reject_drm_encumbered = reject;
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::{HyphenationConfig, InputConfig, MarkerRule, OutputConfig};

    #[test]
    fn test_dictionary_name() {
        assert_eq!(HyphenationConfig::dictionary_name(Some("en-US")), "hyph_en_US.dic");
        assert_eq!(HyphenationConfig::dictionary_name(Some("de")), "hyph_de.dic");
        assert_eq!(HyphenationConfig::dictionary_name(Some(" ")), "hyph.dic");
        assert_eq!(HyphenationConfig::dictionary_name(None), "hyph.dic");
    }

    #[test]
    fn test_hyphenation_active() {
        let mut config = HyphenationConfig::default();
        assert!(config.is_active());

        config.min_chars = 0;
        assert!(!config.is_active());
    }

    #[test]
    fn test_chained_setters() {
        let mut config = OutputConfig::new();
        config
            .set_hyphenate(false)
            .set_clean_markup(false)
            .set_best_effort(true)
            .set_smarten_punctuation(true)
            .set_timeout(Duration::from_secs(5));

        assert!(!config.hyphenation.enabled);
        assert!(!config.clean_markup);
        assert!(config.smarten_punctuation);
        assert!(config.best_effort);
        assert!(config.extended_features);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));

        let mut config = InputConfig::new();
        config.set_marker_rule(MarkerRule::V1);
        assert_eq!(config.marker_rule, MarkerRule::V1);
        assert!(config.strip_kobo_markers);
    }
}
