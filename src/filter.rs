//! Per-file selection logic.
//!
//! A [`Selection`] is built once at startup from the validated config plus any
//! loaded external state (reference DB, achievement index) and is then
//! evaluated against each [`CandidateFile`] without touching the filesystem
//! or the network.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::cheevos::AchievementIndex;
use crate::dat::ReferenceDb;
use crate::error::OrganizeError;
use crate::types::{CandidateFile, FilterFlag};

fn marker(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid built-in marker pattern {pattern}: {e}"))
}

static DEMO: Lazy<Regex> = Lazy::new(|| marker(r"\(demo\)"));
static BETA: Lazy<Regex> = Lazy::new(|| marker(r"\(beta(?: \d+)?\)"));
static UNLICENSED: Lazy<Regex> = Lazy::new(|| marker(r"\(unl\)"));
static PROTOTYPE: Lazy<Regex> = Lazy::new(|| marker(r"\((?:prototype|proto(?: \d+)?)\)"));
static PIRATE: Lazy<Regex> = Lazy::new(|| marker(r"\(pirate\)"));

fn flag_pattern(flag: FilterFlag) -> &'static Regex {
    match flag {
        FilterFlag::Demo => &*DEMO,
        FilterFlag::Beta => &*BETA,
        FilterFlag::Unlicensed => &*UNLICENSED,
        FilterFlag::Prototype => &*PROTOTYPE,
        FilterFlag::Pirate => &*PIRATE,
    }
}

/// Whether `name` carries the marker for `flag`, e.g. "(Demo)".
pub fn flag_matches(flag: FilterFlag, name: &str) -> bool {
    flag_pattern(flag).is_match(name)
}

/// Case-insensitive literal search term from `--grep`.
#[derive(Debug, Clone)]
pub struct Keyword {
    term: String,
    pattern: Regex,
}

impl Keyword {
    pub fn new(term: &str) -> Result<Self, OrganizeError> {
        let pattern = RegexBuilder::new(&regex::escape(term))
            .case_insensitive(true)
            .build()
            .map_err(|e| OrganizeError::config(format!("--grep \"{term}\": {e}")))?;
        Ok(Self {
            term: term.to_string(),
            pattern,
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }
}

#[derive(Debug, Clone)]
pub enum Selection {
    /// Any of `flags` (or no flags at all) and every keyword.
    Markers {
        flags: Vec<FilterFlag>,
        keywords: Vec<Keyword>,
    },
    Reference(ReferenceDb),
    Achievements(AchievementIndex),
}

impl Selection {
    pub fn markers(flags: &[FilterFlag], terms: &[String]) -> Result<Self, OrganizeError> {
        if flags.is_empty() && terms.is_empty() {
            return Err(OrganizeError::config(
                "no flag or --grep filter to select files with",
            ));
        }
        let keywords = terms
            .iter()
            .map(|t| Keyword::new(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Selection::Markers {
            flags: flags.to_vec(),
            keywords,
        })
    }

    /// Content-based selections need each candidate's MD5 before evaluation.
    pub fn needs_checksum(&self) -> bool {
        !matches!(self, Selection::Markers { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Selection::Markers { flags, keywords } => {
                let mut parts = Vec::new();
                if !flags.is_empty() {
                    let names: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
                    parts.push(format!("any of [{}]", names.join(", ")));
                }
                if !keywords.is_empty() {
                    let terms: Vec<String> =
                        keywords.iter().map(|k| format!("\"{}\"", k.term())).collect();
                    parts.push(format!("all of [{}]", terms.join(", ")));
                }
                parts.join(" and ")
            }
            Selection::Reference(db) => {
                format!("dat {} ({} entries)", db.source().display(), db.len())
            }
            Selection::Achievements(index) => format!(
                "cheevos console {} ({} hashes)",
                index.console_id(),
                index.len()
            ),
        }
    }
}

/// Why `file` is selected, or `None` when it is not.
pub fn evaluate(file: &CandidateFile, selection: &Selection) -> Option<String> {
    match selection {
        Selection::Markers { flags, keywords } => {
            let stem = file.stem();
            let flag_hit = if flags.is_empty() {
                None
            } else {
                Some(flags.iter().copied().find(|f| flag_matches(*f, stem))?)
            };
            if !keywords.iter().all(|k| k.is_match(stem)) {
                return None;
            }
            Some(match flag_hit {
                Some(flag) if keywords.is_empty() => format!("{flag} marker"),
                Some(flag) => format!("{flag} marker and keywords"),
                None => "keywords".to_string(),
            })
        }
        Selection::Reference(db) => {
            let md5 = file.md5.as_deref()?;
            db.get(md5).map(|entry| format!("dat entry \"{}\"", entry.name))
        }
        Selection::Achievements(index) => {
            let md5 = file.md5.as_deref()?;
            index
                .title(md5)
                .map(|title| format!("achievements for \"{title}\""))
        }
    }
}

pub fn matches(file: &CandidateFile, selection: &Selection) -> bool {
    evaluate(file, selection).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn file(name: &str) -> CandidateFile {
        CandidateFile::new(PathBuf::from("roms").join(name), 0)
    }

    fn hashed(name: &str, md5: &str) -> CandidateFile {
        let mut f = file(name);
        f.md5 = Some(md5.to_string());
        f
    }

    fn markers(flags: &[FilterFlag], terms: &[&str]) -> Selection {
        let terms: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        Selection::markers(flags, &terms).unwrap()
    }

    #[test]
    fn demo_flag_matches_only_demo_marker() {
        let sel = markers(&[FilterFlag::Demo], &[]);
        assert!(matches(&file("Super Game (USA) (Demo).sfc"), &sel));
        assert!(matches(&file("tiny (demo).gb"), &sel));
        assert!(!matches(&file("Demolition Man (USA).sfc"), &sel));
        assert!(!matches(&file("Super Game (USA).sfc"), &sel));
    }

    #[test]
    fn prototype_flag_accepts_both_spellings() {
        let sel = markers(&[FilterFlag::Prototype], &[]);
        assert!(matches(&file("A (USA) (Proto).md"), &sel));
        assert!(matches(&file("B (Japan) (Prototype).md"), &sel));
        assert!(matches(&file("C (Europe) (Proto 2).md"), &sel));
        assert!(!matches(&file("Protector (USA).md"), &sel));
    }

    #[test]
    fn beta_flag_accepts_numbered_betas() {
        let sel = markers(&[FilterFlag::Beta], &[]);
        assert!(matches(&file("A (Beta).nes"), &sel));
        assert!(matches(&file("A (Beta 3).nes"), &sel));
        assert!(!matches(&file("Alphabeta (USA).nes"), &sel));
    }

    #[test]
    fn unlicensed_and_pirate_are_independent() {
        let unl = markers(&[FilterFlag::Unlicensed], &[]);
        let pirate = markers(&[FilterFlag::Pirate], &[]);
        let unl_file = file("A (Asia) (Unl).nes");
        let pirate_file = file("B (Asia) (Pirate).nes");

        assert!(matches(&unl_file, &unl));
        assert!(!matches(&pirate_file, &unl));
        assert!(matches(&pirate_file, &pirate));
        assert!(!matches(&unl_file, &pirate));
    }

    #[test]
    fn flags_are_or_combined() {
        let sel = markers(&[FilterFlag::Demo, FilterFlag::Unlicensed], &[]);
        assert!(matches(&file("A (Demo).gba"), &sel));
        assert!(matches(&file("B (Unl).gba"), &sel));
        assert!(!matches(&file("C (Beta).gba"), &sel));
    }

    #[test]
    fn keywords_refine_flags_with_and() {
        let sel = markers(&[FilterFlag::Prototype, FilterFlag::Demo], &["brazil"]);
        assert!(matches(&file("A (Brazil) (Proto).sms"), &sel));
        assert!(matches(&file("B (Brazil) (Demo).sms"), &sel));
        assert!(!matches(&file("C (Brazil).sms"), &sel));
        assert!(!matches(&file("D (USA) (Proto).sms"), &sel));
    }

    #[test]
    fn keywords_ignore_the_extension() {
        let sel = markers(&[], &["zip"]);
        assert!(!matches(&file("Game (USA).zip"), &sel));
        assert!(matches(&file("Zip Zap (USA).zip"), &sel));
    }

    #[test]
    fn keywords_alone_must_all_match() {
        let sel = markers(&[], &["USA", "rev 1"]);
        assert!(matches(&file("Game (USA) (Rev 1).nes"), &sel));
        assert!(!matches(&file("Game (USA).nes"), &sel));
        assert!(!matches(&file("Game (Europe) (Rev 1).nes"), &sel));
    }

    #[test]
    fn keywords_are_literal_text() {
        let sel = markers(&[], &["[!]"]);
        assert!(matches(&file("Game (U) [!].nes"), &sel));
        assert!(!matches(&file("Game! (U).nes"), &sel));
    }

    #[test]
    fn agrees_with_or_of_flags_and_all_keywords() {
        let names = [
            "A (Demo).bin",
            "A (Demo) (USA).bin",
            "B (Beta) (Japan).bin",
            "C (Unl) (USA).bin",
            "D (Pirate).bin",
            "E (Proto) (USA).bin",
            "F (USA).bin",
        ];
        let flag_sets: [&[FilterFlag]; 4] = [
            &[],
            &[FilterFlag::Demo],
            &[FilterFlag::Beta, FilterFlag::Pirate],
            &[
                FilterFlag::Demo,
                FilterFlag::Beta,
                FilterFlag::Unlicensed,
                FilterFlag::Prototype,
                FilterFlag::Pirate,
            ],
        ];
        let keyword_sets: [&[&str]; 3] = [&[], &["usa"], &["usa", "("]];

        for flags in flag_sets {
            for keywords in keyword_sets {
                if flags.is_empty() && keywords.is_empty() {
                    continue;
                }
                let sel = markers(flags, keywords);
                for name in names {
                    let f = file(name);
                    let lower = f.stem().to_lowercase();
                    let flag_ok =
                        flags.is_empty() || flags.iter().any(|fl| flag_matches(*fl, f.stem()));
                    let kw_ok = keywords.iter().all(|k| lower.contains(&k.to_lowercase()));
                    assert_eq!(
                        matches(&f, &sel),
                        flag_ok && kw_ok,
                        "{name} with {flags:?} / {keywords:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn empty_marker_selection_is_rejected() {
        let err = Selection::markers(&[], &[]).unwrap_err();
        assert!(matches!(err, OrganizeError::Configuration(_)));
    }

    #[test]
    fn reference_selection_matches_on_content_only() {
        let mut db = ReferenceDb::new("test.dat");
        db.insert("Game A.rom", EMPTY_MD5);
        let sel = Selection::Reference(db);
        assert!(sel.needs_checksum());

        assert!(matches(&hashed("renamed.bin", EMPTY_MD5), &sel));
        assert!(!matches(
            &hashed("Game A.rom", "900150983cd24fb0d6963f7d28e17f72"),
            &sel
        ));
        // never hashed
        assert!(!matches(&file("Game A.rom"), &sel));
        assert_eq!(
            evaluate(&hashed("x", EMPTY_MD5), &sel).as_deref(),
            Some("dat entry \"Game A.rom\"")
        );
    }

    #[test]
    fn achievement_selection_uses_index() {
        let index = AchievementIndex::from_hashes(7, [(EMPTY_MD5, "Game A")]);
        let sel = Selection::Achievements(index);
        assert!(matches(&hashed("a.nes", EMPTY_MD5), &sel));
        assert!(!matches(&hashed("b.nes", "900150983cd24fb0d6963f7d28e17f72"), &sel));
        assert_eq!(sel.describe(), "cheevos console 7 (1 hashes)");
    }

    #[test]
    fn describes_marker_selection() {
        let sel = markers(&[FilterFlag::Demo, FilterFlag::Pirate], &["USA"]);
        assert_eq!(sel.describe(), "any of [demo, pirate] and all of [\"USA\"]");
        assert!(!sel.needs_checksum());
    }
}
