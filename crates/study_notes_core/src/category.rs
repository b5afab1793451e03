//! crates/study_notes_core/src/category.rs
//!
//! The fixed set of coarse subject filters shown above the note grid.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Category {
    #[default]
    All,
    Biology,
    Chemistry,
    Physics,
    English,
    Favorites,
}

impl Category {
    /// The subject categories, in the order they are displayed.
    pub const SUBJECTS: [Category; 4] = [
        Category::Biology,
        Category::Chemistry,
        Category::Physics,
        Category::English,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::All => "All",
            Category::Biology => "Biology",
            Category::Chemistry => "Chemistry",
            Category::Physics => "Physics",
            Category::English => "English",
            Category::Favorites => "Favorites",
        }
    }

    /// The short code a normalized subject must contain to fall in this category.
    /// `None` for `All` and `Favorites`, which do not look at the subject.
    pub fn subject_code(&self) -> Option<&'static str> {
        match self {
            Category::Biology => Some("bio"),
            Category::Chemistry => Some("chem"),
            Category::Physics => Some("phy"),
            Category::English => Some("eng"),
            Category::All | Category::Favorites => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        [Category::All]
            .into_iter()
            .chain(Category::SUBJECTS)
            .chain([Category::Favorites])
            .find(|c| c.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCategory(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("biology".parse::<Category>().unwrap(), Category::Biology);
        assert_eq!(" FAVORITES ".parse::<Category>().unwrap(), Category::Favorites);
        assert_eq!("All".parse::<Category>().unwrap(), Category::All);
    }

    #[test]
    fn test_parse_rejects_unknown_label() {
        let err = "History".parse::<Category>().unwrap_err();
        assert_eq!(err, UnknownCategory("History".to_string()));
    }

    #[test]
    fn test_only_subjects_have_codes() {
        assert!(Category::All.subject_code().is_none());
        assert!(Category::Favorites.subject_code().is_none());
        for category in Category::SUBJECTS {
            assert!(category.subject_code().is_some(), "{category} has no code");
        }
    }
}
