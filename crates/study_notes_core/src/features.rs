//! crates/study_notes_core/src/features.rs
//!
//! Describes which parts of the notes screen are switched on. A single
//! parameterized screen covers every deployment variant.

use std::str::FromStr;

use crate::category::Category;

/// Where favorite marks live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FavoritesMode {
    /// No favorite toggles at all.
    Disabled,
    /// Marks are kept in memory only and vanish on reload. No sign-in needed.
    Local,
    /// Marks are mirrored to the favorites table. Requires a signed-in user.
    #[default]
    Synced,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown favorites mode '{0}', expected one of: disabled, local, synced")]
pub struct UnknownFavoritesMode(pub String);

impl FromStr for FavoritesMode {
    type Err = UnknownFavoritesMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(FavoritesMode::Disabled),
            "local" => Ok(FavoritesMode::Local),
            "synced" => Ok(FavoritesMode::Synced),
            other => Err(UnknownFavoritesMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureConfig {
    pub favorites: FavoritesMode,
    /// Shows the upload form and delete buttons to admins.
    pub admin_panel: bool,
    /// Offers a `Favorites` entry in the category selector.
    pub favorites_category: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            favorites: FavoritesMode::Synced,
            admin_panel: true,
            favorites_category: true,
        }
    }
}

impl FeatureConfig {
    /// The categories the selector offers, in display order.
    pub fn categories(&self) -> Vec<Category> {
        let mut categories = vec![Category::All];
        categories.extend(Category::SUBJECTS);
        if self.offers_favorites_category() {
            categories.push(Category::Favorites);
        }
        categories
    }

    pub fn offers(&self, category: Category) -> bool {
        category != Category::Favorites || self.offers_favorites_category()
    }

    fn offers_favorites_category(&self) -> bool {
        self.favorites_category && self.favorites != FavoritesMode::Disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_offers_every_category() {
        let categories = FeatureConfig::default().categories();
        assert_eq!(categories.first(), Some(&Category::All));
        assert_eq!(categories.last(), Some(&Category::Favorites));
        assert_eq!(categories.len(), 6);
    }

    #[test]
    fn test_disabled_favorites_hides_category() {
        let features = FeatureConfig {
            favorites: FavoritesMode::Disabled,
            ..FeatureConfig::default()
        };
        assert!(!features.offers(Category::Favorites));
        assert!(features.offers(Category::Physics));
        assert!(!features.categories().contains(&Category::Favorites));
    }

    #[test]
    fn test_parse_favorites_mode() {
        assert_eq!("Local".parse::<FavoritesMode>().unwrap(), FavoritesMode::Local);
        assert_eq!("off".parse::<FavoritesMode>().unwrap(), FavoritesMode::Disabled);
        assert!("cloud".parse::<FavoritesMode>().is_err());
    }
}
