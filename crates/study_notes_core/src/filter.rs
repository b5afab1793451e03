//! crates/study_notes_core/src/filter.rs
//!
//! Decides which notes are displayed for a given category, search term and
//! favorites set. Everything here is pure and deterministic.

use std::collections::HashMap;
use uuid::Uuid;

use crate::category::Category;
use crate::domain::Note;

//=========================================================================================
// Favorites Set
//=========================================================================================

/// The notes a user has marked, keyed by note id.
#[derive(Debug, Clone, Default)]
pub struct FavoriteSet {
    by_id: HashMap<Uuid, Note>,
}

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, note_id: Uuid) -> bool {
        self.by_id.contains_key(&note_id)
    }

    /// Returns `false` if the note was already present.
    pub fn insert(&mut self, note: Note) -> bool {
        self.by_id.insert(note.id, note).is_none()
    }

    pub fn remove(&mut self, note_id: Uuid) -> Option<Note> {
        self.by_id.remove(&note_id)
    }

    /// Replaces the whole set.
    pub fn replace<I: IntoIterator<Item = Note>>(&mut self, notes: I) {
        self.by_id = notes.into_iter().map(|n| (n.id, n)).collect();
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.by_id.values()
    }
}

impl FromIterator<Note> for FavoriteSet {
    fn from_iter<I: IntoIterator<Item = Note>>(iter: I) -> Self {
        let mut set = FavoriteSet::new();
        set.replace(iter);
        set
    }
}

//=========================================================================================
// Predicates
//=========================================================================================

/// Lower-cases and trims a raw search term.
pub fn normalize_search(term: &str) -> String {
    term.trim().to_lowercase()
}

fn normalize_subject(subject: &str) -> String {
    subject.trim().to_lowercase()
}

/// `search` must already be normalized. An empty term matches every note.
pub fn matches_search(note: &Note, search: &str) -> bool {
    search.is_empty()
        || note.title.to_lowercase().contains(search)
        || normalize_subject(&note.subject).contains(search)
}

pub fn matches_category(note: &Note, category: Category, favorites: &FavoriteSet) -> bool {
    match category {
        Category::All => true,
        Category::Favorites => favorites.contains(note.id),
        subject => subject
            .subject_code()
            .is_some_and(|code| normalize_subject(&note.subject).contains(code)),
    }
}

/// The order-preserving subsequence of `notes` that passes both the search and
/// the category predicate.
pub fn compute_visible<'a>(
    notes: &'a [Note],
    favorites: &FavoriteSet,
    category: Category,
    search_term: &str,
) -> Vec<&'a Note> {
    let search = normalize_search(search_term);
    notes
        .iter()
        .filter(|note| matches_search(note, &search) && matches_category(note, category, favorites))
        .collect()
}
