use serde::{Deserialize, Serialize};

/// Aggregate experience as normalised by the standardizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experience {
    pub total_years: f32,
    pub summary: String,
}

impl Experience {
    /// Text used for the single aggregate-experience embedding.
    pub fn embedding_text(&self) -> String {
        format!("{:.1} years of experience. {}", self.total_years, self.summary)
    }
}

/// Normalised CV content. Skills and responsibilities are ordered sets in rank order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredRecord {
    pub title: String,
    pub skills: Vec<String>,
    pub responsibilities: Vec<String>,
    pub experience: Experience,
}

/// Drops blank entries and case-insensitive duplicates, keeping first occurrence.
pub fn ordered_set(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}
