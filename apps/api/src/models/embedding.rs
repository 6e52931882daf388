use serde::{Deserialize, Serialize};

pub const SKILL_SLOTS: usize = 20;
pub const RESPONSIBILITY_SLOTS: usize = 10;
/// 20 skills + 10 responsibilities + title + experience.
pub const EMBEDDINGS_PER_DOCUMENT: usize = SKILL_SLOTS + RESPONSIBILITY_SLOTS + 2;

/// Fixed purpose of one vector in an [`EmbeddingSet`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum EmbeddingTag {
    Skill(usize),
    Responsibility(usize),
    Title,
    Experience,
}

impl EmbeddingTag {
    /// Stable key used by the vector store, e.g. `skill:3`.
    pub fn key(&self) -> String {
        match self {
            EmbeddingTag::Skill(i) => format!("skill:{i}"),
            EmbeddingTag::Responsibility(i) => format!("responsibility:{i}"),
            EmbeddingTag::Title => "title".to_string(),
            EmbeddingTag::Experience => "experience".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSlot {
    pub tag: EmbeddingTag,
    /// `None` for placeholder slots.
    pub source_text: Option<String>,
    /// Placeholder slots hold a zero vector and carry no content.
    pub placeholder: bool,
    pub vector: Vec<f32>,
}

/// Exactly [`EMBEDDINGS_PER_DOCUMENT`] vectors of uniform dimension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSet {
    pub model: String,
    pub dimensions: usize,
    pub slots: Vec<EmbeddingSlot>,
}

impl EmbeddingSet {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[cfg(test)]
    pub fn count_where(&self, pred: impl Fn(&EmbeddingTag) -> bool) -> usize {
        self.slots.iter().filter(|s| pred(&s.tag)).count()
    }
}
