//! Vocabulary tables mapping between token ids and token strings.
//!
//! The pipeline uses two vocabularies: one for ingredient tokens and one for
//! instruction/word tokens. Each is a dense bidirectional mapping loaded from
//! a plain-text file (one token per line, line number = id) and is immutable
//! after load. At least the four reserved tokens must be present; the
//! sentence separator and ingredient-group separator are optional per table.

use crate::core::RecipeError;
use std::collections::HashMap;
use std::path::Path;

/// Padding token.
pub const PAD_TOKEN: &str = "<pad>";
/// Sequence start token.
pub const START_TOKEN: &str = "<start>";
/// Sequence end token.
pub const END_TOKEN: &str = "<end>";
/// Unknown token.
pub const UNK_TOKEN: &str = "<unk>";
/// Instruction sentence boundary marker. Splits the decoded instruction
/// stream into the title and the individual recipe steps.
pub const EOI_TOKEN: &str = "<eoi>";
/// Ingredient group separator. Terminates the ingredient sequence like the
/// end token does.
pub const TRUE_END_TOKEN: &str = "<true_end>";

/// A fixed bidirectional mapping between dense integer ids and token strings.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    ids: HashMap<String, usize>,
    pad_id: usize,
    start_id: usize,
    end_id: usize,
    unk_id: usize,
}

impl Vocabulary {
    /// Builds a vocabulary from an ordered token list.
    ///
    /// Ids are assigned densely in list order. The list must contain the
    /// reserved tokens `<pad>`, `<start>`, `<end>` and `<unk>`, and must not
    /// contain duplicates.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, RecipeError> {
        let mut ids = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            if ids.insert(token.clone(), id).is_some() {
                return Err(RecipeError::config_error(format!(
                    "duplicate vocabulary token '{token}' at id {id}"
                )));
            }
        }

        let reserved = |token: &str| {
            ids.get(token).copied().ok_or_else(|| {
                RecipeError::config_error(format!("vocabulary is missing reserved token '{token}'"))
            })
        };
        let pad_id = reserved(PAD_TOKEN)?;
        let start_id = reserved(START_TOKEN)?;
        let end_id = reserved(END_TOKEN)?;
        let unk_id = reserved(UNK_TOKEN)?;

        Ok(Self {
            tokens,
            ids,
            pad_id,
            start_id,
            end_id,
            unk_id,
        })
    }

    /// Loads a vocabulary from a plain-text file, one token per line.
    ///
    /// Lines are trimmed; empty lines are skipped. Line order determines the
    /// token ids.
    ///
    /// # Errors
    ///
    /// Returns a `RecipeError::ModelLoad` if the file cannot be read or the
    /// token list fails validation.
    pub fn from_file(path: &Path) -> Result<Self, RecipeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecipeError::model_load(path, "failed to read vocabulary file", Some(Box::new(e)))
        })?;
        let tokens: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self::from_tokens(tokens).map_err(|e| {
            RecipeError::model_load(path, "invalid vocabulary file", Some(Box::new(e)))
        })
    }

    /// Returns the token string for an id, if the id is in range.
    pub fn token(&self, id: usize) -> Option<&str> {
        self.tokens.get(id).map(String::as_str)
    }

    /// Returns the id for a token string, if present.
    pub fn id(&self, token: &str) -> Option<usize> {
        self.ids.get(token).copied()
    }

    /// Returns the id for a token, falling back to the unknown token id.
    pub fn id_or_unk(&self, token: &str) -> usize {
        self.id(token).unwrap_or(self.unk_id)
    }

    /// Number of tokens in the vocabulary.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Id of the padding token.
    pub fn pad_id(&self) -> usize {
        self.pad_id
    }

    /// Id of the sequence start token.
    pub fn start_id(&self) -> usize {
        self.start_id
    }

    /// Id of the sequence end token.
    pub fn end_id(&self) -> usize {
        self.end_id
    }

    /// Id of the unknown token.
    pub fn unk_id(&self) -> usize {
        self.unk_id
    }

    /// Id of the instruction sentence boundary marker, if this table has one.
    pub fn eoi_id(&self) -> Option<usize> {
        self.id(EOI_TOKEN)
    }

    /// Id of the ingredient group separator, if this table has one.
    pub fn true_end_id(&self) -> Option<usize> {
        self.id(TRUE_END_TOKEN)
    }
}
