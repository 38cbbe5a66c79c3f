//! Practice content: character pools and word lists.

use std::fs;
use std::path::Path;

use clap::ValueEnum;
use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

use crate::error::{Error, Result};

static WORDLIST_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/wordlists");

pub const PUNCTUATION: [&str; 7] = [".", ",", "?", "/", "=", "-", ";"];

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, strum_macros::Display)]
pub enum Category {
    /// A-Z
    Letters,
    /// 0-9
    Numbers,
    /// Letters and numbers
    Mix,
    Punctuation,
    /// Words of a fixed length from a word list
    Words,
}

#[derive(Deserialize, Clone, Debug)]
pub struct WordList {
    pub name: String,
    pub size: u32,
    pub words: Vec<String>,
}

impl WordList {
    /// The list compiled into the binary.
    pub fn builtin() -> Result<Self> {
        let file = WORDLIST_DIR
            .get_file("common.json")
            .ok_or_else(|| Error::Config("built-in word list missing".into()))?;
        let text = file
            .contents_utf8()
            .ok_or_else(|| Error::Config("built-in word list is not UTF-8".into()))?;
        serde_json::from_str(text).map_err(|e| Error::Config(format!("built-in word list: {e}")))
    }

    /// One word per line; blank lines are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::WordList {
            path: path.to_path_buf(),
            source,
        })?;
        let words: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            name: path.display().to_string(),
            size: words.len() as u32,
            words,
        })
    }

    /// Alphabetic words of exactly `length` letters.
    pub fn with_length(&self, length: usize) -> Vec<String> {
        self.words
            .iter()
            .filter(|w| w.len() == length && w.chars().all(|c| c.is_ascii_alphabetic()))
            .map(|w| w.to_ascii_uppercase())
            .collect()
    }
}

fn letters() -> impl Iterator<Item = String> {
    ('A'..='Z').map(String::from)
}

fn numbers() -> impl Iterator<Item = String> {
    ('0'..='9').map(String::from)
}

/// Materialize the items for `category`, in canonical order.
pub fn build_pool(
    category: Category,
    words: Option<&WordList>,
    length: Option<usize>,
) -> Result<Vec<String>> {
    let pool: Vec<String> = match category {
        Category::Letters => letters().collect(),
        Category::Numbers => numbers().collect(),
        Category::Mix => letters().chain(numbers()).collect(),
        Category::Punctuation => PUNCTUATION.iter().map(|p| p.to_string()).collect(),
        Category::Words => {
            let length = length
                .filter(|n| *n > 0)
                .ok_or_else(|| Error::EmptyPool("word length must be at least 1".into()))?;
            let list = match words {
                Some(list) => list.clone(),
                None => WordList::builtin()?,
            };
            let filtered = list.with_length(length);
            if filtered.is_empty() {
                return Err(Error::EmptyPool(format!(
                    "no words with {length} letters found in {}",
                    list.name
                )));
            }
            filtered
        }
    };
    Ok(pool)
}

/// Shuffle once; the session then walks the pool front to back.
pub fn shuffle_pool<R: Rng + ?Sized>(pool: &mut [String], rng: &mut R) {
    pool.shuffle(rng);
}
