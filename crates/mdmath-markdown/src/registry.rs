//! Named, ordered rule lists.
//!
//! Block processors and inline patterns are tried in chain order, so where
//! an extension inserts its rule decides which syntax wins when two rules
//! could match the same text.

use crate::MarkdownError;

/// Where to insert a rule, relative to the chain or to a named rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Tried before every existing rule.
    Begin,
    /// Tried after every existing rule.
    End,
    Before(String),
    After(String),
}

impl Position {
    pub fn before(name: &str) -> Self {
        Position::Before(name.to_string())
    }

    pub fn after(name: &str) -> Self {
        Position::After(name.to_string())
    }
}

#[derive(Debug)]
pub struct RuleChain<T> {
    rules: Vec<(String, T)>,
}

impl<T> Default for RuleChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RuleChain<T> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Inserts `rule` under `name`. Names are unique within a chain.
    pub fn register(
        &mut self,
        name: &str,
        rule: T,
        position: Position,
    ) -> Result<(), MarkdownError> {
        if self.index_of(name).is_some() {
            return Err(MarkdownError::DuplicateRule(name.to_string()));
        }
        let index = match &position {
            Position::Begin => 0,
            Position::End => self.rules.len(),
            Position::Before(anchor) => self.anchor(anchor)?,
            Position::After(anchor) => self.anchor(anchor)? + 1,
        };
        log::debug!("Registered rule '{}' at {:?} (index {})", name, position, index);
        self.rules.insert(index, (name.to_string(), rule));
        Ok(())
    }

    pub fn deregister(&mut self, name: &str) -> Option<T> {
        let index = self.index_of(name)?;
        Some(self.rules.remove(index).1)
    }

    fn anchor(&self, name: &str) -> Result<usize, MarkdownError> {
        self.index_of(name)
            .ok_or_else(|| MarkdownError::UnknownAnchor(name.to_string()))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.rules.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
