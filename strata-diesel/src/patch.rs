use strata_core::{DataError, TableMetadata};

/// Columns written by an update.
///
/// `only` restricts the update to the named columns (every mutable column
/// when empty); `omit` then removes columns from that set.
///
/// ```ignore
/// // Every mutable column except `created_at`.
/// repo.update(&person, UpdateRequest::fields(FieldSet::omit(["created_at"]))).await?;
/// // Only `age`.
/// repo.update(&person, UpdateRequest::fields(vec!["age".to_string()])).await?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    pub only: Vec<String>,
    pub omit: Vec<String>,
}

impl FieldSet {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: names.into_iter().map(Into::into).collect(),
            omit: Vec::new(),
        }
    }

    pub fn omit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: Vec::new(),
            omit: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and_omit<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.omit.extend(names.into_iter().map(Into::into));
        self
    }

    /// The storage names to write, or an empty list for "every mutable
    /// column". Names are matched case-insensitively; unknown ones are
    /// dropped.
    pub fn resolve(&self, meta: &TableMetadata) -> Result<Vec<String>, DataError> {
        if self.omit.is_empty() {
            return Ok(self.only.clone());
        }
        let picked: Vec<String> = meta
            .mutable_columns()
            .filter(|c| {
                self.only.is_empty() || self.only.iter().any(|n| n.eq_ignore_ascii_case(c.name()))
            })
            .filter(|c| !self.omit.iter().any(|n| n.eq_ignore_ascii_case(c.name())))
            .map(|c| c.name().to_string())
            .collect();
        if picked.is_empty() {
            return Err(DataError::Grammar(format!(
                "no column of `{}` left to update",
                meta.name()
            )));
        }
        Ok(picked)
    }
}

impl From<Vec<String>> for FieldSet {
    fn from(only: Vec<String>) -> Self {
        Self {
            only,
            omit: Vec::new(),
        }
    }
}

impl From<&[&str]> for FieldSet {
    fn from(only: &[&str]) -> Self {
        Self::only(only.iter().copied())
    }
}
