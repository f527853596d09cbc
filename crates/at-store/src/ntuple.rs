//! Flat row-oriented tables of named `f64` branches.

use serde::{Deserialize, Serialize};

use at_core::{Error, Result};

/// A flat ntuple: fixed branch list, one `f64` per branch per row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ntuple {
    /// Ntuple name.
    pub name: String,
    /// Ntuple title.
    pub title: String,
    branches: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Ntuple {
    /// Empty ntuple with no branches.
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self { name: name.into(), title: title.into(), ..Self::default() }
    }

    /// Register a branch and return its column index. Registering an existing
    /// name returns the existing index. Fails once rows have been written.
    pub fn add_branch(&mut self, name: &str) -> Result<usize> {
        if let Some(i) = self.branch_index(name) {
            return Ok(i);
        }
        if !self.rows.is_empty() {
            return Err(Error::locked(&self.name, format!("add branch '{name}' after filling")));
        }
        self.branches.push(name.to_string());
        Ok(self.branches.len() - 1)
    }

    /// Column index of `name`.
    pub fn branch_index(&self, name: &str) -> Option<usize> {
        self.branches.iter().position(|b| b == name)
    }

    /// Branch names in column order.
    pub fn branches(&self) -> &[String] {
        &self.branches
    }

    /// Append one row; its length must equal the number of branches.
    pub fn fill(&mut self, row: Vec<f64>) -> Result<()> {
        if row.len() != self.branches.len() {
            return Err(Error::Validation(format!(
                "ntuple '{}' has {} branches, row has {} values",
                self.name,
                self.branches.len(),
                row.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// All values of branch `name`.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.branch_index(name)?;
        Some(self.rows.iter().map(|r| r[i]).collect())
    }

    /// All rows.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of rows.
    pub fn entries(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branches_then_rows() {
        let mut t = Ntuple::new("Postcut", "");
        assert_eq!(t.add_branch("weight").unwrap(), 0);
        assert_eq!(t.add_branch("CutVariable").unwrap(), 1);
        assert_eq!(t.add_branch("weight").unwrap(), 0);

        t.fill(vec![1.0, 42.0]).unwrap();
        t.fill(vec![0.5, 17.0]).unwrap();
        assert!(t.fill(vec![1.0]).is_err());

        assert_eq!(t.entries(), 2);
        assert_eq!(t.column("CutVariable").unwrap(), vec![42.0, 17.0]);
        assert!(t.column("pt").is_none());
        assert!(matches!(t.add_branch("pt"), Err(Error::Locked { .. })));
    }
}
