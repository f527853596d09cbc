//! Fillable 1D histogram, including labelled cutflow histograms.

use serde::{Deserialize, Serialize};

use at_core::{Error, Result};

/// A weighted 1D histogram with under/overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram name.
    pub name: String,
    /// Histogram title.
    pub title: String,
    /// Bin edges (length = number of bins + 1).
    pub bin_edges: Vec<f64>,
    /// Bin contents (sum of weights per bin).
    pub bin_content: Vec<f64>,
    /// Sum of weights squared per bin.
    pub sumw2: Vec<f64>,
    /// Sum of weights below the first edge.
    pub underflow: f64,
    /// Sum of weights at or above the last edge.
    pub overflow: f64,
    /// Optional bin labels (length = number of bins).
    pub bin_labels: Option<Vec<String>>,
    /// Number of fill calls.
    pub entries: u64,
}

impl Histogram {
    /// Histogram with explicit, strictly increasing edges.
    pub fn new(name: impl Into<String>, title: impl Into<String>, edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 || edges.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(Error::Validation(format!(
                "histogram edges must be strictly increasing with at least one bin, got {edges:?}"
            )));
        }
        let n = edges.len() - 1;
        Ok(Self {
            name: name.into(),
            title: title.into(),
            bin_edges: edges,
            bin_content: vec![0.0; n],
            sumw2: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            bin_labels: None,
            entries: 0,
        })
    }

    /// `n_bins` equal-width bins on `[x_min, x_max)`.
    pub fn uniform(
        name: impl Into<String>,
        title: impl Into<String>,
        n_bins: usize,
        x_min: f64,
        x_max: f64,
    ) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::Validation("histogram needs at least one bin".into()));
        }
        let width = (x_max - x_min) / n_bins as f64;
        let edges = (0..=n_bins).map(|i| x_min + width * i as f64).collect();
        Self::new(name, title, edges)
    }

    /// One bin per label, centred on the integers `0..labels.len()`.
    pub fn cutflow(name: impl Into<String>, labels: &[String]) -> Result<Self> {
        let name = name.into();
        let n = labels.len();
        let mut h = Self::uniform(name.clone(), name, n, -0.5, n as f64 - 0.5)?;
        h.bin_labels = Some(labels.to_vec());
        Ok(h)
    }

    /// Number of bins, excluding under/overflow.
    pub fn n_bins(&self) -> usize {
        self.bin_content.len()
    }

    /// Bin index holding `x`, or `None` when `x` is outside the edges.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        let edges = &self.bin_edges;
        if x.is_nan() || x < edges[0] || x >= edges[edges.len() - 1] {
            return None;
        }
        // First edge strictly greater than x, minus one.
        Some(edges.partition_point(|&e| e <= x) - 1)
    }

    /// Add `weight` at `x`.
    pub fn fill(&mut self, x: f64, weight: f64) {
        self.entries += 1;
        match self.find_bin(x) {
            Some(i) => {
                self.bin_content[i] += weight;
                self.sumw2[i] += weight * weight;
            }
            None if x < self.bin_edges[0] => self.underflow += weight,
            None => self.overflow += weight,
        }
    }

    /// Add `weight` directly to bin `index`; out-of-range indices are ignored.
    pub fn fill_bin(&mut self, index: usize, weight: f64) {
        if index < self.n_bins() {
            self.entries += 1;
            self.bin_content[index] += weight;
            self.sumw2[index] += weight * weight;
        }
    }

    /// Label of bin `index`, if labelled.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.bin_labels.as_ref()?.get(index).map(String::as_str)
    }

    /// Content of the first bin labelled `label`.
    pub fn content_by_label(&self, label: &str) -> Option<f64> {
        let i = self.bin_labels.as_ref()?.iter().position(|l| l == label)?;
        Some(self.bin_content[i])
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Statistical uncertainty of bin `index`.
    pub fn bin_error(&self, index: usize) -> f64 {
        self.sumw2.get(index).map_or(0.0, |s| s.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn find_bin_edge_cases() {
        let h = Histogram::new("h", "", vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(h.find_bin(-0.5), None);
        assert_eq!(h.find_bin(3.0), None);
        assert_eq!(h.find_bin(0.0), Some(0));
        assert_eq!(h.find_bin(1.0), Some(1));
        assert_eq!(h.find_bin(2.99), Some(2));
        assert_eq!(h.find_bin(f64::NAN), None);
    }

    #[test]
    fn fill_tracks_flows_and_sumw2() {
        let mut h = Histogram::uniform("pt", "p_{T}", 4, 0.0, 100.0).unwrap();
        h.fill(10.0, 2.0);
        h.fill(12.0, 1.0);
        h.fill(-1.0, 0.5);
        h.fill(100.0, 0.25);
        assert_relative_eq!(h.bin_content[0], 3.0);
        assert_relative_eq!(h.sumw2[0], 5.0);
        assert_relative_eq!(h.underflow, 0.5);
        assert_relative_eq!(h.overflow, 0.25);
        assert_eq!(h.entries, 4);
        assert_relative_eq!(h.bin_error(0), 5.0_f64.sqrt());
    }

    #[test]
    fn cutflow_bins_are_labelled() {
        let labels: Vec<String> = ["All", "MET", "NJets"].iter().map(|s| s.to_string()).collect();
        let mut h = Histogram::cutflow("Nominal", &labels).unwrap();
        assert_eq!(h.n_bins(), 3);
        assert_eq!(h.find_bin(1.0), Some(1));
        h.fill_bin(0, 1.0);
        h.fill_bin(2, 0.5);
        h.fill_bin(7, 9.0);
        assert_eq!(h.label(1), Some("MET"));
        assert_eq!(h.content_by_label("All"), Some(1.0));
        assert_eq!(h.content_by_label("NJets"), Some(0.5));
        assert_eq!(h.content_by_label("Missing"), None);
        assert_relative_eq!(h.integral(), 1.5);
    }

    #[test]
    fn rejects_bad_edges() {
        assert!(Histogram::new("h", "", vec![1.0]).is_err());
        assert!(Histogram::new("h", "", vec![0.0, 0.0]).is_err());
        assert!(Histogram::uniform("h", "", 0, 0.0, 1.0).is_err());
    }
}
