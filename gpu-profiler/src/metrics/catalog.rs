//! Metric and counter definitions
//!
//! The catalog maps user-facing names to [`Metric`]s. A basic metric is a
//! hardware counter under its own name; a derived metric carries an expression
//! whose leaves are counters (references to other derived metrics are inlined
//! when the metric is added); `KERNEL_DURATION` is always present and is filled
//! from elapsed time rather than counters.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use rocscope_shared::{BlockKind, Event};
use serde::{Deserialize, Serialize};

use super::expr::{Expr, ParseError};

/// Name of the elapsed-time pseudo metric
pub const KERNEL_DURATION: &str = "KERNEL_DURATION";

/// A named hardware counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    pub event: Event,
}

impl Counter {
    pub fn new(name: impl Into<String>, event: Event) -> Self {
        Self {
            name: name.into(),
            event,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
    /// Direct alias of one counter
    Basic,
    /// Expression over counters; `source` is the text as written
    Derived { expr: Expr, source: String },
    /// Elapsed kernel time, supplied at evaluation
    KernelDuration,
}

/// A user-facing metric
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    description: String,
    kind: MetricKind,
    counters: Vec<Counter>,
}

impl Metric {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &MetricKind {
        &self.kind
    }

    /// Hardware counters this metric needs
    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    /// The expression of a derived metric
    pub fn expr(&self) -> Option<&Expr> {
        match &self.kind {
            MetricKind::Derived { expr, .. } => Some(expr),
            _ => None,
        }
    }

    pub fn is_kernel_duration(&self) -> bool {
        matches!(self.kind, MetricKind::KernelDuration)
    }

    /// Derived metrics and `KERNEL_DURATION` are computed rather than read
    pub fn is_computed(&self) -> bool {
        !matches!(self.kind, MetricKind::Basic)
    }
}

/// Lookup of metrics by name
pub trait MetricCatalog: Send + Sync {
    fn get(&self, name: &str) -> Option<&Metric>;

    /// Every metric, sorted by name
    fn metrics(&self) -> Vec<&Metric>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("'{0}' is already defined")]
    Duplicate(String),

    #[error("invalid expression for metric '{metric}': {source}")]
    Expression {
        metric: String,
        #[source]
        source: ParseError,
    },

    #[error("metric '{metric}' references unknown name '{name}'")]
    UnknownReference { metric: String, name: String },
}

/// Catalog held in memory, built programmatically or from TOML
#[derive(Debug, Clone)]
pub struct InMemoryCatalog {
    metrics: BTreeMap<String, Metric>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    /// An empty catalog holding only `KERNEL_DURATION`
    pub fn new() -> Self {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            KERNEL_DURATION.to_string(),
            Metric {
                name: KERNEL_DURATION.to_string(),
                description: "Kernel execution time in nanoseconds".to_string(),
                kind: MetricKind::KernelDuration,
                counters: Vec::new(),
            },
        );
        Self { metrics }
    }

    /// Register a hardware counter as a basic metric
    pub fn add_counter(
        &mut self,
        counter: Counter,
        description: impl Into<String>,
    ) -> Result<(), CatalogError> {
        if self.metrics.contains_key(&counter.name) {
            return Err(CatalogError::Duplicate(counter.name));
        }
        let name = counter.name.clone();
        self.metrics.insert(
            name.clone(),
            Metric {
                name,
                description: description.into(),
                kind: MetricKind::Basic,
                counters: vec![counter],
            },
        );
        Ok(())
    }

    /// Register a derived metric. Every name in `source` must already be a
    /// counter or a derived metric; derived references are inlined.
    pub fn add_derived(
        &mut self,
        name: &str,
        source: &str,
        description: impl Into<String>,
    ) -> Result<(), CatalogError> {
        if self.metrics.contains_key(name) {
            return Err(CatalogError::Duplicate(name.to_string()));
        }
        let parsed = Expr::parse(source).map_err(|source| CatalogError::Expression {
            metric: name.to_string(),
            source,
        })?;

        for var in parsed.variables() {
            match self.metrics.get(&var) {
                Some(m) if !m.is_kernel_duration() => {}
                _ => {
                    return Err(CatalogError::UnknownReference {
                        metric: name.to_string(),
                        name: var,
                    })
                }
            }
        }

        let expr = parsed.substitute(&|var: &str| self.metrics.get(var)?.expr().cloned());
        let counters = expr
            .variables()
            .iter()
            .filter_map(|var| self.metrics.get(var))
            .flat_map(|m| m.counters.iter().cloned())
            .collect();

        self.metrics.insert(
            name.to_string(),
            Metric {
                name: name.to_string(),
                description: description.into(),
                kind: MetricKind::Derived {
                    expr,
                    source: source.to_string(),
                },
                counters,
            },
        );
        Ok(())
    }

    /// Parse a catalog description. Derived metrics may only reference counters
    /// and derived metrics defined before them.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let file: CatalogFile = toml::from_str(s).context("Failed to parse catalog")?;
        let mut catalog = Self::new();
        for c in file.counters {
            let event = Event::new(c.block, c.block_index, c.counter_id);
            catalog.add_counter(Counter::new(c.name, event), c.description)?;
        }
        for m in file.metrics {
            catalog.add_derived(&m.name, &m.expr, m.description)?;
        }
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("In {}", path.display()))
    }
}

impl MetricCatalog for InMemoryCatalog {
    fn get(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    fn metrics(&self) -> Vec<&Metric> {
        self.metrics.values().collect()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "counter")]
    counters: Vec<CounterDef>,

    #[serde(default, rename = "metric")]
    metrics: Vec<MetricDef>,
}

#[derive(Debug, Deserialize)]
struct CounterDef {
    name: String,
    block: BlockKind,
    #[serde(default)]
    block_index: u32,
    counter_id: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct MetricDef {
    name: String,
    expr: String,
    #[serde(default)]
    description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> InMemoryCatalog {
        let mut c = InMemoryCatalog::new();
        c.add_counter(Counter::new("GRBM_COUNT", Event::new(BlockKind::Grbm, 0, 0)), "")
            .unwrap();
        c.add_counter(
            Counter::new("GRBM_GUI_ACTIVE", Event::new(BlockKind::Grbm, 0, 2)),
            "",
        )
        .unwrap();
        c.add_counter(Counter::new("SQ_WAVES", Event::new(BlockKind::Sq, 0, 4)), "")
            .unwrap();
        c
    }

    #[test]
    fn test_kernel_duration_always_present() {
        let c = InMemoryCatalog::new();
        let m = c.get(KERNEL_DURATION).unwrap();
        assert!(m.is_kernel_duration());
        assert!(m.counters().is_empty());
    }

    #[test]
    fn test_basic_metric_wraps_one_counter() {
        let c = catalog();
        let m = c.get("SQ_WAVES").unwrap();
        assert_eq!(m.kind(), &MetricKind::Basic);
        assert_eq!(m.counters().len(), 1);
        assert!(m.expr().is_none());
    }

    #[test]
    fn test_derived_metric_collects_counters() {
        let mut c = catalog();
        c.add_derived("GPUBusy", "100*GRBM_GUI_ACTIVE/GRBM_COUNT", "")
            .unwrap();
        let m = c.get("GPUBusy").unwrap();
        let names: Vec<_> = m.counters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["GRBM_COUNT", "GRBM_GUI_ACTIVE"]);
        assert!(m.is_computed());
    }

    #[test]
    fn test_nested_derived_is_inlined() {
        let mut c = catalog();
        c.add_derived("GPUBusy", "100*GRBM_GUI_ACTIVE/GRBM_COUNT", "")
            .unwrap();
        c.add_derived("Waves_per_busy", "SQ_WAVES/GPUBusy", "").unwrap();
        let m = c.get("Waves_per_busy").unwrap();
        assert_eq!(m.counters().len(), 3);
        let vars = m.expr().unwrap().variables();
        assert!(!vars.contains("GPUBusy"));
    }

    #[test]
    fn test_derived_rejects_unknown_and_duplicate() {
        let mut c = catalog();
        assert!(matches!(
            c.add_derived("X", "SQ_WAVES + NOPE", ""),
            Err(CatalogError::UnknownReference { .. })
        ));
        assert!(matches!(
            c.add_derived("SQ_WAVES", "GRBM_COUNT", ""),
            Err(CatalogError::Duplicate(_))
        ));
        assert!(matches!(
            c.add_derived("Y", "GRBM_COUNT +", ""),
            Err(CatalogError::Expression { .. })
        ));
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
            [[counter]]
            name = "SQ_WAVES"
            block = "SQ"
            counter_id = 4
            description = "Waves sent to SQs"

            [[counter]]
            name = "TCC_HIT[1]"
            block = "TCC"
            block_index = 1
            counter_id = 17

            [[metric]]
            name = "Double"
            expr = "2 * SQ_WAVES"
        "#;
        let c = InMemoryCatalog::from_toml_str(text).unwrap();
        assert_eq!(c.metrics().len(), 4);
        assert_eq!(
            c.get("TCC_HIT[1]").unwrap().counters()[0].event,
            Event::new(BlockKind::Tcc, 1, 17)
        );
        assert_eq!(c.get("SQ_WAVES").unwrap().description(), "Waves sent to SQs");
    }

    #[test]
    fn test_from_toml_rejects_bad_block() {
        let text = r#"
            [[counter]]
            name = "X"
            block = "NOT_A_BLOCK"
            counter_id = 1
        "#;
        assert!(InMemoryCatalog::from_toml_str(text).is_err());
    }
}
