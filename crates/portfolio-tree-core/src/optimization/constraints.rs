use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PortfolioTreeError;
use crate::PortfolioTreeResult;

/// Which side of an entity's weight a constraint limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundKind {
    Min,
    Max,
}

impl BoundKind {
    pub fn parse(raw: &str) -> PortfolioTreeResult<Self> {
        match raw {
            "min" => Ok(BoundKind::Min),
            "max" => Ok(BoundKind::Max),
            other => Err(PortfolioTreeError::InvalidInput {
                field: "constraints".into(),
                reason: format!("unknown bound type '{other}', expected 'min' or 'max'"),
            }),
        }
    }
}

/// `weight(entity) >= value` or `weight(entity) <= value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConstraint {
    pub entity: String,
    pub bound: BoundKind,
    pub value: Decimal,
}

impl WeightConstraint {
    pub fn min(entity: impl Into<String>, value: Decimal) -> Self {
        Self {
            entity: entity.into(),
            bound: BoundKind::Min,
            value,
        }
    }

    pub fn max(entity: impl Into<String>, value: Decimal) -> Self {
        Self {
            entity: entity.into(),
            bound: BoundKind::Max,
            value,
        }
    }

    /// Parse the `"<entity>_min"` / `"<entity>_max"` key form. The entity
    /// name may itself contain underscores; the suffix after the last one
    /// is the bound kind.
    pub fn from_key(key: &str, value: Decimal) -> PortfolioTreeResult<Self> {
        let (entity, kind) = key.rsplit_once('_').ok_or_else(|| {
            PortfolioTreeError::InvalidInput {
                field: "constraints".into(),
                reason: format!("constraint key '{key}' has no '_min' or '_max' suffix"),
            }
        })?;
        if entity.is_empty() {
            return Err(PortfolioTreeError::InvalidInput {
                field: "constraints".into(),
                reason: format!("constraint key '{key}' names no entity"),
            });
        }
        Ok(Self {
            entity: entity.to_string(),
            bound: BoundKind::parse(kind)?,
            value,
        })
    }

    pub fn key(&self) -> String {
        match self.bound {
            BoundKind::Min => format!("{}_min", self.entity),
            BoundKind::Max => format!("{}_max", self.entity),
        }
    }
}

/// Constraints as written in configuration: either structured records or the
/// legacy `{"Equity_min": 0.3}` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintSpec {
    Structured(Vec<WeightConstraint>),
    Legacy(BTreeMap<String, Decimal>),
}

impl Default for ConstraintSpec {
    fn default() -> Self {
        ConstraintSpec::Structured(Vec::new())
    }
}

impl ConstraintSpec {
    pub fn resolve(&self) -> PortfolioTreeResult<Vec<WeightConstraint>> {
        match self {
            ConstraintSpec::Structured(list) => Ok(list.clone()),
            ConstraintSpec::Legacy(map) => map
                .iter()
                .map(|(key, value)| WeightConstraint::from_key(key, *value))
                .collect(),
        }
    }
}

/// Constraint sets for every optimized level of the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// Bounds on category weights (top level).
    #[serde(default)]
    pub category: ConstraintSpec,
    /// Bounds on subcategory weights, keyed by the parent category name.
    #[serde(default)]
    pub sub_category: BTreeMap<String, ConstraintSpec>,
}

impl ConstraintSet {
    pub fn category_constraints(&self) -> PortfolioTreeResult<Vec<WeightConstraint>> {
        self.category.resolve()
    }

    pub fn sub_category_constraints(
        &self,
        category: &str,
    ) -> PortfolioTreeResult<Vec<WeightConstraint>> {
        match self.sub_category.get(category) {
            Some(spec) => spec.resolve(),
            None => Ok(Vec::new()),
        }
    }
}

/// Per-entity `[lower, upper]` bounds in entity order, after folding all
/// constraints (tightest bound wins) onto long-only defaults.
pub fn resolve_bounds(
    entity_names: &[String],
    constraints: &[WeightConstraint],
) -> PortfolioTreeResult<Vec<(Decimal, Decimal)>> {
    let mut bounds = vec![(Decimal::ZERO, Decimal::ONE); entity_names.len()];

    for c in constraints {
        let idx = entity_names
            .iter()
            .position(|n| *n == c.entity)
            .ok_or_else(|| PortfolioTreeError::InvalidInput {
                field: "constraints".into(),
                reason: format!("constraint '{}' names an unknown entity", c.key()),
            })?;
        if c.value < Decimal::ZERO || c.value > Decimal::ONE {
            return Err(PortfolioTreeError::WeightOutOfRange {
                entity: c.key(),
                weight: c.value,
            });
        }
        match c.bound {
            BoundKind::Min => bounds[idx].0 = bounds[idx].0.max(c.value),
            BoundKind::Max => bounds[idx].1 = bounds[idx].1.min(c.value),
        }
    }

    for (name, (lo, hi)) in entity_names.iter().zip(bounds.iter()) {
        if lo > hi {
            return Err(PortfolioTreeError::InvalidInput {
                field: "constraints".into(),
                reason: format!("min bound {lo} exceeds max bound {hi} for '{name}'"),
            });
        }
    }

    let sum_lo: Decimal = bounds.iter().map(|b| b.0).sum();
    let sum_hi: Decimal = bounds.iter().map(|b| b.1).sum();
    if sum_lo > Decimal::ONE || sum_hi < Decimal::ONE {
        return Err(PortfolioTreeError::InvalidInput {
            field: "constraints".into(),
            reason: format!(
                "infeasible bounds: minimums sum to {sum_lo}, maximums sum to {sum_hi}"
            ),
        });
    }

    Ok(bounds)
}
