use crate::core::expr::{parse_expression, Expr};
use crate::domain::model::{ParameterCombination, ParameterDefinition, ParameterType, ParameterValue};
use crate::utils::error::{BatchError, Result};
use std::collections::HashMap;

/// A compiled boolean predicate over combinations.
///
/// Compilation parses and type-checks the condition against the declared
/// parameters, so every error surfaces before the space is enumerated.
#[derive(Debug, Clone)]
pub struct ConstraintFilter {
    condition: Option<String>,
    expr: Option<Expr>,
}

impl ConstraintFilter {
    pub fn identity() -> Self {
        Self {
            condition: None,
            expr: None,
        }
    }

    pub fn compile(condition: Option<&str>, definitions: &[ParameterDefinition]) -> Result<Self> {
        let condition = match condition.map(str::trim) {
            None | Some("") => return Ok(Self::identity()),
            Some(c) => c,
        };

        let expr = parse_expression(condition)?;
        let types: HashMap<String, ParameterType> = definitions
            .iter()
            .map(|d| (d.name.clone(), d.value_type()))
            .collect();

        let result = expr.check(&types, "batch_filtering.filter_conditions")?;
        if result != ParameterType::Boolean {
            return Err(BatchError::config(
                "batch_filtering.filter_conditions",
                format!("Condition '{}' evaluates to {}, expected boolean", condition, result),
            ));
        }

        tracing::debug!(
            "Compiled filter condition '{}' over {:?}",
            condition,
            expr.identifiers()
        );

        Ok(Self {
            condition: Some(condition.to_string()),
            expr: Some(expr),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.expr.is_none()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn matches(&self, combination: &ParameterCombination) -> Result<bool> {
        let Some(expr) = &self.expr else {
            return Ok(true);
        };
        match expr.evaluate(&|name: &str| combination.get(name))? {
            ParameterValue::Bool(keep) => Ok(keep),
            other => Err(BatchError::IncompatibleTypes {
                operator: "condition".to_string(),
                left: other.value_type().to_string(),
                right: ParameterType::Boolean.to_string(),
            }),
        }
    }

    /// Keeps matching combinations in their original relative order.
    pub fn apply<I>(&self, combinations: I) -> Result<Vec<ParameterCombination>>
    where
        I: IntoIterator<Item = ParameterCombination>,
    {
        let mut kept = Vec::new();
        for combination in combinations {
            if self.matches(&combination)? {
                kept.push(combination);
            }
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::space::ParameterSpace;

    fn channel_definitions() -> Vec<ParameterDefinition> {
        vec![
            ParameterDefinition::values("K_ch", [2.0, 2.5, 3.0]).with_unit("mm"),
            ParameterDefinition::values("W_ch", [2.0, 3.0]).with_unit("mm"),
        ]
    }

    #[test]
    fn test_missing_condition_is_identity() {
        let defs = channel_definitions();
        let filter = ConstraintFilter::compile(None, &defs).unwrap();
        assert!(filter.is_identity());
        let space = ParameterSpace::build(&defs).unwrap();
        assert_eq!(filter.apply(space.iter()).unwrap().len(), 6);

        assert!(ConstraintFilter::compile(Some("   "), &defs).unwrap().is_identity());
    }

    #[test]
    fn test_filter_keeps_subset_in_order() {
        let defs = channel_definitions();
        let space = ParameterSpace::build(&defs).unwrap();
        let filter = ConstraintFilter::compile(Some("K_ch < W_ch"), &defs).unwrap();
        let kept = filter.apply(space.iter()).unwrap();

        let ordinals: Vec<u64> = kept.iter().map(|c| c.ordinal()).collect();
        // (2.0, 3.0), (2.5, 3.0)
        assert_eq!(ordinals, vec![1, 3]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let defs = channel_definitions();
        let space = ParameterSpace::build(&defs).unwrap();
        let filter = ConstraintFilter::compile(Some("K_ch >= 2.5 or W_ch == 2"), &defs).unwrap();
        let once = filter.apply(space.iter()).unwrap();
        let twice = filter.apply(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_identifier_fails_before_enumeration() {
        let defs = channel_definitions();
        let err = ConstraintFilter::compile(Some("K_ch < H_ch"), &defs).unwrap_err();
        assert!(matches!(
            err,
            BatchError::UnknownIdentifier { ref identifier, .. } if identifier == "H_ch"
        ));
    }

    #[test]
    fn test_non_boolean_condition_is_rejected() {
        let defs = channel_definitions();
        let err = ConstraintFilter::compile(Some("K_ch + W_ch"), &defs).unwrap_err();
        assert!(matches!(err, BatchError::ConfigurationError { .. }));
    }

    #[test]
    fn test_string_parameter_equality() {
        let defs = vec![ParameterDefinition::values("mode", ["coarse", "fine"])];
        let space = ParameterSpace::build(&defs).unwrap();
        let filter = ConstraintFilter::compile(Some("mode != \"coarse\""), &defs).unwrap();
        let kept = filter.apply(space.iter()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].get("mode"), Some(&ParameterValue::from("fine")));
    }
}
