use crate::domain::model::{ParameterCombination, ParameterDefinition, ParameterDomain, ParameterValue};
use crate::utils::error::{BatchError, Result};
use std::sync::Arc;

/// Upper bound on values a single range may expand to.
const MAX_RANGE_VALUES: f64 = 1.0e9;

/// Decimal places kept when rounding range values.
const MAX_RANGE_DECIMALS: usize = 12;

/// The Cartesian product of all parameter domains, in declared order.
///
/// Enumeration is odometer-style: the last declared parameter varies fastest,
/// so ordinal `i` is the mixed-radix number whose digits index each axis.
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    names: Arc<[String]>,
    axes: Vec<Vec<ParameterValue>>,
    len: u64,
}

impl ParameterSpace {
    pub fn build(definitions: &[ParameterDefinition]) -> Result<Self> {
        Self::build_with_limit(definitions, u64::MAX)
    }

    /// Counts every axis from its declaration first and only expands the
    /// domains once the product is known to be at most `limit`.
    pub fn build_with_limit(definitions: &[ParameterDefinition], limit: u64) -> Result<Self> {
        let mut len: u64 = 1;
        for def in definitions {
            len = len.checked_mul(domain_len(def)?).ok_or_else(|| {
                BatchError::config(
                    "parameters",
                    "Combination count overflows; the parameter space is not finite in practice",
                )
            })?;
        }
        if len > limit {
            return Err(BatchError::config(
                "batch_filtering.max_space_size",
                format!(
                    "Parameter space has {} combinations, above the limit of {}",
                    len, limit
                ),
            ));
        }

        let axes = definitions
            .iter()
            .map(expand_domain)
            .collect::<Result<Vec<_>>>()?;

        let names: Arc<[String]> = definitions
            .iter()
            .map(|d| d.name.clone())
            .collect::<Vec<_>>()
            .into();

        tracing::debug!(
            "Built parameter space over {} parameters ({} combinations)",
            names.len(),
            len
        );

        Ok(Self { names, axes, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    /// Always false: an empty parameter set still yields one combination.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn axis(&self, index: usize) -> Option<&[ParameterValue]> {
        self.axes.get(index).map(Vec::as_slice)
    }

    /// Restartable: every call enumerates from ordinal 0.
    pub fn iter(&self) -> Combinations<'_> {
        Combinations {
            space: self,
            next: 0,
            digits: vec![0; self.axes.len()],
        }
    }

    pub fn combination_at(&self, ordinal: u64) -> Option<ParameterCombination> {
        if ordinal >= self.len {
            return None;
        }
        let mut remainder = ordinal;
        let mut digits = vec![0usize; self.axes.len()];
        for (idx, axis) in self.axes.iter().enumerate().rev() {
            let radix = axis.len() as u64;
            digits[idx] = (remainder % radix) as usize;
            remainder /= radix;
        }
        Some(self.assemble(ordinal, &digits))
    }

    fn assemble(&self, ordinal: u64, digits: &[usize]) -> ParameterCombination {
        let values = self
            .axes
            .iter()
            .zip(digits)
            .map(|(axis, &d)| axis[d].clone())
            .collect();
        ParameterCombination::new(ordinal, Arc::clone(&self.names), values)
    }
}

impl<'a> IntoIterator for &'a ParameterSpace {
    type Item = ParameterCombination;
    type IntoIter = Combinations<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Combinations<'a> {
    space: &'a ParameterSpace,
    next: u64,
    digits: Vec<usize>,
}

impl Iterator for Combinations<'_> {
    type Item = ParameterCombination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.space.len {
            return None;
        }
        let combination = self.space.assemble(self.next, &self.digits);
        self.next += 1;

        for (idx, axis) in self.space.axes.iter().enumerate().rev() {
            self.digits[idx] += 1;
            if self.digits[idx] < axis.len() {
                break;
            }
            self.digits[idx] = 0;
        }

        Some(combination)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.space.len - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Combinations<'_> {}

fn domain_len(def: &ParameterDefinition) -> Result<u64> {
    match &def.domain {
        ParameterDomain::Values(values) => {
            if values.is_empty() {
                return Err(BatchError::config(
                    format!("parameters.{}", def.name),
                    "Value list is empty",
                ));
            }
            Ok(values.len() as u64)
        }
        ParameterDomain::Range { min, max, step } => range_len(&def.name, *min, *max, *step),
    }
}

/// Callers count the domain with `domain_len` first.
fn expand_domain(def: &ParameterDefinition) -> Result<Vec<ParameterValue>> {
    match &def.domain {
        ParameterDomain::Values(values) => Ok(values.clone()),
        ParameterDomain::Range { min, max, step } => expand_range(&def.name, *min, *max, *step),
    }
}

/// Number of values `min..=max` by `step` enumerates, without expanding it.
pub fn range_len(name: &str, min: f64, max: f64, step: f64) -> Result<u64> {
    let field = format!("parameters.{}", name);

    if !min.is_finite() || !max.is_finite() || !step.is_finite() {
        return Err(BatchError::config(field, "Range bounds and step must be finite"));
    }
    if step == 0.0 {
        return Err(BatchError::config(field, "Range step must be non-zero"));
    }

    let span = max - min;
    if span != 0.0 && span.signum() != step.signum() {
        return Err(BatchError::config(
            field,
            format!(
                "Range step {} moves away from max {} (min {}); it enumerates zero values",
                step, max, min
            ),
        ));
    }

    let steps = span / step;
    if !steps.is_finite() || steps > MAX_RANGE_VALUES {
        return Err(BatchError::config(
            field,
            format!("Range min {} max {} step {} enumerates too many values", min, max, step),
        ));
    }

    // Tolerate representation error so `0..=1 step 0.1` includes 1.0.
    Ok((steps + 1e-9 * steps.abs().max(1.0)).floor() as u64 + 1)
}

pub fn expand_range(name: &str, min: f64, max: f64, step: f64) -> Result<Vec<ParameterValue>> {
    let count = range_len(name, min, max, step)?;
    let decimals = decimal_places(min).max(decimal_places(step));

    Ok((0..count)
        .map(|k| ParameterValue::Number(round_to(min + k as f64 * step, decimals)))
        .collect())
}

fn decimal_places(value: f64) -> usize {
    let repr = value.to_string();
    if repr.contains('e') {
        return MAX_RANGE_DECIMALS;
    }
    repr.split_once('.')
        .map(|(_, frac)| frac.len().min(MAX_RANGE_DECIMALS))
        .unwrap_or(0)
}

fn round_to(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[ParameterValue]) -> Vec<f64> {
        values.iter().filter_map(ParameterValue::as_f64).collect()
    }

    #[test]
    fn test_limit_is_checked_before_ranges_expand() {
        let defs = vec![
            ParameterDefinition::range("x", 0.0, 2.0e7, 1.0),
            ParameterDefinition::values("mode", ["a", "b"]),
        ];
        assert_eq!(range_len("x", 0.0, 2.0e7, 1.0).unwrap(), 20_000_001);

        let err = ParameterSpace::build_with_limit(&defs, 10).unwrap_err();
        assert!(err.to_string().contains("max_space_size"));
        assert!(err.to_string().contains("40000002"));

        let small = vec![ParameterDefinition::range("x", 0.0, 4.0, 1.0)];
        assert_eq!(ParameterSpace::build_with_limit(&small, 5).unwrap().len(), 5);
        assert!(ParameterSpace::build_with_limit(&small, 4).is_err());
    }

    #[test]
    fn test_count_is_product_of_domain_sizes() {
        let defs = vec![
            ParameterDefinition::values("a", [1.0, 2.0, 3.0]),
            ParameterDefinition::values("b", ["x", "y"]),
            ParameterDefinition::range("c", 0.0, 1.0, 0.25),
        ];
        let space = ParameterSpace::build(&defs).unwrap();
        assert_eq!(space.len(), 3 * 2 * 5);
        assert_eq!(space.iter().count(), 30);
    }

    #[test]
    fn test_enumeration_order_last_parameter_fastest() {
        let defs = vec![
            ParameterDefinition::values("a", [1.0, 2.0]),
            ParameterDefinition::values("b", [10.0, 20.0, 30.0]),
        ];
        let space = ParameterSpace::build(&defs).unwrap();
        let pairs: Vec<(f64, f64)> = space
            .iter()
            .map(|c| {
                (
                    c.get("a").and_then(ParameterValue::as_f64).unwrap(),
                    c.get("b").and_then(ParameterValue::as_f64).unwrap(),
                )
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                (1.0, 10.0),
                (1.0, 20.0),
                (1.0, 30.0),
                (2.0, 10.0),
                (2.0, 20.0),
                (2.0, 30.0)
            ]
        );
        let ordinals: Vec<u64> = space.iter().map(|c| c.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_iteration_is_restartable_and_matches_random_access() {
        let defs = vec![
            ParameterDefinition::values("a", [1.0, 2.0, 3.0]),
            ParameterDefinition::values("b", [true, false]),
        ];
        let space = ParameterSpace::build(&defs).unwrap();
        let first: Vec<_> = space.iter().collect();
        let second: Vec<_> = space.iter().collect();
        assert_eq!(first, second);
        for combo in &first {
            assert_eq!(space.combination_at(combo.ordinal()).as_ref(), Some(combo));
        }
        assert!(space.combination_at(6).is_none());
    }

    #[test]
    fn test_empty_parameter_set_yields_single_empty_combination() {
        let space = ParameterSpace::build(&[]).unwrap();
        let combos: Vec<_> = space.iter().collect();
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
    }

    #[test]
    fn test_duplicate_values_are_preserved() {
        let defs = vec![ParameterDefinition::values("a", [1.0, 1.0, 2.0])];
        let space = ParameterSpace::build(&defs).unwrap();
        assert_eq!(space.len(), 3);
    }

    #[test]
    fn test_range_expansion_is_clean() {
        let values = expand_range("x", 0.0, 1.0, 0.1).unwrap();
        assert_eq!(values.len(), 11);
        assert_eq!(numbers(&values)[3], 0.3);
        assert_eq!(numbers(&values)[10], 1.0);

        let values = expand_range("x", 5.0, 1.0, -2.0).unwrap();
        assert_eq!(numbers(&values), vec![5.0, 3.0, 1.0]);

        let values = expand_range("x", 2.0, 2.0, 0.5).unwrap();
        assert_eq!(numbers(&values), vec![2.0]);
    }

    #[test]
    fn test_degenerate_ranges_are_configuration_errors() {
        assert!(matches!(
            expand_range("x", 0.0, 1.0, 0.0),
            Err(BatchError::ConfigurationError { .. })
        ));
        assert!(matches!(
            expand_range("x", 0.0, 1.0, -0.1),
            Err(BatchError::ConfigurationError { .. })
        ));
        assert!(matches!(
            expand_range("x", 0.0, f64::INFINITY, 1.0),
            Err(BatchError::ConfigurationError { .. })
        ));
        assert!(expand_range("x", 0.0, 1.0e12, 1.0e-3).is_err());
    }

    #[test]
    fn test_empty_value_list_is_rejected() {
        let defs = vec![ParameterDefinition::values::<Vec<f64>, f64>("a", vec![])];
        let err = ParameterSpace::build(&defs).unwrap_err();
        assert!(err.to_string().contains("parameters.a"));
    }
}
