use crate::domain::model::ParameterCombination;

/// Evenly spaced indices into `0..len`, always including both ends.
///
/// Uses `floor(i * (len - 1) / (target - 1))`, which pins index 0 and
/// `len - 1` and is strictly increasing whenever `target <= len`.
pub fn stride_indices(len: usize, target: usize) -> Vec<usize> {
    if target == 0 || len == 0 {
        return Vec::new();
    }
    if target >= len {
        return (0..len).collect();
    }
    if target == 1 {
        return vec![0];
    }

    let span = (len - 1) as u128;
    let steps = (target - 1) as u128;
    let candidates: Vec<usize> = (0..target as u128)
        .map(|i| (i * span / steps) as usize)
        .collect();
    dedup_forward(candidates, len, target)
}

/// Bumps each repeated index one past the last kept index. Indices that
/// would land at or past `len` are dropped.
fn dedup_forward(candidates: Vec<usize>, len: usize, target: usize) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::with_capacity(target);
    for candidate in candidates {
        let idx = match selected.last() {
            Some(&last) => candidate.max(last + 1),
            None => candidate,
        };
        if idx < len {
            selected.push(idx);
        }
    }

    selected
}

/// Deterministic uniform-stride selection down to a target count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Downselector {
    target: Option<usize>,
}

impl Downselector {
    pub fn new(target: Option<usize>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }

    pub fn apply(&self, combinations: Vec<ParameterCombination>) -> Vec<ParameterCombination> {
        let Some(target) = self.target else {
            return combinations;
        };
        let len = combinations.len();

        if target >= len {
            if target > len {
                tracing::warn!(
                    "Target count {} exceeds {} filtered combinations; keeping all of them",
                    target,
                    len
                );
            }
            return combinations;
        }

        let indices = stride_indices(len, target);
        tracing::info!(
            "Downselected {} of {} combinations by uniform stride",
            indices.len(),
            len
        );

        let mut slots: Vec<Option<ParameterCombination>> =
            combinations.into_iter().map(Some).collect();
        indices
            .into_iter()
            .filter_map(|idx| slots.get_mut(idx).and_then(Option::take))
            .collect()
    }
}
