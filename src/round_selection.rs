//! Representative round selection
//!
//! Each step is measured over several rounds. The round whose scalar (total
//! retired instructions in the step) is closest to the trimmed mean of all
//! rounds is treated as canonical; only that round is fully attributed.

use serde::{Deserialize, Serialize};

/// Scalar summary of one usable round for one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCandidate {
    pub round_index: usize,
    pub scalar: u64,
}

/// Index of the value closest to the trimmed mean
///
/// With fewer than three values, or when all values are equal, this is 0.
/// Otherwise the first occurrence of the maximum and of the minimum are
/// excluded, and ties on distance go to the lowest index.
///
/// # Example
/// ```
/// use loadscope::round_selection::select_round;
///
/// assert_eq!(select_round(&[100, 130, 300]), 1);
/// assert_eq!(select_round(&[5, 100, 6, 7]), 2);
/// assert_eq!(select_round(&[1, 2]), 0);
/// ```
pub fn select_round(values: &[u64]) -> usize {
    if values.len() < 3 {
        return 0;
    }

    let mut max_index = 0;
    let mut min_index = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[max_index] {
            max_index = i;
        }
        if v < values[min_index] {
            min_index = i;
        }
    }
    if values[max_index] == values[min_index] {
        return 0;
    }

    // compare |v - trimmed_sum / kept| as |v * kept - trimmed_sum| to stay exact
    let total: u128 = values.iter().map(|&v| u128::from(v)).sum();
    let trimmed_sum = total - u128::from(values[max_index]) - u128::from(values[min_index]);
    let kept = (values.len() - 2) as u128;

    values
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != max_index && i != min_index)
        .map(|(i, &v)| (i, (u128::from(v) * kept).abs_diff(trimmed_sum)))
        .min_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
        .map_or(0, |(i, _)| i)
}

/// Representative candidate, `None` when there are no usable rounds
pub fn select_candidate(candidates: &[RoundCandidate]) -> Option<RoundCandidate> {
    if candidates.is_empty() {
        return None;
    }
    let scalars: Vec<u64> = candidates.iter().map(|c| c.scalar).collect();
    candidates.get(select_round(&scalars)).copied()
}
