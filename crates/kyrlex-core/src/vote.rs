use std::collections::HashMap;
use std::hash::Hash;

/// Pick the answer produced most often.
///
/// When no answer occurs more than once the first one wins, and among equally
/// frequent answers the one seen first wins. Returns `None` for an empty slice.
pub fn majority_vote<T: Eq + Hash + Clone>(answers: &[T]) -> Option<T> {
    let first = answers.first()?;

    let mut counts: HashMap<&T, usize> = HashMap::new();
    for answer in answers {
        *counts.entry(answer).or_insert(0) += 1;
    }

    let mut best = first;
    let mut best_count = 1;
    for answer in answers {
        let count = counts[answer];
        if count > best_count {
            best = answer;
            best_count = count;
        }
    }

    Some(best.clone())
}
