fn fold(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let substitution = diagonal + usize::from(ca != cb);
            row[j + 1] = substitution.min(above + 1).min(row[j] + 1);
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Returns up to `limit` candidates that look like typos of `input`,
/// closest first.
pub fn suggest<S: AsRef<str>>(input: &str, candidates: &[S], limit: usize) -> Vec<String> {
    let needle: Vec<char> = fold(input).chars().collect();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }
    let budget = (needle.len() / 3).max(1);

    let mut ranked: Vec<(usize, &str)> = candidates
        .iter()
        .map(|candidate| candidate.as_ref())
        .filter_map(|candidate| {
            let folded: Vec<char> = fold(candidate).chars().collect();
            if folded.is_empty() {
                return None;
            }
            let distance = if folded == needle {
                0
            } else if contains(&folded, &needle) || contains(&needle, &folded) {
                1
            } else {
                edit_distance(&needle, &folded)
            };
            (distance <= budget).then_some((distance, candidate))
        })
        .collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    ranked.dedup_by(|a, b| a.1 == b.1);
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

fn contains(haystack: &[char], needle: &[char]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}
