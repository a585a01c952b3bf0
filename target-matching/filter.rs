use target_core::{Correspondence, KnnCorrespondence};

/// Lowe's ratio test: keep the best match when it is clearly better than the runner-up.
///
/// A query without a second neighbour cannot be disambiguated and is dropped.
pub fn lowe_ratio(matches: &[KnnCorrespondence], ratio: f32) -> Vec<Correspondence> {
    matches
        .iter()
        .filter_map(|m| {
            let second = m.second_distance?;
            (m.best.distance < ratio * second).then_some(m.best)
        })
        .collect()
}

/// Keep the best `floor(n * keep_fraction)` matches by ascending distance; equal distances keep production order
pub fn score_percent(mut matches: Vec<Correspondence>, keep_fraction: f32) -> Vec<Correspondence> {
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    let keep = (matches.len() as f64 * keep_fraction as f64).floor() as usize;
    matches.truncate(keep);
    matches
}
