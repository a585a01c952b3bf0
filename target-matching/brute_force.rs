use rayon::prelude::*;
use target_core::{BinaryDescriptor, Correspondence};

#[inline]
pub fn hamming_distance(a: &BinaryDescriptor, b: &BinaryDescriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Exact Hamming nearest neighbour of every query; ties go to the lowest train index.
///
/// Returns one correspondence per query, in query order, or nothing when `train` is empty.
pub fn match_hamming(query: &[BinaryDescriptor], train: &[BinaryDescriptor]) -> Vec<Correspondence> {
    if train.is_empty() {
        return Vec::new();
    }

    query
        .par_iter()
        .enumerate()
        .map(|(query_idx, q)| {
            let mut best_distance = u32::MAX;
            let mut best_idx = 0;
            for (train_idx, t) in train.iter().enumerate() {
                let distance = hamming_distance(q, t);
                if distance < best_distance {
                    best_distance = distance;
                    best_idx = train_idx;
                }
            }
            Correspondence {
                query_idx,
                train_idx: best_idx,
                distance: best_distance as f32,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(fill: u8) -> BinaryDescriptor {
        [fill; 32]
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(&descriptor(0), &descriptor(0)), 0);
        assert_eq!(hamming_distance(&descriptor(0), &descriptor(0xff)), 256);
        assert_eq!(hamming_distance(&descriptor(0b1010), &descriptor(0b0110)), 64);
    }

    #[test]
    fn test_nearest_is_found() {
        let train = vec![descriptor(0xff), descriptor(0x0f), descriptor(0x01)];
        let query = vec![descriptor(0x00), descriptor(0x1f)];
        let matches = match_hamming(&query, &train);
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].query_idx, matches[0].train_idx), (0, 2));
        assert_eq!(matches[0].distance, 32.0);
        assert_eq!((matches[1].query_idx, matches[1].train_idx), (1, 1));
    }

    #[test]
    fn test_tie_goes_to_lowest_index() {
        let mut a = descriptor(0);
        a[0] = 0b0000_0001;
        let mut b = descriptor(0);
        b[0] = 0b0000_0010;
        let train = vec![descriptor(0xff), a, b];
        let matches = match_hamming(&[descriptor(0)], &train);
        assert_eq!(matches[0].train_idx, 1);
        assert_eq!(matches[0].distance, 1.0);
    }

    #[test]
    fn test_empty_train() {
        assert!(match_hamming(&[descriptor(0)], &[]).is_empty());
        assert!(match_hamming(&[], &[descriptor(0)]).is_empty());
    }
}
