//! Sorted-list merges behind exact phrase search.

use crate::index::types::{DocId, Position, Posting};

/// Documents present in every posting list, with each list's positions in
/// list order. Every input must be sorted by doc id.
pub fn intersect_postings<'a>(lists: &[&'a [Posting]]) -> Vec<(DocId, Vec<&'a [Position]>)> {
    let mut matches = Vec::new();
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return matches;
    }

    let mut cursors = vec![0usize; lists.len()];
    loop {
        let max_doc = lists
            .iter()
            .zip(&cursors)
            .map(|(list, &c)| list[c].doc_id)
            .max()
            .unwrap_or_default();

        if lists.iter().zip(&cursors).all(|(list, &c)| list[c].doc_id == max_doc) {
            let positions = lists
                .iter()
                .zip(&cursors)
                .map(|(list, &c)| list[c].positions.as_slice())
                .collect();
            matches.push((max_doc, positions));
            for c in cursors.iter_mut() {
                *c += 1;
            }
        } else {
            for (list, c) in lists.iter().zip(cursors.iter_mut()) {
                while *c < list.len() && list[*c].doc_id < max_doc {
                    *c += 1;
                }
            }
        }

        if lists.iter().zip(&cursors).any(|(list, &c)| c >= list.len()) {
            return matches;
        }
    }
}

/// Start positions where the i-th list holds `start + i` for every list.
///
/// Each list must be ascending. Positions are compared after subtracting
/// the list's index in the phrase, so the same term appearing twice in a
/// query lines up correctly.
pub fn find_exact_sequence(lists: &[&[Position]]) -> Vec<Position> {
    let mut starts = Vec::new();
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return starts;
    }

    let aligned = |i: usize, c: usize| lists[i][c] as i64 - i as i64;
    let mut cursors = vec![0usize; lists.len()];
    loop {
        let current: Vec<i64> = cursors.iter().enumerate().map(|(i, &c)| aligned(i, c)).collect();
        let min = current.iter().copied().min().unwrap_or_default();

        if current.iter().all(|&p| p == min) {
            starts.push(lists[0][cursors[0]]);
            for c in cursors.iter_mut() {
                *c += 1;
            }
        } else {
            for (c, &p) in cursors.iter_mut().zip(&current) {
                if p == min {
                    *c += 1;
                }
            }
        }

        if lists.iter().zip(&cursors).any(|(list, &c)| c >= list.len()) {
            return starts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(doc_id: DocId, positions: &[Position]) -> Posting {
        Posting {
            doc_id,
            positions: positions.to_vec(),
        }
    }

    #[test]
    fn test_three_term_phrase_twice_in_doc() {
        let a = [0, 5];
        let b = [1, 6];
        let c = [2, 7];
        assert_eq!(find_exact_sequence(&[&a, &b, &c]), vec![0, 5]);
    }

    #[test]
    fn test_sequence_requires_order() {
        // "y z" in "z y"
        assert!(find_exact_sequence(&[&[1], &[0]]).is_empty());
        assert_eq!(find_exact_sequence(&[&[1], &[2]]), vec![1]);
    }

    #[test]
    fn test_sequence_skips_non_adjacent() {
        let a = [0, 4, 9];
        let b = [2, 5, 7];
        assert_eq!(find_exact_sequence(&[&a, &b]), vec![4]);
    }

    #[test]
    fn test_repeated_term_phrase() {
        // "x x" against "x x x"
        let x = [0, 1, 2];
        assert_eq!(find_exact_sequence(&[&x, &x]), vec![0, 1]);
    }

    #[test]
    fn test_single_list_returns_all() {
        assert_eq!(find_exact_sequence(&[&[3, 8]]), vec![3, 8]);
        assert!(find_exact_sequence(&[&[], &[1]]).is_empty());
    }

    #[test]
    fn test_intersect_postings() {
        let a = vec![posting(1, &[0]), posting(4, &[2]), posting(9, &[1])];
        let b = vec![posting(4, &[3]), posting(5, &[0]), posting(9, &[7])];
        let common = intersect_postings(&[&a, &b]);

        let docs: Vec<_> = common.iter().map(|(d, _)| *d).collect();
        assert_eq!(docs, vec![4, 9]);
        assert_eq!(common[0].1, vec![&[2u32][..], &[3u32][..]]);
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = vec![posting(1, &[0])];
        let b = vec![posting(2, &[0])];
        assert!(intersect_postings(&[&a, &b]).is_empty());
        assert!(intersect_postings(&[&a, &[]]).is_empty());
    }
}
