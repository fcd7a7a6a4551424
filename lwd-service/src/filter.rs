//! The prefix filter (spec.md §4.6): decides which mempool txids a client
//! already knows about from a sorted list of possibly-shortened prefixes.

/// Returns the subset of `txids` to send: a txid is dropped iff exactly one
/// entry in `exclude` is a prefix of it. If an exclude-prefix matches two or
/// more txids, the server can't tell which one the client meant, so all of
/// them pass through. Both inputs must be sorted ascending; the sweep makes
/// one pass over each.
pub fn apply<'a>(txids: &'a [Vec<u8>], exclude: &[Vec<u8>]) -> Vec<&'a Vec<u8>> {
    let mut kept = Vec::with_capacity(txids.len());
    let mut ti = 0usize;
    let mut ei = 0usize;

    while ti < txids.len() {
        while ei < exclude.len()
            && !is_prefix(&exclude[ei], &txids[ti])
            && exclude[ei].as_slice() < txids[ti].as_slice()
        {
            ei += 1;
        }

        if ei < exclude.len() && is_prefix(&exclude[ei], &txids[ti]) {
            let run_start = ti;
            while ti < txids.len() && is_prefix(&exclude[ei], &txids[ti]) {
                ti += 1;
            }
            if ti - run_start > 1 {
                kept.extend(&txids[run_start..ti]);
            }
            ei += 1;
        } else {
            kept.push(&txids[ti]);
            ti += 1;
        }
    }

    kept
}

fn is_prefix(prefix: &[u8], candidate: &[u8]) -> bool {
    candidate.starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(items: &[&[u8]]) -> Vec<Vec<u8>> {
        items.iter().map(|b| b.to_vec()).collect()
    }

    #[test]
    fn no_exclude_keeps_everything() {
        let txids = bytes(&[b"aaaa", b"bbbb", b"cccc"]);
        let kept = apply(&txids, &[]);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn unique_prefix_match_is_excluded() {
        let txids = bytes(&[b"aaaa", b"bbbb", b"cccc"]);
        let exclude = bytes(&[b"bb"]);
        let kept = apply(&txids, &exclude);
        assert_eq!(kept, vec![&txids[0], &txids[2]]);
    }

    #[test]
    fn ambiguous_prefix_is_sent_to_all_matches() {
        let txids = bytes(&[b"aaaa", b"aaab", b"bbbb"]);
        let exclude = bytes(&[b"aa"]);
        let kept = apply(&txids, &exclude);
        // "aa" matches both aaaa and aaab: server can't disambiguate, so
        // both pass through.
        assert_eq!(kept, vec![&txids[0], &txids[1], &txids[2]]);
    }

    #[test]
    fn exact_length_prefix_matches_like_any_other() {
        let txids = bytes(&[b"aaaa", b"bbbb"]);
        let exclude = bytes(&[b"aaaa"]);
        let kept = apply(&txids, &exclude);
        assert_eq!(kept, vec![&txids[1]]);
    }

    #[test]
    fn multiple_exclude_entries_each_handled_independently() {
        let txids = bytes(&[b"aaaa", b"bbbb", b"bbbc", b"cccc"]);
        let exclude = bytes(&[b"aa", b"bb"]);
        let kept = apply(&txids, &exclude);
        // "aa" uniquely matches aaaa -> excluded.
        // "bb" matches both bbbb and bbbc -> ambiguous, both kept.
        assert_eq!(kept, vec![&txids[1], &txids[2], &txids[3]]);
    }

    #[test]
    fn output_is_a_subsequence_of_input() {
        let txids = bytes(&[b"aaaa", b"aaab", b"bbbb", b"cccc", b"cccd"]);
        let exclude = bytes(&[b"bb"]);
        let kept = apply(&txids, &exclude);
        let positions: Vec<usize> = kept
            .iter()
            .map(|k| txids.iter().position(|t| &t == k).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
