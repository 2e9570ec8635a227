//! Chapter splitting.

/// Split generated text into exactly `count` chapters at `marker`.
///
/// Segments are trimmed and empty ones dropped. Too few segments are padded
/// with empty chapters; surplus segments are joined with a single space into
/// the last chapter. A `count` of zero is treated as one.
pub fn split_into_chapters(text: &str, marker: &str, count: usize) -> Vec<String> {
    let count = count.max(1);

    let segments: Vec<&str> = if marker.is_empty() {
        vec![text.trim()]
    } else {
        text.split(marker).map(str::trim).collect()
    };
    let mut chapters: Vec<String> = segments
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();

    if chapters.len() > count {
        let tail = chapters.split_off(count - 1).join(" ");
        chapters.push(tail);
    }
    chapters.resize(count, String::new());
    chapters
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "<break>";

    #[test]
    fn exact_count_is_kept() {
        let chapters = split_into_chapters("one <break> two <break> three", MARKER, 3);
        assert_eq!(chapters, vec!["one", "two", "three"]);
    }

    #[test]
    fn single_marker_pads_third_chapter() {
        let chapters = split_into_chapters("Settle in.<break>Relax deeper.", MARKER, 3);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0], "Settle in.");
        assert_eq!(chapters[1], "Relax deeper.");
        assert_eq!(chapters[2], "");
    }

    #[test]
    fn surplus_segments_merge_into_last() {
        let chapters = split_into_chapters("a<break>b<break>c<break>d<break>e", MARKER, 3);
        assert_eq!(chapters, vec!["a", "b", "c d e"]);
    }

    #[test]
    fn empty_segments_are_discarded_before_counting() {
        let chapters = split_into_chapters("<break> a <break><break>  <break> b <break>", MARKER, 3);
        assert_eq!(chapters, vec!["a", "b", ""]);
    }

    #[test]
    fn empty_text_yields_empty_chapters() {
        let chapters = split_into_chapters("", MARKER, 3);
        assert_eq!(chapters, vec!["", "", ""]);
    }

    #[test]
    fn zero_count_behaves_like_one() {
        let chapters = split_into_chapters("a<break>b", MARKER, 0);
        assert_eq!(chapters, vec!["a b"]);
    }

    #[test]
    fn empty_marker_keeps_whole_text() {
        let chapters = split_into_chapters(" all of it ", "", 2);
        assert_eq!(chapters, vec!["all of it", ""]);
    }

    #[test]
    fn count_invariant_holds_for_all_shapes() {
        for k in 1..=6 {
            for n in 0..=9 {
                let segments: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
                let text = segments.join(MARKER);

                let chapters = split_into_chapters(&text, MARKER, k);
                assert_eq!(chapters.len(), k, "k={k} n={n}");

                if n > k {
                    // First k-1 verbatim, rest joined into the last.
                    assert_eq!(chapters[..k - 1], segments[..k - 1]);
                    assert_eq!(chapters[k - 1], segments[k - 1..].join(" "));
                } else {
                    assert_eq!(chapters[..n], segments[..]);
                    assert!(chapters[n..].iter().all(String::is_empty), "k={k} n={n}");
                }
            }
        }
    }
}
