//! Scene segmentation.
//!
//! Splits prompt text into at most `max_scenes` ordered scenes. Blank
//! lines win over sentence boundaries: a prompt written as paragraphs
//! becomes one scene per paragraph when that fits the budget.

use fabula_models::Scene;

/// Split prompt text into 1-based scenes.
///
/// Paragraph boundaries (blank lines) are tried first; if the
/// paragraph count does not fit the budget, the text is re-split on
/// sentence terminators and the sentences are bucketed into exactly
/// `max_scenes` groups, with the remainder folded into the last group.
pub fn split_into_scenes(text: &str, max_scenes: usize) -> Vec<Scene> {
    if max_scenes == 0 {
        return Vec::new();
    }

    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.len() >= 2 && paragraphs.len() <= max_scenes {
        return to_scenes(paragraphs.into_iter().map(String::from).collect());
    }

    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return Vec::new();
    }

    if sentences.len() <= max_scenes {
        return to_scenes(sentences);
    }

    // Bucket sentences evenly; the last bucket absorbs the remainder so
    // no trailing text is dropped.
    let per_bucket = sentences.len() / max_scenes;
    let mut grouped = Vec::with_capacity(max_scenes);
    for bucket in 0..max_scenes {
        let start = bucket * per_bucket;
        let end = if bucket == max_scenes - 1 {
            sentences.len()
        } else {
            start + per_bucket
        };
        grouped.push(sentences[start..end].join(" "));
    }

    to_scenes(grouped)
}

/// Split text at whitespace runs that follow a sentence terminator.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.trim().chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

fn to_scenes(texts: Vec<String>) -> Vec<Scene> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Scene::new(i + 1, text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(scenes: &[Scene]) -> Vec<&str> {
        scenes.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_paragraphs_win_when_they_fit() {
        let scenes = split_into_scenes("First paragraph.\n\nSecond paragraph.", 5);
        assert_eq!(texts(&scenes), vec!["First paragraph.", "Second paragraph."]);
    }

    #[test]
    fn test_single_paragraph_falls_back_to_sentences() {
        let scenes = split_into_scenes("One. Two! Three?", 5);
        assert_eq!(texts(&scenes), vec!["One.", "Two!", "Three?"]);
    }

    #[test]
    fn test_too_many_sentences_are_bucketed() {
        let scenes = split_into_scenes("A. B. C. D. E. F.", 3);
        assert_eq!(texts(&scenes), vec!["A. B.", "C. D.", "E. F."]);
    }

    #[test]
    fn test_remainder_goes_to_last_bucket() {
        // 7 sentences over 3 buckets: 2 + 2 + 3
        let scenes = split_into_scenes("A. B. C. D. E. F. G.", 3);
        assert_eq!(texts(&scenes), vec!["A. B.", "C. D.", "E. F. G."]);
    }

    #[test]
    fn test_too_many_paragraphs_use_sentence_path() {
        let text = "One.\n\nTwo.\n\nThree.\n\nFour.";
        let scenes = split_into_scenes(text, 3);
        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes.last().map(|s| s.text.as_str()), Some("Three. Four."));
    }

    #[test]
    fn test_indices_are_one_based_and_ordered() {
        let scenes = split_into_scenes("A. B. C.", 5);
        let indices: Vec<usize> = scenes.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_decimal_points_do_not_split() {
        let scenes = split_into_scenes("Version 2.5 shipped. Everyone cheered.", 5);
        assert_eq!(
            texts(&scenes),
            vec!["Version 2.5 shipped.", "Everyone cheered."]
        );
    }

    #[test]
    fn test_scene_count_never_exceeds_budget() {
        let long = "Sentence. ".repeat(37);
        let scenes = split_into_scenes(&long, 5);
        assert_eq!(scenes.len(), 5);
        assert!(scenes.iter().all(|s| !s.text.trim().is_empty()));
    }

    #[test]
    fn test_empty_input_yields_no_scenes() {
        assert!(split_into_scenes("", 5).is_empty());
        assert!(split_into_scenes("   \n\n  ", 5).is_empty());
        assert!(split_into_scenes("Something.", 0).is_empty());
    }
}
