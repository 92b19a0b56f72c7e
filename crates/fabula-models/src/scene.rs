//! Scene segments produced by the narrative segmenter.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One scene of a story: a contiguous slice of the prompt text that
/// gets its own illustration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// 1-based position within the story
    pub index: usize,
    /// The scene's text, trimmed
    pub text: String,
}

impl Scene {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Image-generation prompt for this scene: a capped excerpt of the
    /// scene text with a fixed style suffix.
    pub fn image_prompt(&self) -> String {
        const EXCERPT_LEN: usize = 100;
        const STYLE_SUFFIX: &str = ", digital art, highly detailed, cinematic lighting, 4k quality";

        let excerpt: String = self.text.chars().take(EXCERPT_LEN).collect();
        format!("{}{}", excerpt.trim(), STYLE_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_prompt_appends_style_suffix() {
        let scene = Scene::new(1, "A fox crosses a frozen river.");
        let prompt = scene.image_prompt();
        assert!(prompt.starts_with("A fox crosses a frozen river."));
        assert!(prompt.ends_with("4k quality"));
    }

    #[test]
    fn test_image_prompt_caps_excerpt_at_100_chars() {
        let long_text = "x".repeat(250);
        let scene = Scene::new(2, long_text);
        let prompt = scene.image_prompt();
        assert!(prompt.starts_with(&"x".repeat(100)));
        assert!(!prompt.contains(&"x".repeat(101)));
        assert!(prompt.ends_with(", digital art, highly detailed, cinematic lighting, 4k quality"));
    }

    #[test]
    fn test_image_prompt_excerpt_trimmed_after_cut() {
        // cut landing on a word boundary must not leave a space before
        // the style suffix's comma
        let text = format!("{} {}", "a".repeat(99), "b".repeat(50));
        let scene = Scene::new(1, text);
        let prompt = scene.image_prompt();
        assert!(prompt.starts_with(&format!("{},", "a".repeat(99))));
        assert!(!prompt.contains(" ,"));
    }

    #[test]
    fn test_image_prompt_excerpt_counts_chars_not_bytes() {
        // multi-byte chars must not split
        let scene = Scene::new(1, "é".repeat(120));
        let prompt = scene.image_prompt();
        assert!(prompt.starts_with(&"é".repeat(100)));
    }
}
