//! Narration synthesis.
//!
//! A story without narration is still a story: synthesis failures are
//! logged and the run carries on without an audio track.

use std::path::PathBuf;

use fabula_providers::{estimate_duration, SpeechProvider, DEFAULT_WORDS_PER_MINUTE};

use crate::logging::JobLogger;
use crate::workspace::JobWorkspace;

/// Synthesize narration for the full prompt text. Returns `None` when
/// synthesis failed for any reason.
pub async fn synthesize_narration(
    provider: &dyn SpeechProvider,
    text: &str,
    lang: &str,
    workspace: &JobWorkspace,
    logger: &JobLogger,
) -> Option<PathBuf> {
    let estimate = estimate_duration(text, DEFAULT_WORDS_PER_MINUTE);
    logger.log_progress(&format!(
        "Synthesizing narration (~{estimate:.0}s of speech)"
    ));

    match provider
        .synthesize(text, lang, &workspace.narration_path())
        .await
    {
        Ok(path) => Some(path),
        Err(e) => {
            logger.log_warning(&format!("Narration synthesis failed, continuing without audio: {e}"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fabula_providers::ProviderError;
    use std::path::Path;

    struct StubSpeech {
        fail: bool,
    }

    #[async_trait]
    impl SpeechProvider for StubSpeech {
        async fn synthesize(
            &self,
            _text: &str,
            _lang: &str,
            output_path: &Path,
        ) -> fabula_providers::ProviderResult<PathBuf> {
            if self.fail {
                Err(ProviderError::transient("tts down"))
            } else {
                Ok(output_path.to_path_buf())
            }
        }
    }

    fn workspace() -> (tempfile::TempDir, JobWorkspace) {
        let base = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(base.path().to_str().unwrap(), "s", "j").unwrap();
        (base, ws)
    }

    #[tokio::test]
    async fn test_success_returns_narration_path() {
        let (_base, ws) = workspace();
        let logger = JobLogger::new("j", "narration");

        let path = synthesize_narration(&StubSpeech { fail: false }, "Hello.", "en", &ws, &logger)
            .await;

        assert_eq!(path, Some(ws.narration_path()));
    }

    #[tokio::test]
    async fn test_failure_degrades_to_none() {
        let (_base, ws) = workspace();
        let logger = JobLogger::new("j", "narration");

        let path = synthesize_narration(&StubSpeech { fail: true }, "Hello.", "en", &ws, &logger)
            .await;

        assert!(path.is_none());
    }
}
