use anyhow::Result;
use tokio::task::JoinHandle;

use crate::answer;
use crate::config::Config;
use crate::corpus::DocumentCache;
use crate::gemini::{GeminiClient, GeminiError};
use crate::transcript::Transcript;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Shown when the single rate-limit retry also failed.
const BUSY_MESSAGE: &str = "The assistant is busy right now. Please try again in a moment.";

/// Application context: session state plus the credentialed client and the
/// memoized document cache. No ambient globals.
pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub show_docs_panel: bool,

    // Conversation state
    pub transcript: Transcript,
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Chat viewport (updated during render for scroll calculations)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // In-flight answer
    pub loading: bool,
    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub answer_task: Option<JoinHandle<Result<String, GeminiError>>>,

    // Remote side
    pub client: GeminiClient,
    pub model: String,
    pub cache: DocumentCache,
}

impl App {
    /// Build the session. Uploads/reconciles the document corpus once, so
    /// this runs before the first frame is drawn.
    pub async fn new(config: &Config, api_key: &str) -> Result<Self> {
        let client = GeminiClient::new(api_key);

        let mut cache = DocumentCache::new();
        cache.build(&client, &config.docs_dir()).await;

        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            show_docs_panel: true,

            transcript: Transcript::new(),
            input: String::new(),
            cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            loading: false,
            animation_frame: 0,
            answer_task: None,

            client,
            model: config.model(),
            cache,
        })
    }

    pub fn question_answering_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    /// Submit the current input as a question: append the user turn and
    /// spawn the answer task. Refused while a turn is already in flight or
    /// when no documents are loaded.
    pub fn submit_question(&mut self) {
        let question = self.input.trim().to_string();
        if question.is_empty()
            || self.answer_task.is_some()
            || self.loading
            || !self.question_answering_enabled()
        {
            return;
        }

        self.transcript.push_user(question.clone());
        self.input.clear();
        self.cursor = 0;
        self.loading = true;
        self.scroll_chat_to_bottom();

        let client = self.client.clone();
        let model = self.model.clone();
        let handles = self.cache.handles().to_vec();
        self.answer_task = Some(tokio::spawn(async move {
            answer::answer(&client, &model, &handles, &question).await
        }));
    }

    /// Collect a finished answer task, converting any failure into a
    /// user-visible assistant turn. Called on every tick; a no-op while the
    /// task is still running.
    pub async fn poll_answer(&mut self) {
        let finished = self
            .answer_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(task) = self.answer_task.take() {
            let text = match task.await {
                Ok(Ok(text)) => text,
                Ok(Err(err)) => failure_text(&err),
                Err(join_err) => format!("An error occurred: {}", join_err),
            };
            self.transcript.push_assistant(text);
            self.loading = false;
            self.scroll_chat_to_bottom();
        }
    }

    /// Clear the transcript. The document cache and credential stay valid
    /// for the next question. Idempotent.
    pub fn reset_conversation(&mut self) {
        if let Some(task) = self.answer_task.take() {
            task.abort();
        }
        self.transcript.reset();
        self.loading = false;
        self.chat_scroll = 0;
        self.input.clear();
        self.cursor = 0;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    /// Scroll so the newest turn (or the thinking indicator) is visible.
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for turn in self.transcript.turns() {
            total_lines += 1; // Role line ("You:" or "Navigator:")
            for line in turn.text.lines() {
                // Character count, not byte length, for UTF-8 content
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // Blank line after each turn
        }

        // Room for the "Analyzing policy documents..." indicator
        total_lines += 2;

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        }
    }
}

fn failure_text(err: &GeminiError) -> String {
    if err.is_rate_limit() {
        BUSY_MESSAGE.to_string()
    } else {
        format!("An error occurred: {}", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::RemoteFile;
    use std::time::Duration;

    fn test_handle() -> RemoteFile {
        RemoteFile {
            name: "files/a1".to_string(),
            display_name: "a.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            uri: "u://a1".to_string(),
        }
    }

    /// App wired to an unreachable endpoint so spawned tasks fail fast
    /// instead of touching the network.
    fn test_app(handles: Vec<RemoteFile>) -> App {
        App {
            should_quit: false,
            input_mode: InputMode::Normal,
            show_docs_panel: true,
            transcript: Transcript::new(),
            input: String::new(),
            cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            loading: false,
            animation_frame: 0,
            answer_task: None,
            client: GeminiClient::with_base_url("test-key", "http://127.0.0.1:1"),
            model: "test-model".to_string(),
            cache: DocumentCache::with_handles(handles),
        }
    }

    #[test]
    fn submit_is_refused_without_documents() {
        let mut app = test_app(Vec::new());
        app.input = "Am I eligible?".to_string();

        app.submit_question();

        assert!(app.transcript.is_empty());
        assert!(app.answer_task.is_none());
        assert!(!app.loading);
    }

    #[tokio::test]
    async fn submit_is_refused_while_a_turn_is_in_flight() {
        let mut app = test_app(vec![test_handle()]);
        app.loading = true;
        app.input = "second question".to_string();

        app.submit_question();

        assert!(app.transcript.is_empty());
        assert_eq!(app.input, "second question");
    }

    #[tokio::test]
    async fn failed_turn_records_error_and_keeps_prior_turns() {
        let mut app = test_app(vec![test_handle()]);
        app.transcript.push_user("earlier question");
        app.transcript.push_assistant("earlier answer");
        app.input = "Am I eligible if I checked box 3?".to_string();

        app.submit_question();
        assert!(app.loading);
        assert_eq!(app.transcript.len(), 3);
        assert!(app.input.is_empty());

        // The unreachable endpoint fails the task almost immediately.
        tokio::time::timeout(Duration::from_secs(10), async {
            while app.answer_task.is_some() {
                app.poll_answer().await;
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("answer task should finish");

        assert!(!app.loading);
        let turns = app.transcript.turns();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].text, "earlier question");
        assert_eq!(turns[1].text, "earlier answer");
        assert_eq!(turns[2].text, "Am I eligible if I checked box 3?");
        assert!(turns[3].text.starts_with("An error occurred:"));
    }

    #[test]
    fn reset_clears_session_but_keeps_cache() {
        let mut app = test_app(vec![test_handle()]);
        app.transcript.push_user("q");
        app.transcript.push_assistant("a");
        app.chat_scroll = 12;
        app.input = "half-typed".to_string();
        app.cursor = 4;

        app.reset_conversation();

        assert!(app.transcript.is_empty());
        assert_eq!(app.chat_scroll, 0);
        assert!(app.input.is_empty());
        assert!(app.question_answering_enabled());

        // Idempotent
        app.reset_conversation();
        assert!(app.transcript.is_empty());
    }

    #[test]
    fn rate_limit_failure_renders_as_busy_message() {
        assert_eq!(failure_text(&GeminiError::RateLimited), BUSY_MESSAGE);
        assert!(
            failure_text(&GeminiError::Generation("400: bad".to_string()))
                .contains("400: bad")
        );
    }

    #[test]
    fn animation_advances_only_while_loading() {
        let mut app = test_app(Vec::new());
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        app.loading = true;
        app.tick_animation();
        app.tick_animation();
        assert_eq!(app.animation_frame, 2);
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
    }
}
