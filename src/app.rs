use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::config::Config;
use crate::ollama::OllamaClient;
use crate::transcript::Transcript;
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// One event out of an in-flight generation, tagged with the conversation it
/// belongs to so late events for closed tabs can be dropped.
#[derive(Debug)]
pub struct StreamEvent {
    pub conversation: u64,
    pub payload: StreamPayload,
}

#[derive(Debug)]
pub enum StreamPayload {
    Fragment(String),
    Done,
    Failed(String),
}

/// One tab: an independent chat session with its own transcript and input.
pub struct Conversation {
    pub id: u64,
    pub title: String,
    pub transcript: Transcript,
    pub input: String,
    pub cursor: usize,
    pub scroll: u16,
    /// When set, the view follows the bottom of the transcript.
    pub follow: bool,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Conversation {
    fn new(id: u64) -> Self {
        Self {
            id,
            title: format!("Chat {}", id),
            transcript: Transcript::new(),
            input: String::new(),
            cursor: 0,
            scroll: 0,
            follow: true,
            task: None,
        }
    }
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub fullscreen: bool,

    // Tabs
    pub conversations: Vec<Conversation>,
    pub active: usize,
    next_id: u64,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Backend
    pub ollama: OllamaClient,
    pub selected_model: String,

    events_tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(ollama: OllamaClient, model: String, events_tx: UnboundedSender<AppEvent>) -> Self {
        let mut app = Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            fullscreen: false,

            conversations: Vec::new(),
            active: 0,
            next_id: 1,

            animation_frame: 0,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            ollama,
            selected_model: model,

            events_tx,
        };
        app.new_conversation();
        app
    }

    // Tab management

    pub fn new_conversation(&mut self) {
        let id = self.next_id;
        self.next_id += 1;
        self.conversations.push(Conversation::new(id));
        self.active = self.conversations.len() - 1;
    }

    /// Close the active tab, aborting any in-flight generation. The window
    /// always keeps at least one tab.
    pub fn close_active(&mut self) {
        let removed = self.conversations.remove(self.active);
        if let Some(task) = removed.task {
            task.abort();
        }
        debug!(id = removed.id, "closed conversation");

        if self.conversations.is_empty() {
            self.new_conversation();
        } else if self.active >= self.conversations.len() {
            self.active = self.conversations.len() - 1;
        }
    }

    pub fn next_tab(&mut self) {
        self.active = (self.active + 1) % self.conversations.len();
    }

    pub fn prev_tab(&mut self) {
        let len = self.conversations.len();
        self.active = (self.active + len - 1) % len;
    }

    pub fn active_conversation(&self) -> &Conversation {
        &self.conversations[self.active]
    }

    pub fn active_conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversations[self.active]
    }

    pub fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversations.iter().any(|c| c.transcript.is_streaming()) {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Streaming

    /// Send the active tab's input line: append it as one user entry, open
    /// the reply, and spawn a task that drains the fragment stream into the
    /// event channel. The prompt is the input line alone; the transcript is
    /// presentation state, not history.
    pub fn send_message(&mut self) {
        let model = self.selected_model.clone();
        let ollama = self.ollama.clone();
        let tx = self.events_tx.clone();

        let conv = self.active_conversation_mut();
        if conv.input.is_empty() || conv.transcript.is_streaming() {
            return;
        }

        let prompt = std::mem::take(&mut conv.input);
        conv.cursor = 0;
        conv.transcript.push_user(&prompt);
        conv.transcript.begin_reply();
        conv.follow = true;

        let id = conv.id;
        debug!(id, model = %model, "starting generation");

        conv.task = Some(tokio::spawn(async move {
            let send = |payload| tx.send(AppEvent::Stream(StreamEvent { conversation: id, payload }));

            match ollama.generate_stream(&model, &prompt).await {
                Ok(mut fragments) => {
                    while let Some(fragment) = fragments.next().await {
                        match fragment {
                            Ok(text) => {
                                if send(StreamPayload::Fragment(text)).is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(id, error = %e, "stream failed mid-reply");
                                let _ = send(StreamPayload::Failed(e.to_string()));
                                return;
                            }
                        }
                    }
                    let _ = send(StreamPayload::Done);
                }
                Err(e) => {
                    warn!(id, error = %e, "generation request failed");
                    let _ = send(StreamPayload::Failed(e.to_string()));
                }
            }
        }));
    }

    /// Apply one stream event to the conversation it belongs to. Events for
    /// conversations that were closed in the meantime are dropped.
    pub fn apply_stream(&mut self, event: StreamEvent) {
        let Some(conv) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == event.conversation)
        else {
            debug!(id = event.conversation, "dropping event for closed conversation");
            return;
        };

        match event.payload {
            StreamPayload::Fragment(text) => conv.transcript.push_fragment(&text),
            StreamPayload::Done => {
                conv.transcript.finish_reply();
                conv.task = None;
            }
            StreamPayload::Failed(message) => {
                conv.transcript.push_error(&message);
                conv.task = None;
            }
        }
    }

    // Model picker

    /// Fetch the model list off the render loop; the result arrives as an
    /// `AppEvent::Models` and opens the picker.
    pub fn fetch_models(&self) {
        let ollama = self.ollama.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            match ollama.list_models().await {
                Ok(models) => {
                    let _ = tx.send(AppEvent::Models(models));
                }
                Err(e) => warn!(error = %e, "listing models failed"),
            }
        });
    }

    pub fn open_model_picker(&mut self, models: Vec<String>) {
        if models.is_empty() {
            return;
        }
        let current_idx = models
            .iter()
            .position(|m| m == &self.selected_model)
            .unwrap_or(0);
        self.available_models = models;
        self.model_picker_state.select(Some(current_idx));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i) {
                self.selected_model = model.clone();
                self.show_model_picker = false;
                // Persist as the new default
                let _ = Config::save_default_model(&self.selected_model);
            }
        }
    }
}
