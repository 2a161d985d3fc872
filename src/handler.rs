use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key)?,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::Stream(stream_event) => {
            app.apply_stream(stream_event);
        }
        AppEvent::Models(models) => {
            app.open_model_picker(models);
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }
    if key.code == KeyCode::F(11) {
        app.toggle_fullscreen();
        return Ok(());
    }
    if key.code == KeyCode::Char('n') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.new_conversation();
        return Ok(());
    }
    if key.code == KeyCode::Char('w') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.close_active();
        return Ok(());
    }

    // Handle model picker if it's open
    if app.show_model_picker {
        match key.code {
            KeyCode::Esc => {
                app.show_model_picker = false;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                app.model_picker_nav_down();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                app.model_picker_nav_up();
            }
            KeyCode::Enter => {
                app.select_model();
            }
            _ => {}
        }
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }

    Ok(())
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Tabs
        KeyCode::Char('n') => app.new_conversation(),
        KeyCode::Char('w') => app.close_active(),
        KeyCode::Tab | KeyCode::Char(']') | KeyCode::Right => app.next_tab(),
        KeyCode::BackTab | KeyCode::Char('[') | KeyCode::Left => app.prev_tab(),

        // Transcript scrolling; manual scrolling releases bottom-follow
        KeyCode::Char('j') | KeyCode::Down => {
            let conv = app.active_conversation_mut();
            conv.follow = false;
            conv.scroll = conv.scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            let conv = app.active_conversation_mut();
            conv.follow = false;
            conv.scroll = conv.scroll.saturating_sub(1);
        }
        KeyCode::Char('g') => {
            let conv = app.active_conversation_mut();
            conv.follow = false;
            conv.scroll = 0;
        }
        KeyCode::Char('G') => {
            app.active_conversation_mut().follow = true;
        }

        // Enter editing mode
        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
        }

        // Open model picker; the fetch runs off the render loop
        KeyCode::Char('M') => app.fetch_models(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.send_message();
        }
        KeyCode::Tab => {
            // Tab still switches conversations while typing
            app.next_tab();
        }
        KeyCode::BackTab => {
            app.prev_tab();
        }
        KeyCode::Backspace => {
            let conv = app.active_conversation_mut();
            if conv.cursor > 0 {
                conv.cursor -= 1;
                let byte_pos = char_to_byte_index(&conv.input, conv.cursor);
                conv.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let conv = app.active_conversation_mut();
            let char_count = conv.input.chars().count();
            if conv.cursor < char_count {
                let byte_pos = char_to_byte_index(&conv.input, conv.cursor);
                conv.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            let conv = app.active_conversation_mut();
            conv.cursor = conv.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let conv = app.active_conversation_mut();
            let char_count = conv.input.chars().count();
            conv.cursor = (conv.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.active_conversation_mut().cursor = 0;
        }
        KeyCode::End => {
            let conv = app.active_conversation_mut();
            conv.cursor = conv.input.chars().count();
        }
        KeyCode::Char(c) => {
            let conv = app.active_conversation_mut();
            let byte_pos = char_to_byte_index(&conv.input, conv.cursor);
            conv.input.insert(byte_pos, c);
            conv.cursor += 1;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ollama::OllamaClient;
    use tokio::sync::mpsc;

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(
            OllamaClient::new("http://localhost:11434"),
            "llama3.2:latest".to_string(),
            tx,
        );
        (app, rx)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[tokio::test]
    async fn typing_inserts_at_cursor_utf8_safely() {
        let (mut app, _rx) = test_app();
        for c in "héllo".chars() {
            handle_event(&mut app, AppEvent::Key(press(KeyCode::Char(c))))
                .await
                .unwrap();
        }
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Home)))
            .await
            .unwrap();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Right)))
            .await
            .unwrap();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Delete)))
            .await
            .unwrap();

        assert_eq!(app.active_conversation().input, "hllo");
        assert_eq!(app.active_conversation().cursor, 1);
    }

    #[tokio::test]
    async fn backspace_at_start_is_harmless() {
        let (mut app, _rx) = test_app();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Backspace)))
            .await
            .unwrap();
        assert_eq!(app.active_conversation().input, "");
        assert_eq!(app.active_conversation().cursor, 0);
    }

    #[tokio::test]
    async fn ctrl_n_and_ctrl_w_manage_tabs_in_any_mode() {
        let (mut app, _rx) = test_app();
        assert_eq!(app.input_mode, InputMode::Editing);

        handle_event(&mut app, AppEvent::Key(ctrl('n'))).await.unwrap();
        assert_eq!(app.conversations.len(), 2);

        handle_event(&mut app, AppEvent::Key(ctrl('w'))).await.unwrap();
        assert_eq!(app.conversations.len(), 1);
    }

    #[tokio::test]
    async fn f11_toggles_fullscreen_even_while_editing() {
        let (mut app, _rx) = test_app();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::F(11))))
            .await
            .unwrap();
        assert!(app.fullscreen);
        handle_event(&mut app, AppEvent::Key(press(KeyCode::F(11))))
            .await
            .unwrap();
        assert!(!app.fullscreen);
    }

    #[tokio::test]
    async fn model_picker_opens_on_the_fetched_event_not_the_keypress() {
        let (mut app, _rx) = test_app();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Esc)))
            .await
            .unwrap();

        // The keypress only kicks off the fetch; the picker stays closed
        // until the model list comes back through the event channel.
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Char('M'))))
            .await
            .unwrap();
        assert!(!app.show_model_picker);

        handle_event(
            &mut app,
            AppEvent::Models(vec!["llama3.2:latest".to_string(), "phi3".to_string()]),
        )
        .await
        .unwrap();
        assert!(app.show_model_picker);
        assert_eq!(app.model_picker_state.selected(), Some(0));
    }

    #[tokio::test]
    async fn scrolling_either_direction_releases_bottom_follow() {
        let (mut app, _rx) = test_app();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Esc)))
            .await
            .unwrap();

        assert!(app.active_conversation().follow);
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Char('j'))))
            .await
            .unwrap();
        assert!(!app.active_conversation().follow);

        handle_event(&mut app, AppEvent::Key(press(KeyCode::Char('G'))))
            .await
            .unwrap();
        assert!(app.active_conversation().follow);
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Char('k'))))
            .await
            .unwrap();
        assert!(!app.active_conversation().follow);
    }

    #[tokio::test]
    async fn esc_leaves_editing_and_q_quits() {
        let (mut app, _rx) = test_app();
        handle_event(&mut app, AppEvent::Key(press(KeyCode::Esc)))
            .await
            .unwrap();
        assert_eq!(app.input_mode, InputMode::Normal);

        handle_event(&mut app, AppEvent::Key(press(KeyCode::Char('q'))))
            .await
            .unwrap();
        assert!(app.should_quit);
    }
}
