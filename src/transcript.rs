/// Marker the backend emits around code blocks. Fragments carrying it are
/// stripped of the marker and rendered in the code style.
pub const CODE_FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    User,
    Assistant,
    Code,
    Error,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

/// Styled text buffer for one conversation.
///
/// Fragments are appended in the order produced; adjacent fragments of the
/// same style coalesce into one segment so the buffer stays proportional to
/// the rendered text, not the fragment count.
#[derive(Debug, Default)]
pub struct Transcript {
    segments: Vec<Segment>,
    streaming: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True while a reply is being streamed into this transcript.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append the user's message as a single styled entry.
    pub fn push_user(&mut self, text: &str) {
        self.push(SegmentKind::User, format!("You: {}\n", text));
    }

    /// Open the reply: a styled role tag, then fragments until `finish_reply`.
    pub fn begin_reply(&mut self) {
        self.push(SegmentKind::Assistant, "AI: ".to_string());
        self.streaming = true;
    }

    /// Append one streamed fragment. Fragments containing a code fence are
    /// stripped of every marker and styled as code; all others are styled as
    /// assistant text.
    pub fn push_fragment(&mut self, fragment: &str) {
        if fragment.contains(CODE_FENCE) {
            self.push(SegmentKind::Code, fragment.replace(CODE_FENCE, ""));
        } else {
            self.push(SegmentKind::Assistant, fragment.to_string());
        }
    }

    /// Close the reply with the trailing newline.
    pub fn finish_reply(&mut self) {
        self.push(SegmentKind::Assistant, "\n".to_string());
        self.streaming = false;
    }

    /// Record a backend failure in place of the rest of the reply.
    pub fn push_error(&mut self, message: &str) {
        self.push(SegmentKind::Error, format!("\nError: {}\n", message));
        self.streaming = false;
    }

    /// The buffer flattened to plain text, styles erased.
    pub fn plain_text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    fn push(&mut self, kind: SegmentKind, text: String) {
        if let Some(last) = self.segments.last_mut() {
            if last.kind == kind {
                last.text.push_str(&text);
                return;
            }
        }
        self.segments.push(Segment { kind, text });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_is_one_styled_entry() {
        let mut t = Transcript::new();
        t.push_user("hello there");
        assert_eq!(t.segments().len(), 1);
        assert_eq!(t.segments()[0].kind, SegmentKind::User);
        assert_eq!(t.plain_text(), "You: hello there\n");
    }

    #[test]
    fn fragments_concatenate_in_order_with_trailing_newline() {
        let mut t = Transcript::new();
        t.begin_reply();
        for frag in ["The ", "answer ", "is ", "42."] {
            t.push_fragment(frag);
        }
        t.finish_reply();
        assert_eq!(t.plain_text(), "AI: The answer is 42.\n");
        assert!(!t.is_streaming());
    }

    #[test]
    fn fence_fragments_are_stripped_and_styled_as_code() {
        let mut t = Transcript::new();
        t.begin_reply();
        t.push_fragment("```rust\nfn main() {}\n```");
        t.finish_reply();

        let code: Vec<_> = t
            .segments()
            .iter()
            .filter(|s| s.kind == SegmentKind::Code)
            .collect();
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].text, "rust\nfn main() {}\n");
        assert!(!t.plain_text().contains(CODE_FENCE));
    }

    #[test]
    fn mixed_fragments_keep_production_order() {
        let mut t = Transcript::new();
        t.begin_reply();
        t.push_fragment("before ");
        t.push_fragment("```x = 1```");
        t.push_fragment(" after");
        t.finish_reply();
        assert_eq!(t.plain_text(), "AI: before x = 1 after\n");
    }

    #[test]
    fn adjacent_fragments_of_same_style_coalesce() {
        let mut t = Transcript::new();
        t.begin_reply();
        t.push_fragment("one ");
        t.push_fragment("two");
        // "AI: one two" is a single assistant segment
        assert_eq!(t.segments().len(), 1);
    }

    #[test]
    fn error_ends_the_stream() {
        let mut t = Transcript::new();
        t.push_user("hi");
        t.begin_reply();
        t.push_fragment("partial");
        t.push_error("connection reset");
        assert!(!t.is_streaming());
        assert!(t.plain_text().ends_with("Error: connection reset\n"));
    }

    #[test]
    fn empty_reply_still_gets_its_newline() {
        let mut t = Transcript::new();
        t.begin_reply();
        t.finish_reply();
        assert_eq!(t.plain_text(), "AI: \n");
    }
}
