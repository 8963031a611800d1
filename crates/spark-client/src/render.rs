/// Sink that shows one session's reply as it streams in.
///
/// A session holds its target exclusively until it ends; nothing else writes
/// to it mid-stream.
pub trait RenderTarget {
    /// Appends text to the visible reply.
    fn append(&mut self, text: &str);

    /// Replaces the visible reply with `text`.
    fn replace(&mut self, text: &str);
}

impl<T: RenderTarget + ?Sized> RenderTarget for &mut T {
    fn append(&mut self, text: &str) {
        (**self).append(text);
    }

    fn replace(&mut self, text: &str) {
        (**self).replace(text);
    }
}

impl<T: RenderTarget + ?Sized> RenderTarget for Box<T> {
    fn append(&mut self, text: &str) {
        (**self).append(text);
    }

    fn replace(&mut self, text: &str) {
        (**self).replace(text);
    }
}

/// In-memory render target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    mutations: usize,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current visible text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of append/replace calls applied so far.
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl RenderTarget for TextBuffer {
    fn append(&mut self, text: &str) {
        self.text.push_str(text);
        self.mutations += 1;
    }

    fn replace(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.mutations += 1;
    }
}
