use std::io::{self, Write};

use spark_client::RenderTarget;

/// Render target that streams the reply to a terminal.
///
/// Text already written cannot be taken back, so `replace` starts a fresh
/// line before printing the replacement.
pub struct TerminalTarget<W: Write> {
    out: W,
    written: bool,
    error: Option<io::Error>,
}

impl TerminalTarget<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalTarget<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            written: false,
            error: None,
        }
    }

    /// Terminates the reply with a newline and reports the first write error.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if self.written {
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write(&mut self, text: &str) {
        if self.error.is_some() || text.is_empty() {
            return;
        }
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        match result {
            Ok(()) => self.written = true,
            Err(err) => self.error = Some(err),
        }
    }
}

impl<W: Write> RenderTarget for TerminalTarget<W> {
    fn append(&mut self, text: &str) {
        self.write(text);
    }

    fn replace(&mut self, text: &str) {
        if self.written {
            self.write("\n");
        }
        self.write(text);
    }
}
