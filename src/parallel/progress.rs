//! Single-line progress display shared by all output of a run

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing_subscriber::fmt::MakeWriter;

use crate::config::ProgressConfig;

/// Appearance of the progress line
#[derive(Debug, Clone)]
pub struct BarStyle {
    width: usize,
    frame_interval: Duration,
    glyphs: Vec<char>,
}

impl BarStyle {
    pub fn new(width: usize, frame_interval: Duration, glyphs: &str) -> Self {
        let mut glyphs: Vec<char> = glyphs.chars().collect();
        if glyphs.is_empty() {
            glyphs.push(' ');
        }
        Self {
            width: width.max(1),
            frame_interval,
            glyphs,
        }
    }
}

impl Default for BarStyle {
    fn default() -> Self {
        Self::from(&ProgressConfig::default())
    }
}

impl From<&ProgressConfig> for BarStyle {
    fn from(config: &ProgressConfig) -> Self {
        Self::new(config.bar_width, config.frame_interval(), &config.glyphs)
    }
}

/// What is currently on screen
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    /// Last rendered line; empty when no line is active
    line: String,
    /// Index into the animation glyphs
    frame: usize,
    /// Earliest time the animation may advance again
    next_frame_at: Option<Instant>,
}

impl ProgressState {
    pub fn line_len(&self) -> usize {
        self.line.chars().count()
    }

    pub fn is_active(&self) -> bool {
        !self.line.is_empty()
    }

    fn advance_frame(&mut self, now: Instant, style: &BarStyle) {
        match self.next_frame_at {
            Some(due) if now < due => {}
            Some(_) => {
                self.frame = (self.frame + 1) % style.glyphs.len();
                self.next_frame_at = Some(now + style.frame_interval);
            }
            None => self.next_frame_at = Some(now + style.frame_interval),
        }
    }
}

/// Render `[####------]  40% / 4/10`
pub fn render_line(style: &BarStyle, frame: usize, processed: usize, total: usize) -> String {
    let total = total.max(1);
    let processed = processed.min(total);
    let filled = processed * style.width / total;
    let percent = processed * 100 / total;
    let glyph = style.glyphs[frame % style.glyphs.len()];

    format!(
        "[{}{}] {:>3}% {} {}/{}",
        "#".repeat(filled),
        "-".repeat(style.width - filled),
        percent,
        glyph,
        processed,
        total
    )
}

struct Screen {
    out: Box<dyn Write + Send>,
    state: ProgressState,
}

impl Screen {
    fn overwrite(&mut self, line: String) -> io::Result<()> {
        let previous = self.state.line_len();
        let current = line.chars().count();
        write!(self.out, "\r{line}")?;
        if previous > current {
            write!(self.out, "{}", " ".repeat(previous - current))?;
        }
        self.state.line = line;
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        if self.state.is_active() {
            write!(self.out, "\r{}\r", " ".repeat(self.state.line_len()))?;
        }
        Ok(())
    }

    fn redraw(&mut self) -> io::Result<()> {
        if self.state.is_active() {
            write!(self.out, "{}", self.state.line)?;
        }
        Ok(())
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.state.is_active() {
            writeln!(self.out)?;
        }
        self.state = ProgressState::default();
        Ok(())
    }

    /// Put `bytes` on their own line(s) above the progress line
    fn write_above(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.clear()?;
        self.out.write_all(bytes)?;
        if !bytes.ends_with(b"\n") {
            writeln!(self.out)?;
        }
        self.redraw()?;
        self.out.flush()
    }
}

/// Progress line plus everything else written to the same stream.
///
/// Renders, messages and log lines all go through one mutex, so output from
/// different workers never interleaves mid-line.
pub struct ProgressReporter {
    screen: Mutex<Screen>,
    style: BarStyle,
    visible: bool,
}

impl ProgressReporter {
    /// Reporter drawing a progress line to `out`
    pub fn new(out: impl Write + Send + 'static, style: BarStyle) -> Self {
        Self::build(Box::new(out), style, true)
    }

    /// Reporter that only passes messages through, without a progress line
    pub fn hidden(out: impl Write + Send + 'static) -> Self {
        Self::build(Box::new(out), BarStyle::default(), false)
    }

    /// Reporter on stdout; the bar is drawn only when stdout is a terminal
    pub fn stdout(config: &ProgressConfig) -> Self {
        let visible = config.enabled && console::Term::stdout().is_term();
        Self::build(Box::new(io::stdout()), BarStyle::from(config), visible)
    }

    /// Messages-only reporter on stderr, used when stdout carries JSON
    pub fn stderr() -> Self {
        Self::hidden(io::stderr())
    }

    fn build(out: Box<dyn Write + Send>, style: BarStyle, visible: bool) -> Self {
        Self {
            screen: Mutex::new(Screen {
                out,
                state: ProgressState::default(),
            }),
            style,
            visible,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    // A panic while holding the lock must not silence the rest of the run
    fn lock(&self) -> MutexGuard<'_, Screen> {
        self.screen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Redraw the line for `processed` of `total`
    pub fn update(&self, processed: usize, total: usize) -> io::Result<()> {
        self.update_at(processed, total, Instant::now())
    }

    fn update_at(&self, processed: usize, total: usize, now: Instant) -> io::Result<()> {
        if !self.visible {
            return Ok(());
        }

        let mut screen = self.lock();
        screen.state.advance_frame(now, &self.style);
        let line = render_line(&self.style, screen.state.frame, processed, total);
        screen.overwrite(line)?;

        if processed >= total {
            screen.end_line()?;
        }
        screen.out.flush()
    }

    /// Print a message on its own line without disturbing the progress line
    pub fn emit(&self, message: &str) -> io::Result<()> {
        self.lock().write_above(message.as_bytes())
    }

    /// Terminate an active progress line so later output starts clean
    pub fn finish(&self) -> io::Result<()> {
        let mut screen = self.lock();
        screen.end_line()?;
        screen.out.flush()
    }

    /// Snapshot of the on-screen state
    pub fn state(&self) -> ProgressState {
        self.lock().state.clone()
    }
}

/// `MakeWriter` routing log lines through a [`ProgressReporter`]
#[derive(Clone)]
pub struct LogSink(Arc<ProgressReporter>);

impl LogSink {
    pub fn new(reporter: Arc<ProgressReporter>) -> Self {
        Self(reporter)
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogLine<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogLine { reporter: &self.0 }
    }
}

/// One formatted log event on its way to the screen
pub struct LogLine<'a> {
    reporter: &'a ProgressReporter,
}

impl Write for LogLine<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reporter.lock().write_above(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.reporter.lock().out.flush()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// In-memory sink that can be inspected while a reporter owns a clone
    #[derive(Clone, Default)]
    pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
