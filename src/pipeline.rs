//! The hotkey-triggered substitution cycle: snapshot the clipboard, copy the
//! active selection into it, send the captured text to the generation
//! endpoint, paste the result over the selection, and put the user's
//! original clipboard back. Every abort path restores the snapshot.

use crate::config::Config;
use crate::generate::{self, GenerateError, GenerationClient};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(20);
const CAPTURE_DEADLINE: Duration = Duration::from_millis(500);
const PASTE_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Text access to the system clipboard.
pub trait ClipboardText {
    /// Current clipboard text; `None` when empty or non-text.
    fn get(&mut self) -> Option<String>;
    fn set(&mut self, text: &str) -> Result<(), String>;
    fn clear(&mut self) -> Result<(), String>;
}

/// Synthesized copy/paste chords delivered to the foreground application.
pub trait KeySynth {
    fn copy_chord(&mut self);
    fn paste_chord(&mut self);
}

/// The network half of the cycle, seamed off so cycles run in tests.
pub trait Generate {
    fn generate(&self, endpoint: &str, body: &str) -> Result<String, GenerateError>;
}

impl Generate for GenerationClient {
    fn generate(&self, endpoint: &str, body: &str) -> Result<String, GenerateError> {
        GenerationClient::generate(self, endpoint, body)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("a substitution cycle is already in flight")]
    Busy,
    #[error("no new clipboard content within {0:?}")]
    CaptureTimeout(Duration),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("clipboard error: {0}")]
    Clipboard(String),
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

pub struct SubstitutionPipeline<C, K, G> {
    clipboard: C,
    keys: K,
    client: G,
    in_flight: Arc<AtomicBool>,
}

impl<C: ClipboardText, K: KeySynth, G: Generate> SubstitutionPipeline<C, K, G> {
    pub fn new(clipboard: C, keys: K, client: G) -> Self {
        Self::with_flag(clipboard, keys, client, Arc::new(AtomicBool::new(false)))
    }

    /// Share `in_flight` with the dispatch side so triggers that arrive
    /// mid-cycle can be rejected before they are even queued.
    pub fn with_flag(clipboard: C, keys: K, client: G, in_flight: Arc<AtomicBool>) -> Self {
        Self {
            clipboard,
            keys,
            client,
            in_flight,
        }
    }

    pub fn in_flight_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.in_flight)
    }

    /// Run one substitution cycle. Overlapping calls are rejected: the
    /// clipboard is a single global resource and interleaved cycles would
    /// capture each other's injected text.
    pub fn run_cycle(&mut self, cfg: &Config) -> Result<(), PipelineError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::Busy);
        }
        let result = self.cycle(cfg);
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    fn cycle(&mut self, cfg: &Config) -> Result<(), PipelineError> {
        let snapshot = self.clipboard.get();
        self.clipboard.clear().map_err(PipelineError::Clipboard)?;
        self.keys.copy_chord();

        let captured = match self.await_capture(snapshot.as_deref()) {
            Some(text) => text,
            None => {
                tracing::debug!("no selection copied within the capture window");
                self.restore(&snapshot);
                return Err(PipelineError::CaptureTimeout(CAPTURE_DEADLINE));
            }
        };
        tracing::debug!(chars = captured.chars().count(), "captured selection");

        let generated = match self.request(cfg, &captured) {
            Ok(text) => text,
            Err(err) => {
                self.restore(&snapshot);
                return Err(err);
            }
        };

        if let Err(err) = self.clipboard.set(&generated) {
            self.restore(&snapshot);
            return Err(PipelineError::Clipboard(err));
        }
        self.keys.paste_chord();

        // The paste lands asynchronously in the foreground app; give it a
        // moment to read the clipboard before the snapshot overwrites it.
        thread::sleep(PASTE_SETTLE_DELAY);
        self.restore(&snapshot);
        Ok(())
    }

    /// The synthesized copy reaches the clipboard asynchronously with no
    /// completion signal, so poll until it holds something new or the
    /// deadline lapses.
    fn await_capture(&mut self, snapshot: Option<&str>) -> Option<String> {
        let deadline = Instant::now() + CAPTURE_DEADLINE;
        loop {
            if let Some(text) = self.clipboard.get()
                && !text.is_empty()
                && snapshot != Some(text.as_str())
            {
                return Some(text);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(CAPTURE_POLL_INTERVAL);
        }
    }

    fn request(&self, cfg: &Config, text: &str) -> Result<String, PipelineError> {
        if cfg.prompt_template.trim().is_empty() {
            return Err(PipelineError::Config("prompt template is blank".to_string()));
        }
        let body = generate::render_template(&cfg.prompt_template, text);
        Ok(self.client.generate(&cfg.endpoint, &body)?)
    }

    fn restore(&mut self, snapshot: &Option<String>) {
        let result = match snapshot {
            Some(text) => self.clipboard.set(text),
            None => self.clipboard.clear(),
        };
        if let Err(err) = result {
            tracing::warn!(%err, "failed to restore clipboard");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Clipboard backed by shared state so the fake key synth can observe
    /// and mutate it the way the foreground application would.
    struct FakeClipboard(Arc<Mutex<Option<String>>>);

    impl ClipboardText for FakeClipboard {
        fn get(&mut self) -> Option<String> {
            self.0.lock().unwrap().clone().filter(|s| !s.is_empty())
        }

        fn set(&mut self, text: &str) -> Result<(), String> {
            *self.0.lock().unwrap() = Some(text.to_string());
            Ok(())
        }

        fn clear(&mut self) -> Result<(), String> {
            *self.0.lock().unwrap() = None;
            Ok(())
        }
    }

    /// A copy chord places `selection` on the clipboard (when there is
    /// one); a paste chord records what the foreground app would insert.
    struct FakeKeys {
        clipboard: Arc<Mutex<Option<String>>>,
        selection: Option<String>,
        pasted: Arc<Mutex<Vec<String>>>,
    }

    impl KeySynth for FakeKeys {
        fn copy_chord(&mut self) {
            if let Some(selection) = &self.selection {
                *self.clipboard.lock().unwrap() = Some(selection.clone());
            }
        }

        fn paste_chord(&mut self) {
            let current = self.clipboard.lock().unwrap().clone().unwrap_or_default();
            self.pasted.lock().unwrap().push(current);
        }
    }

    struct FakeGenerator(Result<String, fn() -> GenerateError>);

    impl Generate for FakeGenerator {
        fn generate(&self, _endpoint: &str, _body: &str) -> Result<String, GenerateError> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    struct Harness {
        clipboard: Arc<Mutex<Option<String>>>,
        pasted: Arc<Mutex<Vec<String>>>,
    }

    fn pipeline(
        initial_clipboard: Option<&str>,
        selection: Option<&str>,
        outcome: Result<String, fn() -> GenerateError>,
    ) -> (
        SubstitutionPipeline<FakeClipboard, FakeKeys, FakeGenerator>,
        Harness,
    ) {
        let clipboard = Arc::new(Mutex::new(initial_clipboard.map(str::to_string)));
        let pasted = Arc::new(Mutex::new(Vec::new()));
        let pipeline = SubstitutionPipeline::new(
            FakeClipboard(Arc::clone(&clipboard)),
            FakeKeys {
                clipboard: Arc::clone(&clipboard),
                selection: selection.map(str::to_string),
                pasted: Arc::clone(&pasted),
            },
            FakeGenerator(outcome),
        );
        (pipeline, Harness { clipboard, pasted })
    }

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn successful_cycle_pastes_result_then_restores_clipboard() {
        let (mut pipeline, harness) =
            pipeline(Some("original"), Some("hi"), Ok("HELLO".to_string()));

        pipeline.run_cycle(&cfg()).unwrap();

        assert_eq!(harness.pasted.lock().unwrap().as_slice(), ["HELLO"]);
        assert_eq!(
            harness.clipboard.lock().unwrap().as_deref(),
            Some("original")
        );
        assert!(!pipeline.in_flight_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn empty_starting_clipboard_is_cleared_again_after_the_cycle() {
        let (mut pipeline, harness) = pipeline(None, Some("hi"), Ok("HELLO".to_string()));

        pipeline.run_cycle(&cfg()).unwrap();

        assert_eq!(harness.pasted.lock().unwrap().as_slice(), ["HELLO"]);
        assert_eq!(*harness.clipboard.lock().unwrap(), None);
    }

    #[test]
    fn capture_timeout_restores_clipboard_and_pastes_nothing() {
        let (mut pipeline, harness) = pipeline(Some("original"), None, Ok("unused".to_string()));

        let result = pipeline.run_cycle(&cfg());

        assert!(matches!(result, Err(PipelineError::CaptureTimeout(_))));
        assert!(harness.pasted.lock().unwrap().is_empty());
        assert_eq!(
            harness.clipboard.lock().unwrap().as_deref(),
            Some("original")
        );
    }

    #[test]
    fn copy_identical_to_snapshot_counts_as_no_capture() {
        // The focused app "copies" text identical to the pre-trigger
        // clipboard. That must not pass for a fresh selection.
        let (mut pipeline, harness) =
            pipeline(Some("stale"), Some("stale"), Ok("unused".to_string()));

        let result = pipeline.run_cycle(&cfg());

        assert!(matches!(result, Err(PipelineError::CaptureTimeout(_))));
        assert!(harness.pasted.lock().unwrap().is_empty());
        assert_eq!(harness.clipboard.lock().unwrap().as_deref(), Some("stale"));
    }

    #[test]
    fn generation_failure_restores_clipboard() {
        let (mut pipeline, harness) = pipeline(
            Some("original"),
            Some("hi"),
            Err(|| GenerateError::Transport("connection refused".to_string())),
        );

        let result = pipeline.run_cycle(&cfg());

        assert!(matches!(result, Err(PipelineError::Generate(_))));
        assert!(harness.pasted.lock().unwrap().is_empty());
        assert_eq!(
            harness.clipboard.lock().unwrap().as_deref(),
            Some("original")
        );
    }

    #[test]
    fn unreachable_endpoint_leaves_clipboard_untouched_end_to_end() {
        let clipboard = Arc::new(Mutex::new(Some("original".to_string())));
        let pasted = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = SubstitutionPipeline::new(
            FakeClipboard(Arc::clone(&clipboard)),
            FakeKeys {
                clipboard: Arc::clone(&clipboard),
                selection: Some("hi".to_string()),
                pasted: Arc::clone(&pasted),
            },
            GenerationClient::new(),
        );
        let mut cfg = cfg();
        cfg.endpoint = "http://127.0.0.1:1/api/generate".to_string();

        let result = pipeline.run_cycle(&cfg);

        assert!(matches!(
            result,
            Err(PipelineError::Generate(GenerateError::Transport(_)))
        ));
        assert!(pasted.lock().unwrap().is_empty());
        assert_eq!(clipboard.lock().unwrap().as_deref(), Some("original"));
    }

    #[test]
    fn blank_template_aborts_before_any_request() {
        let (mut pipeline, harness) = pipeline(
            Some("original"),
            Some("hi"),
            Err(|| panic!("the client must not be called")),
        );
        let mut cfg = cfg();
        cfg.prompt_template = "   ".to_string();

        let result = pipeline.run_cycle(&cfg);

        assert!(matches!(result, Err(PipelineError::Config(_))));
        assert_eq!(
            harness.clipboard.lock().unwrap().as_deref(),
            Some("original")
        );
    }

    #[test]
    fn endpoint_without_scheme_aborts_before_any_request() {
        let clipboard = Arc::new(Mutex::new(Some("original".to_string())));
        let pasted = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = SubstitutionPipeline::new(
            FakeClipboard(Arc::clone(&clipboard)),
            FakeKeys {
                clipboard: Arc::clone(&clipboard),
                selection: Some("hi".to_string()),
                pasted: Arc::clone(&pasted),
            },
            GenerationClient::new(),
        );
        let mut cfg = cfg();
        cfg.endpoint = "localhost:11434".to_string();

        let result = pipeline.run_cycle(&cfg);

        assert!(matches!(
            result,
            Err(PipelineError::Generate(GenerateError::InvalidEndpoint(_)))
        ));
        assert!(pasted.lock().unwrap().is_empty());
        assert_eq!(clipboard.lock().unwrap().as_deref(), Some("original"));
    }

    #[test]
    fn overlapping_trigger_is_rejected_without_touching_the_clipboard() {
        let (mut pipeline, harness) =
            pipeline(Some("original"), Some("hi"), Ok("HELLO".to_string()));

        // Simulate a cycle in flight on another trigger.
        pipeline.in_flight_flag().store(true, Ordering::SeqCst);

        let result = pipeline.run_cycle(&cfg());

        assert!(matches!(result, Err(PipelineError::Busy)));
        assert!(harness.pasted.lock().unwrap().is_empty());
        assert_eq!(
            harness.clipboard.lock().unwrap().as_deref(),
            Some("original")
        );

        // Once the first cycle finishes, triggers work again.
        pipeline.in_flight_flag().store(false, Ordering::SeqCst);
        pipeline.run_cycle(&cfg()).unwrap();
        assert_eq!(harness.pasted.lock().unwrap().as_slice(), ["HELLO"]);
    }
}
