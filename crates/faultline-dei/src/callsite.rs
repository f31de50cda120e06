//! Callsite extraction: where in user code a remote call originated.
//!
//! The extractor captures the live stack, drops frames that belong to the
//! runtime, test framework, transport libraries, or imported crates, and
//! reports the outermost remaining frame as the call's origin. Frames with a
//! resolved location win over unresolved ones.
//!
//! Frames are opaque strings of the form `symbol (file:line)`, innermost
//! first. [`BacktraceSource`] renders `std::backtrace` in that form; any
//! other [`StackSource`] must do the same.

use std::backtrace::Backtrace;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CallsiteError, CallsiteResult};

/// Namespaces treated as infrastructure unless configured otherwise.
pub const DEFAULT_INFRASTRUCTURE_NAMESPACES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "backtrace::",
    "test::",
    "tokio",
    "futures",
    "hyper::",
    "tonic::",
    "tower::",
    "reqwest::",
    "mio::",
    "faultline::",
    "faultline_dei::",
    "__rust",
    "rust_begin_unwind",
];

const UNRESOLVED_LOCATION: &str = "(<unknown>:0)";

/// Fragments that mark a frame as test or tutorial code.
const TEST_CODE_MARKERS: &[&str] = &["::tests::", "/tests/", "tutorial"];

/// The argument descriptor of a call: display only, never inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentsDescriptor {
    /// Declared type or shape of the arguments (e.g. a request message name).
    pub declared_type: String,
    /// Rendered argument values.
    pub rendered: String,
}

impl ArgumentsDescriptor {
    pub fn new(declared_type: impl Into<String>, rendered: impl Into<String>) -> Self {
        Self {
            declared_type: declared_type.into(),
            rendered: rendered.into(),
        }
    }
}

/// What the transport interceptor knows about a call before it is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTarget {
    pub service_name: String,
    pub module: String,
    pub method: String,
    pub arguments: ArgumentsDescriptor,
    /// Caller-supplied token for call sites the stack cannot disambiguate.
    pub async_token: Option<String>,
}

impl CallTarget {
    pub fn new(
        service_name: impl Into<String>,
        module: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            module: module.into(),
            method: method.into(),
            arguments: ArgumentsDescriptor::default(),
            async_token: None,
        }
    }

    pub fn with_arguments(mut self, arguments: ArgumentsDescriptor) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_async_token(mut self, token: impl Into<String>) -> Self {
        self.async_token = Some(token.into());
        self
    }

    /// The `module/method` signature used for matching and flat index keys.
    pub fn signature(&self) -> String {
        format!("{}/{}", self.module, self.method)
    }
}

/// Normalized origin of one remote-call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callsite {
    pub target: CallTarget,
    pub serialized_stack_trace: String,
    pub file_name: String,
    pub line_number: String,
}

impl Callsite {
    pub fn service_name(&self) -> &str {
        &self.target.service_name
    }

    pub fn signature(&self) -> String {
        self.target.signature()
    }
}

impl fmt::Display for Callsite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {}:{}",
            self.signature(),
            self.file_name,
            self.line_number
        )
    }
}

// ============================================================================
// Stack Sources
// ============================================================================

/// Produces the current call stack, innermost frame first.
pub trait StackSource: Send + Sync {
    fn frames(&self) -> Vec<String>;
}

/// Captures the live stack through `std::backtrace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BacktraceSource;

impl StackSource for BacktraceSource {
    fn frames(&self) -> Vec<String> {
        render_backtrace(&Backtrace::force_capture().to_string())
    }
}

/// A fixed, pre-recorded stack.
#[derive(Debug, Default, Clone)]
pub struct RecordedStack(pub Vec<String>);

impl StackSource for RecordedStack {
    fn frames(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Converts `std::backtrace` output into `symbol (file:line)` frames.
///
/// Frames without a resolved location render as `symbol (<unknown>:0)`.
fn render_backtrace(text: &str) -> Vec<String> {
    let mut frames = Vec::new();
    let mut pending: Option<String> = None;

    for line in text.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(symbol) = pending.take() {
                let mut parts = location.rsplitn(3, ':');
                let _column = parts.next();
                let line_no = parts.next().unwrap_or("0");
                let file = parts.next().unwrap_or(location);
                frames.push(format!("{symbol} ({file}:{line_no})"));
            }
        } else if let Some((index, symbol)) = line.split_once(": ") {
            if index.chars().all(|c| c.is_ascii_digit()) {
                if let Some(symbol) = pending.replace(symbol.to_string()) {
                    frames.push(format!("{symbol} (<unknown>:0)"));
                }
            }
        }
    }
    if let Some(symbol) = pending {
        frames.push(format!("{symbol} (<unknown>:0)"));
    }

    frames
}

// ============================================================================
// Frame Filtering
// ============================================================================

/// Decides which stack frames count as user code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFilter {
    infrastructure: Vec<String>,
    imported: Vec<String>,
}

impl FrameFilter {
    pub fn new(infrastructure: Vec<String>) -> Self {
        Self {
            infrastructure,
            imported: Vec::new(),
        }
    }

    /// Also drops frames from these imported-library namespaces.
    pub fn with_imported(mut self, imported: Vec<String>) -> Self {
        self.imported = imported;
        self
    }

    /// Returns true if the frame should be kept as user code.
    ///
    /// Namespaces are prefixes of the frame's symbol; a leading `<` from
    /// trait-impl symbols is ignored.
    ///
    /// Symbols without a `::` path (`_start`, `start_thread`, `clone3`, the
    /// C `main` shim, `<unknown>`) come from the platform runtime and are
    /// always dropped.
    pub fn keeps(&self, frame: &str) -> bool {
        if looks_like_test_code(frame) {
            return true;
        }
        let symbol = frame_symbol(frame);
        if !symbol.contains("::") {
            return false;
        }
        let symbol = symbol.trim_start_matches('<');
        let matches = |namespace: &String| symbol.starts_with(namespace.as_str());
        !(self.infrastructure.iter().any(matches) || self.imported.iter().any(matches))
    }
}

impl Default for FrameFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_INFRASTRUCTURE_NAMESPACES
                .iter()
                .map(ToString::to_string)
                .collect(),
        )
    }
}

/// The symbol part of a `symbol (file:line)` frame.
fn frame_symbol(frame: &str) -> &str {
    match frame.rfind(" (") {
        Some(open) => frame[..open].trim(),
        None => frame.trim(),
    }
}

fn looks_like_test_code(frame: &str) -> bool {
    TEST_CODE_MARKERS.iter().any(|marker| frame.contains(marker))
}

// ============================================================================
// Extraction
// ============================================================================

/// Builds [`Callsite`]s from a stack source and a frame filter.
pub struct CallsiteExtractor {
    source: Box<dyn StackSource>,
    filter: FrameFilter,
    line_numbers: bool,
}

impl CallsiteExtractor {
    pub fn new(source: Box<dyn StackSource>, filter: FrameFilter) -> Self {
        Self {
            source,
            filter,
            line_numbers: true,
        }
    }

    /// Extractor over the live stack with the default filter.
    pub fn live() -> Self {
        Self::new(Box::new(BacktraceSource), FrameFilter::default())
    }

    /// When disabled, every callsite reports line `"0"`.
    pub fn with_line_numbers(mut self, enabled: bool) -> Self {
        self.line_numbers = enabled;
        self
    }

    pub fn filter(&self) -> &FrameFilter {
        &self.filter
    }

    pub fn extract(&self, target: CallTarget) -> CallsiteResult<Callsite> {
        let frames = self.source.frames();
        let captured = frames.len();
        let mut kept: Vec<String> = frames
            .into_iter()
            .filter(|frame| self.filter.keeps(frame))
            .collect();

        if kept.is_empty() {
            tracing::debug!(
                captured,
                signature = %target.signature(),
                "no user frames left after filtering"
            );
            return Err(CallsiteError::UnknownCallsite { captured });
        }

        if kept.iter().any(|frame| !frame.ends_with(UNRESOLVED_LOCATION)) {
            kept.retain(|frame| !frame.ends_with(UNRESOLVED_LOCATION));
        }

        let serialized_stack_trace = kept.join("\n");
        kept.reverse();
        let (file_name, line_number) = parse_frame_location(&kept[0], self.line_numbers)?;

        Ok(Callsite {
            target,
            serialized_stack_trace,
            file_name,
            line_number,
        })
    }
}

impl fmt::Debug for CallsiteExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallsiteExtractor")
            .field("filter", &self.filter)
            .field("line_numbers", &self.line_numbers)
            .finish_non_exhaustive()
    }
}

/// Extracts `(file, line)` from a `symbol (file:line)` frame.
///
/// With `line_numbers` disabled the line is reported as `"0"`, but the
/// frame must still be well formed.
pub fn parse_frame_location(frame: &str, line_numbers: bool) -> CallsiteResult<(String, String)> {
    let malformed = |reason| CallsiteError::MalformedFrame {
        frame: frame.to_string(),
        reason,
    };

    let open = frame.rfind('(').ok_or_else(|| malformed("missing '('"))?;
    let location = frame[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| malformed("missing closing ')'"))?;
    let (file, line) = location
        .rsplit_once(':')
        .ok_or_else(|| malformed("missing ':' between file and line"))?;

    if file.is_empty() {
        return Err(malformed("empty file name"));
    }
    if line.is_empty() || !line.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed("line is not a number"));
    }

    let line = if line_numbers { line } else { "0" };
    Ok((file.to_string(), line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn extractor(frames: &[&str]) -> CallsiteExtractor {
        CallsiteExtractor::new(
            Box::new(RecordedStack(frames.iter().map(ToString::to_string).collect())),
            FrameFilter::default(),
        )
    }

    fn target() -> CallTarget {
        CallTarget::new("hello", "cloud.hello.Greeter", "SayHello")
    }

    #[test]
    fn outermost_user_frame_is_the_origin() {
        let callsite = extractor(&[
            "std::backtrace::Backtrace::force_capture (/rustc/library/std/src/backtrace.rs:312)",
            "shop::client::checkout (src/client.rs:42)",
            "shop::api::handle (src/api.rs:7)",
            "tokio::runtime::task::poll (/cargo/tokio/src/task.rs:99)",
        ])
        .extract(target())
        .unwrap();

        assert_eq!(callsite.file_name, "src/api.rs");
        assert_eq!(callsite.line_number, "7");
        assert_eq!(
            callsite.serialized_stack_trace,
            "shop::client::checkout (src/client.rs:42)\nshop::api::handle (src/api.rs:7)"
        );
    }

    #[test]
    fn line_numbers_can_be_disabled() {
        let callsite = extractor(&["shop::api::handle (src/api.rs:7)"])
            .with_line_numbers(false)
            .extract(target())
            .unwrap();
        assert_eq!(callsite.line_number, "0");
    }

    #[test]
    fn only_infrastructure_frames_is_unknown_callsite() {
        let err = extractor(&[
            "std::rt::lang_start (/rustc/library/std/src/rt.rs:1)",
            "core::ops::function::FnOnce::call_once (/rustc/core/src/ops.rs:250)",
        ])
        .extract(target())
        .unwrap_err();
        assert!(matches!(err, CallsiteError::UnknownCallsite { captured: 2 }));
    }

    #[test]
    fn empty_stack_is_unknown_callsite() {
        let err = extractor(&[]).extract(target()).unwrap_err();
        assert!(matches!(err, CallsiteError::UnknownCallsite { captured: 0 }));
    }

    #[test]
    fn test_frames_survive_infrastructure_filter() {
        let callsite = extractor(&[
            "faultline::instrument::Instrumentor::begin_call (src/instrument.rs:10)",
            "faultline::tests::helper::call (crates/faultline/src/instrument.rs:300)",
        ])
        .extract(target())
        .unwrap();
        assert_eq!(callsite.file_name, "crates/faultline/src/instrument.rs");
    }

    #[test]
    fn runtime_frames_never_become_the_origin() {
        let callsite = extractor(&[
            "shop::api::handle (src/api.rs:7)",
            "shop::api::serve::{{closure}} (<unknown>:0)",
            "std::sys::thread::Thread::new::thread_start (/rustc/library/std/src/sys/thread.rs:97)",
            "start_thread (./nptl/pthread_create.c:447)",
            "clone3 (./misc/clone3.S:78)",
            "<unknown> (<unknown>:0)",
        ])
        .extract(target())
        .unwrap();
        assert_eq!(callsite.file_name, "src/api.rs");
        assert_eq!(callsite.line_number, "7");
        assert_eq!(callsite.serialized_stack_trace, "shop::api::handle (src/api.rs:7)");
    }

    #[test]
    fn unresolved_frames_are_used_when_nothing_else_is_left() {
        let callsite = extractor(&["shop::api::handle (<unknown>:0)"])
            .extract(target())
            .unwrap();
        assert_eq!(callsite.file_name, "<unknown>");
    }

    #[test]
    fn live_stack_points_at_the_calling_test() {
        let callsite = CallsiteExtractor::live().extract(target()).unwrap();
        assert!(callsite.file_name.ends_with("callsite.rs"), "origin was {callsite}");
        assert_ne!(callsite.line_number, "0");
    }

    #[test]
    fn imported_namespaces_are_dropped() {
        let filter = FrameFilter::default().with_imported(vec!["serde_json::".to_string()]);
        assert!(!filter.keeps("serde_json::de::from_str (src/de.rs:1)"));
        assert!(filter.keeps("shop::api::handle (src/api.rs:7)"));
    }

    #[test]
    fn malformed_origin_frame_is_fatal() {
        let err = extractor(&["shop::api::handle at src/api.rs"])
            .extract(target())
            .unwrap_err();
        assert!(matches!(err, CallsiteError::MalformedFrame { .. }));
    }

    #[test_case("a (src/lib.rs:12)", "src/lib.rs", "12" ; "plain")]
    #[test_case("<T as Tr>::f (C:/work/src/lib.rs:3)", "C:/work/src/lib.rs", "3" ; "colon in path")]
    #[test_case("closure (<unknown>:0)", "<unknown>", "0" ; "unresolved")]
    fn parses_frame_locations(frame: &str, file: &str, line: &str) {
        assert_eq!(
            parse_frame_location(frame, true).unwrap(),
            (file.to_string(), line.to_string())
        );
    }

    #[test_case("no location" ; "no parens")]
    #[test_case("a (src/lib.rs:12" ; "unterminated")]
    #[test_case("a (src/lib.rs)" ; "no line")]
    #[test_case("a (src/lib.rs:twelve)" ; "non numeric line")]
    #[test_case("a (:12)" ; "empty file")]
    fn rejects_malformed_frames(frame: &str) {
        assert!(parse_frame_location(frame, true).is_err());
        assert!(parse_frame_location(frame, false).is_err());
    }

    #[test]
    fn renders_std_backtrace_text() {
        let text = "   0: shop::api::handle\n             at ./src/api.rs:7:5\n   1: main\n   2: std::rt::lang_start\n             at /rustc/library/std/src/rt.rs:195:17\n";
        assert_eq!(
            render_backtrace(text),
            vec![
                "shop::api::handle (./src/api.rs:7)".to_string(),
                "main (<unknown>:0)".to_string(),
                "std::rt::lang_start (/rustc/library/std/src/rt.rs:195)".to_string(),
            ]
        );
    }

    #[test]
    fn signature_is_module_slash_method() {
        assert_eq!(target().signature(), "cloud.hello.Greeter/SayHello");
    }
}
