//! Stream-event post-processing shared by all adapters.

/// Terminal sentinel carried in the data field of the final upstream event.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Suppresses provider noise at the head of a stream: some upstreams open
/// with one or two newline-only deltas before real content. The filter drops
/// newline-only fragments while the first two non-empty fragments go by, then
/// passes everything through untouched. Heuristic carried over from the
/// upstream providers' observed behavior; providers that never emit leading
/// newlines are unaffected.
#[derive(Debug, Default)]
pub struct DeltaFilter {
    seen: u32,
}

impl DeltaFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `fragment` is forwarded. Empty fragments are never
    /// forwarded and do not advance the suppression window.
    pub fn admit<'a>(&mut self, fragment: &'a str) -> Option<&'a str> {
        if fragment.is_empty() {
            return None;
        }
        let in_window = self.seen < 2;
        self.seen += 1;
        if in_window && fragment.chars().all(|c| c == '\n') {
            return None;
        }
        Some(fragment)
    }
}
