//! Transition renderer
//!
//! Cooperative: the controller calls [`Renderer::step`] once per tick and
//! gets back the frame to send. Between two frames the text fields wipe
//! left to right, one glyph at a time, in proportion to elapsed time.
//! Line and zone numbers flip at the halfway point.
//!
//! A transition only counts as complete once `step` has handed out the
//! settled target frame; time running out is not enough.

use heapless::Vec;

use headsign_protocol::charmap::glyphs;

use super::frame::DisplayFrame;

/// Ticket for one transition
///
/// Only the most recent transition can complete; starting another one
/// abandons the previous handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionHandle {
    generation: u32,
    started_ms: u64,
    duration_ms: u64,
}

impl TransitionHandle {
    /// Monotonic time at which the target is fully drawn
    pub fn settles_at_ms(&self) -> u64 {
        self.started_ms.saturating_add(self.duration_ms)
    }
}

#[derive(Debug, Clone)]
struct Transition {
    from: DisplayFrame,
    to: DisplayFrame,
    handle: TransitionHandle,
}

/// Frame-by-frame transition renderer
#[derive(Debug, Clone)]
pub struct Renderer {
    /// Last emitted frame
    current: DisplayFrame,
    active: Option<Transition>,
    generation: u32,
    /// Generation whose target frame `step` has emitted
    settled: Option<u32>,
}

impl Renderer {
    /// Create a renderer that considers `initial` already on screen
    pub fn new(initial: DisplayFrame) -> Self {
        Self {
            current: initial,
            active: None,
            generation: 0,
            settled: None,
        }
    }

    /// Start a transition from the last emitted frame to `to`
    ///
    /// Abandons any transition in flight; the new one starts from whatever
    /// intermediate frame was last emitted.
    pub fn begin(&mut self, to: DisplayFrame, duration_ms: u64, now_ms: u64) -> TransitionHandle {
        self.generation = self.generation.wrapping_add(1);
        let handle = TransitionHandle {
            generation: self.generation,
            started_ms: now_ms,
            duration_ms,
        };
        if self.active.is_some() {
            debug!("render: transition abandoned");
        }
        self.settled = None;
        self.active = Some(Transition {
            from: self.current.clone(),
            to,
            handle,
        });
        handle
    }

    /// Replace the screen immediately, abandoning any transition
    pub fn show(&mut self, frame: DisplayFrame) {
        self.generation = self.generation.wrapping_add(1);
        self.active = None;
        self.settled = None;
        self.current = frame;
    }

    /// Advance the active transition and return the frame to emit
    ///
    /// Returns `None` when there is nothing in flight.
    pub fn step(&mut self, now_ms: u64) -> Option<&DisplayFrame> {
        let transition = self.active.as_ref()?;
        let handle = transition.handle;
        let elapsed = now_ms.saturating_sub(handle.started_ms);

        if elapsed >= handle.duration_ms {
            if let Some(done) = self.active.take() {
                self.current = done.to;
                self.settled = Some(handle.generation);
            }
        } else {
            self.current = interpolate(&transition.from, &transition.to, elapsed, handle.duration_ms);
        }
        Some(&self.current)
    }

    /// Whether `step` has emitted the settled target of `handle`
    pub fn is_complete(&self, handle: &TransitionHandle) -> bool {
        handle.generation == self.generation && self.settled == Some(handle.generation)
    }

    /// Whether the transition in flight has run its full duration and only
    /// waits for `step` to emit the target
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|t| now_ms >= t.handle.settles_at_ms())
    }

    /// Whether a transition is in flight
    pub fn in_transition(&self) -> bool {
        self.active.is_some()
    }

    /// Last emitted frame
    pub fn current(&self) -> &DisplayFrame {
        &self.current
    }

    /// Target of the transition in flight
    pub fn target(&self) -> Option<&DisplayFrame> {
        self.active.as_ref().map(|t| &t.to)
    }
}

fn interpolate(from: &DisplayFrame, to: &DisplayFrame, elapsed: u64, duration: u64) -> DisplayFrame {
    let past_half = elapsed.saturating_mul(2) >= duration;
    DisplayFrame {
        line_number: if past_half { to.line_number } else { from.line_number },
        tarif_zone: if past_half { to.tarif_zone } else { from.tarif_zone },
        intro: wipe(&from.intro, &to.intro, elapsed, duration),
        text: wipe(&from.text, &to.text, elapsed, duration),
        hint: wipe(&from.hint, &to.hint, elapsed, duration),
    }
}

/// Target glyphs up to the wipe edge, source glyphs after it
fn wipe<const N: usize>(from: &[u8], to: &[u8], elapsed: u64, duration: u64) -> Vec<u8, N> {
    let span = glyphs(from).count().max(glyphs(to).count()) as u64;
    let edge = if duration == 0 {
        span
    } else {
        span.saturating_mul(elapsed.min(duration)) / duration
    } as usize;

    let mut out = Vec::new();
    for glyph in glyphs(to).take(edge).chain(glyphs(from).skip(edge)) {
        if out.extend_from_slice(glyph).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(text: &str) -> DisplayFrame {
        DisplayFrame::compose(1, 1, "", text, "")
    }

    #[test]
    fn test_wipe_progress() {
        let from = b"aaaa";
        let to = b"bbbb";
        assert_eq!(wipe::<8>(from, to, 0, 4).as_slice(), b"aaaa");
        assert_eq!(wipe::<8>(from, to, 1, 4).as_slice(), b"baaa");
        assert_eq!(wipe::<8>(from, to, 2, 4).as_slice(), b"bbaa");
        assert_eq!(wipe::<8>(from, to, 4, 4).as_slice(), b"bbbb");
    }

    #[test]
    fn test_wipe_unequal_lengths() {
        assert_eq!(wipe::<8>(b"abcd", b"x", 2, 4).as_slice(), b"xcd");
        assert_eq!(wipe::<8>(b"a", b"wxyz", 2, 4).as_slice(), b"wx");
    }

    #[test]
    fn test_wipe_keeps_escapes_whole() {
        let from = [0x0E, 0x87, 0x0E, 0x87];
        let to = b"zz";
        // One of two glyphs replaced
        assert_eq!(wipe::<8>(&from, to, 1, 2).as_slice(), &[b'z', 0x0E, 0x87]);
    }

    #[test]
    fn test_transition_settles() {
        let mut renderer = Renderer::new(frame("old"));
        let handle = renderer.begin(frame("new"), 1000, 0);

        let mid = renderer.step(500).unwrap().clone();
        assert_ne!(mid, frame("old"));
        assert_ne!(mid, frame("new"));
        assert!(!renderer.is_complete(&handle));

        assert_eq!(renderer.step(1000), Some(&frame("new")));
        assert!(renderer.is_complete(&handle));
        assert!(!renderer.in_transition());
        assert_eq!(renderer.step(1100), None);
    }

    #[test]
    fn test_not_complete_until_target_emitted() {
        let mut renderer = Renderer::new(frame("old"));
        let handle = renderer.begin(frame("new"), 1000, 0);
        assert!(!renderer.is_due(999));
        assert!(renderer.is_due(5000));
        // Time alone does not complete it
        assert!(!renderer.is_complete(&handle));

        assert_eq!(renderer.step(5000), Some(&frame("new")));
        assert!(renderer.is_complete(&handle));
        assert!(!renderer.is_due(6000));
    }

    #[test]
    fn test_restart_from_last_emitted() {
        let mut renderer = Renderer::new(frame("aaaa"));
        let first = renderer.begin(frame("bbbb"), 4, 0);
        let emitted = renderer.step(2).unwrap().clone();
        assert_eq!(emitted.text.as_slice(), b"bbaa");

        let second = renderer.begin(frame("cccc"), 4, 2);
        assert_eq!(renderer.step(3).unwrap().text.as_slice(), b"cbaa");
        assert_eq!(renderer.step(6).unwrap(), &frame("cccc"));
        assert!(!renderer.is_complete(&first));
        assert!(renderer.is_complete(&second));
    }

    #[test]
    fn test_zero_duration_settles_on_first_step() {
        let mut renderer = Renderer::new(frame("a"));
        let handle = renderer.begin(frame("b"), 0, 10);
        assert_eq!(renderer.step(10), Some(&frame("b")));
        assert!(renderer.is_complete(&handle));
    }

    #[test]
    fn test_show_abandons() {
        let mut renderer = Renderer::new(frame("a"));
        let handle = renderer.begin(frame("b"), 100, 0);
        renderer.show(frame("c"));
        assert!(!renderer.is_complete(&handle));
        assert!(!renderer.is_due(1000));
        assert_eq!(renderer.current(), &frame("c"));
        assert_eq!(renderer.step(1000), None);
    }

    #[test]
    fn test_numbers_flip_at_half() {
        let mut renderer = Renderer::new(DisplayFrame::compose(1, 10, "", "a", ""));
        renderer.begin(DisplayFrame::compose(2, 20, "", "b", ""), 100, 0);
        assert_eq!(renderer.step(49).unwrap().line_number, 1);
        assert_eq!(renderer.step(50).unwrap().tarif_zone, 20);
    }

    proptest! {
        #[test]
        fn prop_intermediate_never_splits(
            from in "[a-zčřš ]{0,30}",
            to in "[a-zěžý ]{0,30}",
            elapsed in 0u64..1000,
        ) {
            let mut renderer = Renderer::new(frame(&from));
            renderer.begin(frame(&to), 1000, 0);
            let out = renderer.step(elapsed).unwrap();
            // Every 0x0E in the output is followed by a glyph byte
            let bytes = out.text.as_slice();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == 0x0E {
                    prop_assert!(i + 1 < bytes.len());
                    i += 2;
                } else {
                    i += 1;
                }
            }
        }
    }
}
