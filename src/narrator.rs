use crate::route_vector::RouteStep;

const FALLBACK_INSTRUCTION: &str = "Continue on the current route";

/// Speech output capability, implemented by the host shell.
pub trait SpeechOutput: Send {
    fn speak(&mut self, text: &str);
    /// Cancel anything queued or in flight.
    fn cancel_all(&mut self);
}

/// Announces the active step exactly once per step change. The mute flag is a
/// process-wide setting persisted by the caller (see `prefs_db`).
pub struct Narrator {
    muted: bool,
    last_spoken_step: Option<usize>,
}

impl Narrator {
    pub fn new(muted: bool) -> Self {
        Narrator {
            muted,
            last_spoken_step: None,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn last_spoken_step(&self) -> Option<usize> {
        self.last_spoken_step
    }

    /// Forget the announced index. Called on travel start, stop and reroute so
    /// the first step of a new route is narrated again.
    pub fn reset(&mut self) {
        self.last_spoken_step = None;
    }

    /// Speak the instruction for `step_index` if it has not been announced
    /// yet. Returns whether anything was spoken.
    pub fn announce_step(
        &mut self,
        travelling: bool,
        paused: bool,
        steps: &[RouteStep],
        step_index: usize,
        speech: &mut dyn SpeechOutput,
    ) -> bool {
        if !travelling || paused || self.muted {
            return false;
        }
        if self.last_spoken_step == Some(step_index) {
            return false;
        }
        let text = steps
            .get(step_index)
            .and_then(|s| s.instruction.as_deref())
            .unwrap_or(FALLBACK_INSTRUCTION);

        speech.cancel_all();
        speech.speak(text);
        self.last_spoken_step = Some(step_index);
        debug!("narrated step {}: {}", step_index, text);
        true
    }
}
