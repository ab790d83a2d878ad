/// Editor state machine
///
/// [`State`] is a small immutable snapshot of recent editor events. Every
/// transition takes the current value and returns a new one; nothing is
/// mutated in place, so the single event-handling path that owns the state
/// can never observe a half-applied update.
///
/// The flags exist to tell organic typing apart from text changes the
/// completion engine caused itself:
///
/// - a typed character sets `char_inserted`
/// - accepting a completion sets `comp_inserted`
/// - the following text-changed event consults [`State::natural_insertable`]
///   and then clears both flags
use crate::settings::Settings;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct State {
    pub char_inserted: bool,
    pub comp_inserted: bool,
    /// Sources currently toggled on
    pub sources: BTreeSet<String>,
}

impl State {
    /// Initial state with every configured-enabled source active
    pub fn initial(settings: &Settings) -> Self {
        Self {
            char_inserted: false,
            comp_inserted: false,
            sources: settings.enabled_sources(),
        }
    }

    /// A printable character was just typed
    #[must_use]
    pub fn char_inserted(&self) -> Self {
        Self {
            char_inserted: true,
            ..self.clone()
        }
    }

    /// A completion was just inserted into the buffer
    #[must_use]
    pub fn comp_inserted(&self) -> Self {
        Self {
            comp_inserted: true,
            ..self.clone()
        }
    }

    /// Consume one text-changed event
    ///
    /// Always applied after [`Self::natural_insertable`] was evaluated,
    /// whatever its outcome. The completion suppression is one-shot.
    #[must_use]
    pub fn text_changed(&self) -> Self {
        Self {
            char_inserted: false,
            comp_inserted: false,
            ..self.clone()
        }
    }

    /// Whether the pending text change is organic typing
    ///
    /// A completion insertion wins over a keystroke in the same cycle.
    pub fn natural_insertable(&self) -> bool {
        self.char_inserted && !self.comp_inserted
    }

    /// Replace the active source set
    #[must_use]
    pub fn set_sources(&self, sources: BTreeSet<String>) -> Self {
        Self {
            sources,
            ..self.clone()
        }
    }

    /// Flip each named source on or off
    #[must_use]
    pub fn toggle_sources<I, S>(&self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut active = self.sources.clone();
        for source in sources {
            let source = source.into();
            if !active.remove(&source) {
                active.insert(source);
            }
        }
        self.set_sources(active)
    }
}
