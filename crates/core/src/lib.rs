pub mod api;
pub mod conversation;
pub mod feedback;
pub mod intervention;
pub mod navigation;
pub mod recording;
pub mod session_state;
pub mod speech;
pub mod store;
pub mod timestamps;

/// Represents commands that the core logic (`PresentationSession`) issues to the runtime.
///
/// The session never talks to the speech player or the presentation surface
/// directly. It decides what should happen and the runtime carries it out.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Speak the given text to the presenter.
    SpeakText(String),
    /// The presentation surface should show this slide.
    SlideAdvanced(u32),
    /// Forward navigation was withheld at this slide; an intervention follows.
    SlideLocked(u32),
    /// The presenter advanced past the last slide.
    DeckFinished,
    /// Both intervention questions were answered. `auto_unlocked` is true when
    /// the gate was already lifted without waiting for the surface.
    InterventionComplete { auto_unlocked: bool },
    /// The intervention could not be started. The gate stays locked.
    InterventionFailed(String),
}
