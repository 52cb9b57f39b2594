use serde::Serialize;
use std::collections::BTreeSet;

/// Which slides withhold forward navigation until an intervention is done.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LockPolicy {
    /// Lock once, on the last slide of the deck.
    #[default]
    FinalSlide,
    /// Lock on every even slide (2, 4, 6, ...), pacing questions through the deck.
    EverySecondSlide,
    /// Lock on an explicit set of slides. Slides past the end of the deck are ignored.
    Slides(BTreeSet<u32>),
    /// Never lock.
    None,
}

impl LockPolicy {
    /// Resolves the policy against a deck with `total_slides` slides.
    pub fn trigger_slides(&self, total_slides: u32) -> BTreeSet<u32> {
        match self {
            LockPolicy::FinalSlide => BTreeSet::from([total_slides]),
            LockPolicy::EverySecondSlide => (2..=total_slides).step_by(2).collect(),
            LockPolicy::Slides(slides) => slides
                .iter()
                .copied()
                .filter(|s| (1..=total_slides).contains(s))
                .collect(),
            LockPolicy::None => BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The page changed; carries the new slide number.
    Advanced(u32),
    /// The current slide is a trigger slide. The gate is now locked.
    LockTriggered(u32),
    /// Advanced past the last slide. The page stays where it is.
    Finished,
    /// Nothing happened: already locked or no deck loaded.
    Refused,
}

/// Page navigation with a lock gate at trigger slides.
#[derive(Debug, Clone, Serialize)]
pub struct SlideGate {
    current_slide: u32,
    total_slides: Option<u32>,
    lock_trigger_slides: BTreeSet<u32>,
    unlocked_slides: BTreeSet<u32>,
    locked: bool,
    #[serde(skip)]
    policy: LockPolicy,
}

impl SlideGate {
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            current_slide: 1,
            total_slides: None,
            lock_trigger_slides: BTreeSet::new(),
            unlocked_slides: BTreeSet::new(),
            locked: false,
            policy,
        }
    }

    /// Called once the presentation surface has loaded the deck.
    pub fn document_loaded(&mut self, total_slides: u32) {
        let total_slides = total_slides.max(1);
        self.total_slides = Some(total_slides);
        self.lock_trigger_slides = self.policy.trigger_slides(total_slides);
        self.unlocked_slides.clear();
        self.current_slide = 1;
        self.locked = false;
    }

    pub fn request_advance(&mut self) -> AdvanceOutcome {
        let Some(total) = self.total_slides else {
            return AdvanceOutcome::Refused;
        };
        if self.locked {
            return AdvanceOutcome::Refused;
        }
        let slide = self.current_slide;
        if self.lock_trigger_slides.contains(&slide) && !self.unlocked_slides.contains(&slide) {
            self.locked = true;
            return AdvanceOutcome::LockTriggered(slide);
        }
        if slide >= total {
            return AdvanceOutcome::Finished;
        }
        self.current_slide += 1;
        AdvanceOutcome::Advanced(self.current_slide)
    }

    /// Moves back one slide. Never gated.
    pub fn request_retreat(&mut self) -> u32 {
        self.current_slide = self.current_slide.saturating_sub(1).max(1);
        self.current_slide
    }

    /// Marks the current slide as passed. A slide unlocked once never locks again.
    pub fn unlock(&mut self) {
        self.unlocked_slides.insert(self.current_slide);
        self.locked = false;
    }

    pub fn current_slide(&self) -> u32 {
        self.current_slide
    }

    pub fn total_slides(&self) -> Option<u32> {
        self.total_slides
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock_trigger_slides(&self) -> &BTreeSet<u32> {
        &self.lock_trigger_slides
    }

    pub fn unlocked_slides(&self) -> &BTreeSet<u32> {
        &self.unlocked_slides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_with(policy: LockPolicy, total: u32) -> SlideGate {
        let mut gate = SlideGate::new(policy);
        gate.document_loaded(total);
        gate
    }

    #[test]
    fn test_policies_resolve_trigger_slides() {
        assert_eq!(LockPolicy::FinalSlide.trigger_slides(6), BTreeSet::from([6]));
        assert_eq!(
            LockPolicy::EverySecondSlide.trigger_slides(7),
            BTreeSet::from([2, 4, 6])
        );
        assert_eq!(
            LockPolicy::Slides(BTreeSet::from([0, 3, 9])).trigger_slides(6),
            BTreeSet::from([3])
        );
        assert!(LockPolicy::None.trigger_slides(6).is_empty());
    }

    #[test]
    fn test_advance_refused_before_document_loads() {
        let mut gate = SlideGate::new(LockPolicy::FinalSlide);
        assert_eq!(gate.request_advance(), AdvanceOutcome::Refused);
        assert_eq!(gate.current_slide(), 1);
    }

    #[test]
    fn test_lock_fires_once_then_refuses_silently() {
        let mut gate = gate_with(LockPolicy::EverySecondSlide, 6);
        assert_eq!(gate.request_advance(), AdvanceOutcome::Advanced(2));
        assert_eq!(gate.request_advance(), AdvanceOutcome::LockTriggered(2));
        assert!(gate.is_locked());
        assert_eq!(gate.request_advance(), AdvanceOutcome::Refused);
        assert_eq!(gate.request_advance(), AdvanceOutcome::Refused);
        assert_eq!(gate.current_slide(), 2);
    }

    #[test]
    fn test_unlocked_slide_never_relocks() {
        let mut gate = gate_with(LockPolicy::EverySecondSlide, 6);
        gate.request_advance();
        gate.request_advance();
        gate.unlock();
        gate.unlock();
        assert_eq!(gate.request_advance(), AdvanceOutcome::Advanced(3));
        assert_eq!(gate.request_retreat(), 2);
        assert_eq!(gate.request_advance(), AdvanceOutcome::Advanced(3));
    }

    #[test]
    fn test_retreat_is_never_gated() {
        let mut gate = gate_with(LockPolicy::EverySecondSlide, 6);
        gate.request_advance();
        assert_eq!(gate.request_advance(), AdvanceOutcome::LockTriggered(2));
        assert_eq!(gate.request_retreat(), 1);
        assert_eq!(gate.request_retreat(), 1);
    }

    #[test]
    fn test_end_of_deck_without_lock_finishes() {
        let mut gate = gate_with(LockPolicy::None, 1);
        assert_eq!(gate.request_advance(), AdvanceOutcome::Finished);
        assert_eq!(gate.current_slide(), 1);
    }

    #[test]
    fn test_final_slide_lock_and_end_of_deck() {
        let mut gate = gate_with(LockPolicy::FinalSlide, 3);
        assert_eq!(gate.request_advance(), AdvanceOutcome::Advanced(2));
        assert_eq!(gate.request_advance(), AdvanceOutcome::Advanced(3));
        assert_eq!(gate.request_advance(), AdvanceOutcome::LockTriggered(3));
        gate.unlock();
        assert_eq!(gate.request_advance(), AdvanceOutcome::Finished);
        assert_eq!(gate.current_slide(), 3);
        assert!(!gate.is_locked());
    }

    #[test]
    fn test_document_reload_resets_navigation() {
        let mut gate = gate_with(LockPolicy::FinalSlide, 2);
        gate.request_advance();
        gate.request_advance();
        gate.unlock();
        gate.document_loaded(4);
        assert_eq!(gate.current_slide(), 1);
        assert!(gate.unlocked_slides().is_empty());
        assert_eq!(gate.lock_trigger_slides(), &BTreeSet::from([4]));
    }
}
