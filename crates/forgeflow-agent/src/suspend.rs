/// Decision closing out a review round, resolved by the UI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    ApplyFix,
    Skip,
}

/// Decision closing out a debate round, resolved by the UI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateDecision {
    Revise,
    Accept,
}

/// Cooperative single-handle suspension primitive. Only one handle is
/// active at a time; `resolve` fulfills it, `reset` fulfills it with the
/// safe default instead of leaving it dangling.
#[derive(Debug, Default)]
pub struct Suspender<D> {
    slot: Option<D>,
}

impl<D: Copy> Suspender<D> {
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn resolve(&mut self, decision: D) {
        self.slot = Some(decision);
    }

    /// Consumes the pending decision, if any.
    pub fn take(&mut self) -> Option<D> {
        self.slot.take()
    }

    pub fn is_pending(&self) -> bool {
        // A handle is "active" (awaiting) precisely while the engine sits
        // in a Waiting* state; `slot` only holds a value once resolved.
        self.slot.is_none()
    }

    /// Fulfills any outstanding handle with `default`, guaranteeing no
    /// unfulfilled handle survives a reset.
    pub fn reset(&mut self, default: D) -> D {
        self.slot.take().unwrap_or(default)
    }
}
