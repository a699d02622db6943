use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Single-slot, non-blocking lock that keeps at most one frame inside
/// detection, drawing and collection at a time.
///
/// The capture thread calls [`FrameGate::try_acquire`] for every frame and skips the frame when
/// the slot is taken. The returned [`FramePermit`] travels with the frame and frees the slot when
/// dropped, wherever that happens.
#[derive(Clone, Debug, Default)]
pub struct FrameGate {
    busy: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct FramePermit {
    busy: Arc<AtomicBool>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<FramePermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FramePermit {
                busy: self.busy.clone(),
            })
    }

    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FramePermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
