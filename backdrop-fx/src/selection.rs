//! User background selection handed from the UI thread to the worker.

use crate::background::BackgroundMode;
use parking_lot::Mutex;

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub mode: BackgroundMode,
    /// Show the raw mask instead of the composite.
    pub debug_mask: bool,
}

#[derive(Debug, Default)]
struct Slot {
    selection: Selection,
    dirty: bool,
}

/// Single-slot "latest command" cell.
///
/// The UI writes whenever it likes; the worker takes the value at most once
/// per frame. Writes between two takes collapse to the last one.
#[derive(Debug, Default)]
pub struct SelectionSlot {
    slot: Mutex<Slot>,
}

impl SelectionSlot {
    pub fn new(initial: Selection) -> Self {
        Self {
            slot: Mutex::new(Slot {
                selection: initial,
                dirty: false,
            }),
        }
    }

    /// Latest requested selection, applied or not.
    pub fn current(&self) -> Selection {
        self.slot.lock().selection
    }

    pub fn set_mode(&self, mode: BackgroundMode) {
        self.update(|s| s.mode = mode);
    }

    pub fn set_debug_mask(&self, on: bool) {
        self.update(|s| s.debug_mask = on);
    }

    /// Flip the debug flag and return its new value.
    pub fn toggle_debug_mask(&self) -> bool {
        let mut on = false;
        self.update(|s| {
            s.debug_mask = !s.debug_mask;
            on = s.debug_mask;
        });
        on
    }

    /// Take the selection if it changed since the last take.
    pub fn take(&self) -> Option<Selection> {
        let mut slot = self.slot.lock();
        if slot.dirty {
            slot.dirty = false;
            Some(slot.selection)
        } else {
            None
        }
    }

    fn update(&self, f: impl FnOnce(&mut Selection)) {
        let mut slot = self.slot.lock();
        f(&mut slot.selection);
        slot.dirty = true;
    }
}
