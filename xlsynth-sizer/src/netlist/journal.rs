// SPDX-License-Identifier: Apache-2.0

//! Undo log for netlist edits.
//!
//! While a transaction is open every primitive mutation appends the data
//! needed to invert it. Rollback replays the entries newest first. A
//! committed log can also be kept on the saved stack, so accepted edits can
//! be backed out later one transaction at a time.

use super::{Instance, InstId, Net, NetId, Orientation, Pin, PinId, Point, SignalType};
use crate::liberty::CellId;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JournalEntry {
    SwapCell {
        inst: InstId,
        prev_cell: CellId,
        prev_pins: Vec<PinId>,
    },
    Connect {
        pin: PinId,
        net: NetId,
    },
    Disconnect {
        pin: PinId,
        net: NetId,
        /// Index of the pin in the net's pin list before removal.
        position: usize,
    },
    CreatePort {
        pin: PinId,
    },
    CreateNet {
        net: NetId,
    },
    DestroyNet {
        net: NetId,
        saved: Net,
    },
    CreateInstance {
        inst: InstId,
        pins: Vec<PinId>,
    },
    DestroyInstance {
        inst: InstId,
        saved: Instance,
        saved_pins: Vec<(PinId, Pin)>,
    },
    Move {
        inst: InstId,
        prev: Point,
    },
    Orient {
        inst: InstId,
        prev: Orientation,
    },
    InstanceDontTouch {
        inst: InstId,
        prev: bool,
    },
    NetDontTouch {
        net: NetId,
        prev: bool,
    },
    NetSignalType {
        net: NetId,
        prev: SignalType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalError {
    AlreadyOpen,
    NotOpen,
    NothingSaved,
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::AlreadyOpen => f.write_str("a transaction is already open"),
            JournalError::NotOpen => f.write_str("no transaction is open"),
            JournalError::NothingSaved => f.write_str("no saved transaction to restore"),
        }
    }
}

impl std::error::Error for JournalError {}

#[derive(Debug, Default)]
pub(crate) struct Journal {
    open: Option<Vec<JournalEntry>>,
    saved: Vec<Vec<JournalEntry>>,
}

impl Journal {
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn begin(&mut self) -> Result<(), JournalError> {
        if self.open.is_some() {
            return Err(JournalError::AlreadyOpen);
        }
        self.open = Some(Vec::new());
        Ok(())
    }

    /// Appends to the open log. Edits made outside a transaction invalidate
    /// the saved stack because its logs no longer describe the state they
    /// would be undone from.
    pub fn record(&mut self, entry: JournalEntry) {
        match self.open.as_mut() {
            Some(log) => log.push(entry),
            None => {
                if !self.saved.is_empty() {
                    log::debug!(
                        "untracked netlist edit; dropping {} saved transactions",
                        self.saved.len()
                    );
                    self.saved.clear();
                }
            }
        }
    }

    pub fn take_open(&mut self) -> Result<Vec<JournalEntry>, JournalError> {
        self.open.take().ok_or(JournalError::NotOpen)
    }

    pub fn commit(&mut self) -> Result<(), JournalError> {
        let log = self.take_open()?;
        if !log.is_empty() && !self.saved.is_empty() {
            log::debug!(
                "unsaved commit; dropping {} saved transactions",
                self.saved.len()
            );
            self.saved.clear();
        }
        Ok(())
    }

    pub fn commit_saved(&mut self) -> Result<(), JournalError> {
        let log = self.take_open()?;
        self.saved.push(log);
        Ok(())
    }

    pub fn pop_saved(&mut self) -> Result<Vec<JournalEntry>, JournalError> {
        if self.open.is_some() {
            return Err(JournalError::AlreadyOpen);
        }
        self.saved.pop().ok_or(JournalError::NothingSaved)
    }

    pub fn discard_saved(&mut self) {
        self.saved.clear();
    }

    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untracked_edit_drops_saved_logs() {
        let mut j = Journal::default();
        j.begin().unwrap();
        j.record(JournalEntry::CreateNet { net: NetId(0) });
        j.commit_saved().unwrap();
        assert_eq!(j.saved_count(), 1);
        j.record(JournalEntry::CreateNet { net: NetId(1) });
        assert_eq!(j.saved_count(), 0);
    }

    #[test]
    fn empty_commit_keeps_saved_logs() {
        let mut j = Journal::default();
        j.begin().unwrap();
        j.commit_saved().unwrap();
        j.begin().unwrap();
        j.commit().unwrap();
        assert_eq!(j.saved_count(), 1);
    }

    #[test]
    fn cannot_restore_while_open() {
        let mut j = Journal::default();
        j.begin().unwrap();
        j.commit_saved().unwrap();
        j.begin().unwrap();
        assert_eq!(j.pop_saved(), Err(JournalError::AlreadyOpen));
    }
}
