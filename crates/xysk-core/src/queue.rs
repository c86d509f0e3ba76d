// ── Pending critical command ──
//
// Holds at most one critical command while the socket is down. A newer
// critical command overwrites the stored one. The entry rides exactly one
// connection attempt: it is replayed when that attempt opens and dropped
// when it fails. A REST mirror of the entry may settle it first.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use xysk_api::Command;

/// Commands worth carrying across a reconnect.
///
/// Everything else is best-effort: sent if open, otherwise routed over HTTP
/// or dropped.
pub fn is_critical(command: &Command) -> bool {
    matches!(
        command,
        Command::GetStatus | Command::PowerOutput { .. } | Command::SetOutputState { .. }
    )
}

#[derive(Debug)]
struct Entry {
    command: Command,
    /// Socket generation of the attempt that will carry this command.
    attempt: Option<u64>,
    /// REST mirror id, when the command was also handed to HTTP.
    mirror: Option<u64>,
}

/// Single-slot holder for the latest critical command.
#[derive(Debug, Default)]
pub struct PendingCritical {
    slot: Option<Entry>,
    current_mirror: Arc<AtomicU64>,
}

impl PendingCritical {
    /// Store `command`, returning the one it superseded.
    ///
    /// `mirror` is the id of a REST request issued for the same command.
    pub fn store(&mut self, command: Command, mirror: Option<u64>) -> Option<Command> {
        let old = self.slot.replace(Entry {
            command,
            attempt: None,
            mirror,
        });
        self.sync_mirror();
        old.map(|e| e.command)
    }

    /// Tie the stored command to the connection attempt `generation`.
    pub fn bind(&mut self, generation: u64) {
        if let Some(entry) = &mut self.slot {
            entry.attempt = Some(generation);
        }
    }

    /// Remove the stored command for replay.
    pub fn take(&mut self) -> Option<Command> {
        let taken = self.slot.take().map(|e| e.command);
        self.sync_mirror();
        taken
    }

    pub fn clear(&mut self) {
        self.slot = None;
        self.sync_mirror();
    }

    /// Drop the stored command if it was riding the failed attempt `generation`.
    ///
    /// A REST mirror already issued for it still goes out.
    pub fn expire(&mut self, generation: u64) -> Option<Command> {
        if self
            .slot
            .as_ref()
            .is_some_and(|e| e.attempt == Some(generation))
        {
            return self.abandon();
        }
        None
    }

    /// Drop the stored command without retiring its REST mirror.
    pub fn abandon(&mut self) -> Option<Command> {
        self.slot.take().map(|e| e.command)
    }

    /// Drop the stored command if REST request `mirror` delivered it.
    pub fn settle(&mut self, mirror: u64) -> Option<Command> {
        if self.slot.as_ref().is_some_and(|e| e.mirror == Some(mirror)) {
            return self.take();
        }
        None
    }

    pub fn peek(&self) -> Option<&Command> {
        self.slot.as_ref().map(|e| &e.command)
    }

    /// Shared view of which REST mirror is still wanted.
    ///
    /// Reads `0` when nothing is pending or the pending command has no
    /// mirror. Lets the HTTP worker skip mirrors that went stale while
    /// they waited their turn.
    pub fn mirror_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.current_mirror)
    }

    fn sync_mirror(&self) {
        let id = self.slot.as_ref().and_then(|e| e.mirror).unwrap_or(0);
        self.current_mirror.store(id, Ordering::SeqCst);
    }
}
