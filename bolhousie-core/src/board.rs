//! Player-local ticket and marks. Claims are checked here before anything goes on the wire.

use std::collections::HashSet;

use crate::claim::{self, ClaimKind};
use crate::protocol::ClaimPayload;
use crate::ticket::Ticket;

#[derive(Debug, Clone)]
pub struct PlayerBoard {
    ticket: Ticket,
    marked: HashSet<String>,
}

impl PlayerBoard {
    pub fn new(ticket: Ticket) -> Self {
        Self {
            ticket,
            marked: HashSet::new(),
        }
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn marked(&self) -> &HashSet<String> {
        &self.marked
    }

    pub fn is_marked(&self, item_id: &str) -> bool {
        self.marked.contains(item_id)
    }

    /// Flip the mark on a ticket cell. Returns the new mark, or `None` if the item is not on
    /// this ticket.
    pub fn toggle(&mut self, item_id: &str) -> Option<bool> {
        if !self.ticket.contains(item_id) {
            return None;
        }
        if self.marked.remove(item_id) {
            Some(false)
        } else {
            self.marked.insert(item_id.to_string());
            Some(true)
        }
    }

    /// Build the CLAIM payload if the marks satisfy `kind`.
    pub fn claim(&self, kind: ClaimKind, player_name: &str) -> Result<ClaimPayload, ClaimRejected> {
        if !claim::validate(&self.ticket, &self.marked, kind) {
            return Err(ClaimRejected(kind));
        }
        Ok(ClaimPayload {
            claim_type: kind,
            player_name: Some(player_name.to_string()),
        })
    }
}

/// Local rejection shown to the player. Never sent to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("You don't have a valid {0} yet! Check your ticket.")]
pub struct ClaimRejected(pub ClaimKind);
