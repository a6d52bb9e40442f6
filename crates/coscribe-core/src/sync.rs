//! Wire formats and the pub/sub transport contract.
//!
//! Two channels exist. The cursor channel carries presence updates (with the
//! author's in-progress stroke attached) and stroke commits, told apart by
//! their shape. The delete channel carries plain lists of stroke ids.

use crate::presence::UserInfo;
use crate::registry::AuthorId;
use crate::stroke::{StrokeError, StrokeId, StrokePayload};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use thiserror::Error;

/// Errors decoding or applying a remote message.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid stroke: {0}")]
    Stroke(#[from] StrokeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorData {
    pub user: UserInfo,
    #[serde(rename = "currentLine", default, skip_serializing_if = "Option::is_none")]
    pub current_line: Option<StrokePayload>,
}

/// `{position: {x, y}, data: {user, currentLine?}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorUpdate {
    pub position: WirePosition,
    pub data: CursorData,
}

/// A finalized stroke and the participant who drew it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitMessage {
    pub author: AuthorId,
    pub line: StrokePayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Cursor,
    Delete,
}

/// A raw message as carried by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub channel: Channel,
    pub payload: String,
}

/// Shapes accepted on the cursor channel. Commits are tried first since a
/// cursor update never carries `author` and `line`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CursorChannelMessage {
    Commit(CommitMessage),
    Cursor(CursorUpdate),
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Cursor(CursorUpdate),
    Commit(CommitMessage),
    Delete(Vec<StrokeId>),
}

impl Message {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, WireError> {
        Ok(match envelope.channel {
            Channel::Cursor => match serde_json::from_str(&envelope.payload)? {
                CursorChannelMessage::Commit(commit) => Message::Commit(commit),
                CursorChannelMessage::Cursor(update) => Message::Cursor(update),
            },
            Channel::Delete => Message::Delete(serde_json::from_str(&envelope.payload)?),
        })
    }

    pub fn to_envelope(&self) -> Result<Envelope, WireError> {
        let (channel, payload) = match self {
            Message::Cursor(update) => (Channel::Cursor, serde_json::to_string(update)?),
            Message::Commit(commit) => (Channel::Cursor, serde_json::to_string(commit)?),
            Message::Delete(ids) => (Channel::Delete, serde_json::to_string(ids)?),
        };
        Ok(Envelope { channel, payload })
    }
}

/// Fire-and-forget pub/sub connection.
///
/// Delivery is at most once, in no particular order, possibly duplicated.
/// Implementations never deliver a peer's own messages back to it.
pub trait Transport {
    /// Hand an encoded message to the transport.
    fn send(&mut self, envelope: Envelope);

    /// Drain messages received since the last call (non-blocking).
    fn poll_incoming(&mut self) -> Vec<Envelope>;

    /// Leave the session. Further sends are dropped.
    fn close(&mut self) {}

    fn publish_cursor(&mut self, update: CursorUpdate) -> Result<(), WireError> {
        self.send(Message::Cursor(update).to_envelope()?);
        Ok(())
    }

    fn publish_commit(&mut self, commit: CommitMessage) -> Result<(), WireError> {
        self.send(Message::Commit(commit).to_envelope()?);
        Ok(())
    }

    fn publish_delete(&mut self, ids: Vec<StrokeId>) -> Result<(), WireError> {
        self.send(Message::Delete(ids).to_envelope()?);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Peer {
    inbox: VecDeque<Envelope>,
    open: bool,
}

#[derive(Debug, Default)]
struct HubState {
    peers: Vec<Peer>,
    sent: usize,
}

/// In-process relay fanning every message out to all other open peers.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Rc<RefCell<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a new peer.
    pub fn connect(&self) -> MemoryTransport {
        let mut state = self.state.borrow_mut();
        state.peers.push(Peer {
            inbox: VecDeque::new(),
            open: true,
        });
        MemoryTransport {
            hub: self.clone(),
            peer: state.peers.len() - 1,
        }
    }

    /// Deliver a raw envelope to every open peer, as if sent by an outsider.
    pub fn inject(&self, envelope: Envelope) {
        self.fan_out(None, envelope);
    }

    /// Total envelopes accepted from peers.
    pub fn sent_count(&self) -> usize {
        self.state.borrow().sent
    }

    fn fan_out(&self, from: Option<usize>, envelope: Envelope) {
        let mut state = self.state.borrow_mut();
        if from.is_some() {
            state.sent += 1;
        }
        for (index, peer) in state.peers.iter_mut().enumerate() {
            if peer.open && Some(index) != from {
                peer.inbox.push_back(envelope.clone());
            }
        }
    }
}

/// One peer's end of a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryTransport {
    hub: MemoryHub,
    peer: usize,
}

impl MemoryTransport {
    pub fn is_open(&self) -> bool {
        self.hub.state.borrow().peers[self.peer].open
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, envelope: Envelope) {
        if self.is_open() {
            self.hub.fan_out(Some(self.peer), envelope);
        }
    }

    fn poll_incoming(&mut self) -> Vec<Envelope> {
        let mut state = self.hub.state.borrow_mut();
        state.peers[self.peer].inbox.drain(..).collect()
    }

    fn close(&mut self) {
        let mut state = self.hub.state.borrow_mut();
        let peer = &mut state.peers[self.peer];
        peer.open = false;
        peer.inbox.clear();
    }
}
