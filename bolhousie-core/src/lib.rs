//! Bolhousie session protocol: host-authoritative brand-tagline bingo.
//! Host-driven: no I/O; the node passes events in and performs the actions returned.

pub mod catalog;
pub mod claim;
pub mod identity;
pub mod protocol;
pub mod session;
pub mod ticket;
pub mod wire;

pub use catalog::{Catalog, CatalogError, Item};
pub use claim::{validate, validate_named, ClaimKind};
pub use identity::{ConnectionId, Keypair, PeerId, PublicKey};
pub use protocol::{ChannelErrorKind, ClaimPayload, ConnectMetadata, Message, Signal, PROTOCOL_VERSION};
pub use session::{Call, Claim, ClaimStatus, Player, Session, SessionStatus};
pub use ticket::{generate_ticket, Ticket, TicketError};
pub use wire::{FrameDecodeError, FrameEncodeError};

// Role state machines.
pub mod board;
pub mod caller;
pub mod endpoint;
pub mod host;
pub mod player;
pub mod rendezvous;

pub use board::{ClaimRejected, PlayerBoard};
pub use caller::{AudioIndex, Caller, CallerError};
pub use endpoint::{Endpoint, EndpointAction, EndpointEvent, EndpointStatus};
pub use host::{HostEvent, HostSession, OutboundAction};
pub use player::{ConnectError, ConnectionState, PlayerAction, PlayerClient};
pub use rendezvous::Registry;
