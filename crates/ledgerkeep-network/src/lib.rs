//! Raw-TCP gossip/sync transport for LedgerKeep (spec §4.17–§4.18).
//!
//! [`transport::Transport`] owns the listener, the outbound dialer, and
//! the peer registry; [`protocol::Message`] is the newline-delimited
//! JSON wire format exchanged over it.

pub mod protocol;
pub mod transport;

pub use protocol::{Envelope, Message};
pub use transport::{PeerId, Transport, TransportConfig};
