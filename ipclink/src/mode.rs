//! Communication modes.
//!
//! A connection's mode determines peer cardinality, the legal traffic
//! directions, and which socket kind the transport is asked for. Worker
//! behavior dispatches by an exhaustive `match` over the variant.

use std::fmt;

/// The six communication modes a connection can be opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Receive from many clients, send to many clients.
    Server,
    /// Send to one server, receive from one server.
    Client,
    /// Send to many subscribers.
    Publisher,
    /// Receive from one publisher.
    Subscriber,
    /// Send one request to a replier, then wait for the reply.
    Requester,
    /// Send one reply per received request.
    Replier,
}

impl Mode {
    /// Whether this mode binds a listening socket (vs. connecting out).
    pub fn is_listener(self) -> bool {
        matches!(self, Mode::Server | Mode::Publisher | Mode::Replier)
    }

    /// Whether this mode accepts more than one peer at a time.
    pub fn accepts_many_peers(self) -> bool {
        matches!(self, Mode::Server | Mode::Publisher)
    }

    /// Whether sending is ever legal in this mode.
    ///
    /// `Requester` and `Replier` sends are additionally gated at write time
    /// by request/reply pairing.
    pub fn can_send(self) -> bool {
        !matches!(self, Mode::Subscriber)
    }

    /// Whether receiving is ever legal in this mode.
    pub fn can_receive(self) -> bool {
        !matches!(self, Mode::Publisher)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Server => "server",
            Mode::Client => "client",
            Mode::Publisher => "publisher",
            Mode::Subscriber => "subscriber",
            Mode::Requester => "requester",
            Mode::Replier => "replier",
        };
        f.write_str(name)
    }
}
