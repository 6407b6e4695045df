//! Connection state machine states

/// Where the connection currently is in its lifecycle
///
/// Exactly one instance exists per client; transitions are driven by the
/// runner task. Any state can fall back to `Disconnected` when the
/// transport closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; waiting for permission or the next attempt
    Disconnected,
    /// Resolving the gateway address
    AwaitingGatewayUrl,
    /// Opening the WebSocket
    SocketConnecting,
    /// Transport open, waiting for the server's Hello
    AwaitingHello,
    /// Identify or Resume sent, awaiting confirmation
    Authenticating,
    /// Session confirmed; dispatches are flowing
    Authenticated,
}

impl ConnectionState {
    /// Whether the transport is open in this state
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::AwaitingHello | Self::Authenticating | Self::Authenticated
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingGatewayUrl => "awaiting-gateway-url",
            Self::SocketConnecting => "socket-connecting",
            Self::AwaitingHello => "awaiting-hello",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}
