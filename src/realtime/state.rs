use serde::{Deserialize, Serialize};

use crate::store::{ChannelStatus, Table};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    TimedOut,
    Closed,
    Errored,
    /// No session at subscribe time; the feed was never opened.
    Unauthenticated,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Connecting
    }
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::TimedOut => "timedOut",
            ConnectionState::Closed => "closed",
            ConnectionState::Errored => "errored",
            ConnectionState::Unauthenticated => "unauthenticated",
        }
    }
}

/// Observable state of one table subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub table: Table,
    pub state: ConnectionState,
    /// Last human-readable error, kept until a later status replaces it.
    pub error: Option<String>,
}

impl SubscriptionStatus {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            state: ConnectionState::Connecting,
            error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn fail_authentication(&mut self, message: String) {
        self.state = ConnectionState::Unauthenticated;
        self.error = Some(message);
    }

    pub fn fail_setup(&mut self, message: String) {
        self.state = ConnectionState::Errored;
        self.error = Some(message);
    }

    /// Fold a transport status into the connection state.
    pub fn apply_channel_status(&mut self, status: ChannelStatus) {
        let table = self.table;
        match status {
            ChannelStatus::Subscribed => {
                self.state = ConnectionState::Connected;
            }
            ChannelStatus::ChannelError => {
                self.state = ConnectionState::Errored;
                self.error = Some(format!("Channel error for {table}"));
            }
            ChannelStatus::TimedOut => {
                self.state = ConnectionState::TimedOut;
                self.error = Some(format!("Connection timed out for {table}"));
            }
            ChannelStatus::Closed => {
                self.state = ConnectionState::Closed;
            }
        }
    }
}
