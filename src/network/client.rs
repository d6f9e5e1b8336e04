//! Network Client
//!
//! TCP client for request-response exchanges with other members.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{read_message, write_message};
use crate::network::Message;
use crate::error::{Error, Result};
use crate::state::{ElectionRequest, Member, VoteTransport};

/// Network client for connecting to peer nodes
pub struct NetworkClient {
    /// Connection timeout
    connect_timeout: Duration,
    /// Request timeout
    request_timeout: Duration,
}

impl NetworkClient {
    /// Create a new network client
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    /// Send a message to a peer and wait for response
    pub async fn send(&self, address: &str, message: Message) -> Result<Message> {
        let result = timeout(
            self.request_timeout,
            self.send_inner(address, message),
        ).await;

        match result {
            Ok(inner_result) => inner_result,
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Send without timeout wrapper
    async fn send_inner(&self, address: &str, message: Message) -> Result<Message> {
        let mut stream = self.connect(address).await?;
        let (mut reader, mut writer) = stream.split();

        write_message(&mut writer, &message).await?;
        read_message(&mut reader).await
    }

    /// Connect to an address
    async fn connect(&self, address: &str) -> Result<TcpStream> {
        let result = timeout(
            self.connect_timeout,
            TcpStream::connect(address),
        ).await;

        match result {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }
}

/// Vote transport that sends `Elect` messages over TCP
pub struct TcpVoteTransport {
    client: Arc<NetworkClient>,
}

impl TcpVoteTransport {
    pub fn new(client: Arc<NetworkClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl VoteTransport for TcpVoteTransport {
    async fn request_vote(&self, peer: &Member, request: &ElectionRequest) -> Result<i32> {
        match self.client.send(&peer.address, Message::Elect(request.clone())).await? {
            Message::ElectResponse { vote } => Ok(vote),
            Message::Error { code, message } => {
                Err(Error::Protocol(format!("{:?}: {}", code, message)))
            }
            other => Err(Error::UnexpectedResponse {
                address: peer.address.clone(),
                message_type: other.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_failure() {
        let client = NetworkClient::new(
            Duration::from_millis(100),
            Duration::from_millis(500),
        );

        // Nothing listens on a freshly released port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = client.send(&address, Message::StatusRequest).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_vote_transport_reads_vote() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = socket.split();
            let request = read_message(&mut reader).await.unwrap();
            assert!(matches!(request, Message::Elect(_)));
            write_message(&mut writer, &Message::ElectResponse { vote: 3 }).await.unwrap();
        });

        let transport = TcpVoteTransport::new(Arc::new(NetworkClient::new(
            Duration::from_secs(1),
            Duration::from_secs(2),
        )));
        let peer = Member::new("node-2", 2, address, 3);
        let request = ElectionRequest {
            set_name: "rs0".into(),
            candidate_address: "127.0.0.1:7654".into(),
            candidate_member_id: 1,
            config_version: 1,
        };

        assert_eq!(transport.request_vote(&peer, &request).await.unwrap(), 3);
    }
}
