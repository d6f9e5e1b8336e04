//! Replica Node
//!
//! Wires membership, role state, election coordinator and vote responder
//! to the network, and runs the heartbeat and election loops.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::WolfVoteConfig;
use crate::error::Result;
use crate::network::{
    ErrorCode, Message, MessageHandler, NetworkClient, NetworkServer, NodeStatusReport,
    TcpVoteTransport,
};
use crate::state::{
    ElectionCoordinator, ElectionTimeouts, MemberRegistry, NodeRole, QuorumCalculator,
    RoleState, VoteCanvasser, VoteLedger, VoteResponder, VoteTransport,
};

/// A replica set member
pub struct ReplicaNode {
    config: WolfVoteConfig,
    registry: Arc<MemberRegistry>,
    role: Arc<RoleState>,
    quorum: Arc<QuorumCalculator>,
    coordinator: Arc<ElectionCoordinator>,
    ledger: Arc<VoteLedger>,
    responder: VoteResponder,
    client: Arc<NetworkClient>,
    shutdown: watch::Sender<bool>,
}

impl ReplicaNode {
    /// Build a node that canvasses peers over TCP
    pub fn new(config: WolfVoteConfig) -> Self {
        let client = Arc::new(NetworkClient::new(
            config.election.connect_timeout(),
            config.election.vote_timeout(),
        ));
        let transport = Arc::new(TcpVoteTransport::new(Arc::clone(&client)));
        Self::with_transport(config, client, transport)
    }

    /// Build a node with a custom vote transport
    pub fn with_transport(
        config: WolfVoteConfig,
        client: Arc<NetworkClient>,
        transport: Arc<dyn VoteTransport>,
    ) -> Self {
        let registry = Arc::new(MemberRegistry::from_config(&config));
        let role = Arc::new(RoleState::new());
        let quorum = Arc::new(QuorumCalculator::new(Arc::clone(&registry)));
        let ledger = Arc::new(VoteLedger::new(config.election.vote_lease()));
        let coordinator = Arc::new(ElectionCoordinator::new(
            config.cluster.set_name.clone(),
            Arc::clone(&registry),
            Arc::clone(&quorum),
            VoteCanvasser::new(transport, config.election.vote_timeout()),
            Arc::clone(&role),
            Arc::clone(&ledger),
            ElectionTimeouts::from(&config.election),
        ));
        let responder = VoteResponder::new(
            config.cluster.set_name.clone(),
            Arc::clone(&registry),
            Arc::clone(&role),
            Arc::clone(&ledger),
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            registry,
            role,
            quorum,
            coordinator,
            ledger,
            responder,
            client,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<MemberRegistry> {
        &self.registry
    }

    pub fn role(&self) -> &Arc<RoleState> {
        &self.role
    }

    pub fn quorum(&self) -> &Arc<QuorumCalculator> {
        &self.quorum
    }

    pub fn coordinator(&self) -> &Arc<ElectionCoordinator> {
        &self.coordinator
    }

    /// Bind the server and start the background loops
    pub async fn start(self: Arc<Self>) -> Result<NodeHandle> {
        let handler: Arc<dyn MessageHandler> = Arc::clone(&self) as Arc<dyn MessageHandler>;
        let server = Arc::new(NetworkServer::bind(&self.config.node.bind_address, handler).await?);
        let local_addr = server.local_addr();

        tracing::info!(
            "Node {} (member {}) joining {} with {} peers, {} total votes",
            self.config.node.id,
            self.config.node.member_id,
            self.config.cluster.set_name,
            self.config.cluster.peers.len(),
            self.quorum.total_votes().await
        );

        let mut tasks = Vec::new();

        let running = Arc::clone(&server);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = running.run().await {
                tracing::error!("Network server failed: {}", e);
            }
        }));

        let node = Arc::clone(&self);
        let shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move { node.heartbeat_loop(shutdown_rx).await }));

        let node = Arc::clone(&self);
        let shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move { node.election_loop(shutdown_rx).await }));

        Ok(NodeHandle {
            node: self,
            server,
            local_addr,
            tasks,
        })
    }

    async fn heartbeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait_for(|stopped| *stopped) => break,
            }
            self.send_heartbeats().await;
        }
        tracing::debug!("Heartbeat loop stopped");
    }

    /// Probe every peer once and refresh liveness
    pub async fn send_heartbeats(&self) {
        let message = Message::Heartbeat {
            set_name: self.config.cluster.set_name.clone(),
            from_id: self.registry.node_id().to_string(),
            config_version: self.registry.config_version(),
            role: self.role.current(),
        };

        let peers = self.registry.peers().await;
        let probes = peers.iter().map(|peer| {
            let message = message.clone();
            async move { (peer, self.client.send(&peer.address, message).await) }
        });

        for (peer, result) in futures::future::join_all(probes).await {
            match result {
                Ok(Message::HeartbeatResponse { from_id, role }) if from_id == peer.id => {
                    if let Err(e) = self.registry.record_heartbeat(&peer.id, role).await {
                        tracing::warn!("Failed to record heartbeat from {}: {}", peer.id, e);
                    }
                }
                Ok(Message::HeartbeatResponse { from_id, .. }) => {
                    tracing::warn!(
                        "Heartbeat to {} answered by {}; check the peer address",
                        peer.id,
                        from_id
                    );
                }
                Ok(other) => {
                    tracing::debug!("Unexpected heartbeat reply from {}: {}", peer.id, other.type_name());
                }
                Err(e) => {
                    tracing::trace!("Heartbeat to {} failed: {}", peer.id, e);
                }
            }
        }

        self.registry.check_timeouts().await;
    }

    async fn election_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let jitter_ms = rand::thread_rng().gen_range(0..=self.config.cluster.election_jitter_ms);
            let delay = self.config.election_check_interval() + Duration::from_millis(jitter_ms);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait_for(|stopped| *stopped) => break,
            }

            if self.should_stand_for_election().await {
                let outcome = self.coordinator.elect_self().await;
                tracing::debug!("Election attempt finished: {:?}", outcome);
            }
        }
        tracing::debug!("Election loop stopped");
    }

    /// Whether this node should try to become leader right now
    pub async fn should_stand_for_election(&self) -> bool {
        if self.config.cluster.disable_auto_election || self.role.is_leader() {
            return false;
        }
        if let Some(primary) = self.registry.known_primary().await {
            tracing::trace!("Leader {} is reachable, not standing", primary.id);
            return false;
        }
        if let Some(holder) = self.ledger.holder() {
            if holder != self.registry.me().member_id {
                tracing::trace!("Vote leased to member {}, not standing", holder);
                return false;
            }
        }
        self.quorum.a_majority_seems_to_be_up().await
    }

    /// Current status of this node
    pub async fn status(&self) -> NodeStatusReport {
        NodeStatusReport {
            node_id: self.config.node.id.clone(),
            set_name: self.config.cluster.set_name.clone(),
            role: self.coordinator.role(),
            config_version: self.registry.config_version(),
            election_in_progress: self.coordinator.in_progress(),
            majority_up: self.quorum.a_majority_seems_to_be_up().await,
            summary: self.registry.summary().await,
            members: self.registry.peers().await,
            reported_at: chrono::Utc::now(),
        }
    }

    async fn handle_heartbeat(
        &self,
        set_name: String,
        from_id: String,
        config_version: u64,
        role: NodeRole,
    ) -> Message {
        if set_name != self.config.cluster.set_name {
            return Message::Error {
                code: ErrorCode::WrongSet,
                message: format!("this node belongs to {}", self.config.cluster.set_name),
            };
        }
        if config_version != self.registry.config_version() {
            tracing::debug!(
                "Heartbeat from {} carries config version {} (ours is {})",
                from_id,
                config_version,
                self.registry.config_version()
            );
        }
        if let Err(e) = self.registry.record_heartbeat(&from_id, role).await {
            tracing::warn!("Heartbeat from unknown member {}: {}", from_id, e);
        }

        Message::HeartbeatResponse {
            from_id: self.registry.node_id().to_string(),
            role: self.coordinator.role(),
        }
    }
}

#[async_trait::async_trait]
impl MessageHandler for ReplicaNode {
    async fn handle(&self, peer_addr: &str, message: Message) -> Option<Message> {
        let response = match message {
            Message::Heartbeat { set_name, from_id, config_version, role } => {
                self.handle_heartbeat(set_name, from_id, config_version, role).await
            }
            Message::Elect(request) => match self.responder.respond(&request).await {
                Ok(vote) => Message::ElectResponse { vote },
                Err(e) => {
                    tracing::info!("Rejecting vote request from {}: {}", peer_addr, e);
                    Message::Error {
                        code: ErrorCode::WrongSet,
                        message: e.to_string(),
                    }
                }
            },
            Message::StatusRequest => Message::StatusResponse(self.status().await),
            other => {
                tracing::debug!("Ignoring {} from {}", other.type_name(), peer_addr);
                Message::Error {
                    code: ErrorCode::UnexpectedMessage,
                    message: format!("{} is not a request", other.type_name()),
                }
            }
        };
        Some(response)
    }
}

/// A running node
pub struct NodeHandle {
    node: Arc<ReplicaNode>,
    server: Arc<NetworkServer>,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Address the node is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn node(&self) -> &Arc<ReplicaNode> {
        &self.node
    }

    /// Stop the loops and the server, waiting for them to exit
    pub async fn shutdown(self) {
        tracing::info!("Shutting down node {}", self.node.config.node.id);
        self.node.shutdown.send_replace(true);
        self.server.stop();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
