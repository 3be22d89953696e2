//! Peer session registry (mesh mode)
//!
//! One `PeerLink` per remote client, holding the negotiation state machine
//! and the FIFO queue of ICE candidates that arrived before the remote
//! description was applied. The broadcaster side runs
//! `New -> OfferSent -> Stable`, the viewer side `New -> AnswerSent ->
//! Stable`. The actual transport is behind the `PeerConnector` trait so
//! the registry can be exercised without a real connection.

use crate::message::CandidateInit;
use async_trait::async_trait;
use dashmap::DashMap;
use relaycast_core::{ClientId, Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Negotiation progress for one peer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    OfferSent,
    AnswerSent,
    Stable,
    Closed,
}

/// Transport-side operations of a single peer connection
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Create a local SDP offer
    async fn create_offer(&self) -> Result<String>;

    /// Create a local SDP answer (valid once the remote offer is applied)
    async fn create_answer(&self) -> Result<String>;

    /// Apply the remote peer's SDP
    async fn set_remote_description(&self, sdp: &str) -> Result<()>;

    /// Apply a single ICE candidate
    async fn add_ice_candidate(&self, candidate: &CandidateInit) -> Result<()>;

    /// Tear the connection down
    async fn close(&self) -> Result<()>;
}

/// Creates connectors for new peer links
#[async_trait]
pub trait PeerConnectorFactory: Send + Sync {
    async fn connect(&self, remote: &ClientId) -> Result<Arc<dyn PeerConnector>>;
}

/// State for one (local, remote) peer pair
pub struct PeerLink {
    pub remote: ClientId,
    pub state: NegotiationState,
    connector: Arc<dyn PeerConnector>,
    candidate_queue: VecDeque<CandidateInit>,
    remote_description_set: bool,
}

impl PeerLink {
    fn new(remote: ClientId, connector: Arc<dyn PeerConnector>) -> Self {
        Self {
            remote,
            state: NegotiationState::New,
            connector,
            candidate_queue: VecDeque::new(),
            remote_description_set: false,
        }
    }

    /// Apply the remote description, then drain every queued candidate in
    /// arrival order before returning.
    async fn apply_remote_description(&mut self, sdp: &str) -> Result<()> {
        self.connector.set_remote_description(sdp).await?;
        self.remote_description_set = true;
        self.drain_candidates().await
    }

    async fn drain_candidates(&mut self) -> Result<()> {
        while let Some(candidate) = self.candidate_queue.pop_front() {
            self.connector.add_ice_candidate(&candidate).await?;
        }
        Ok(())
    }

    /// Apply a candidate now if the remote description is in place,
    /// queue it otherwise.
    async fn handle_candidate(&mut self, candidate: CandidateInit) -> Result<()> {
        if self.remote_description_set {
            self.connector.add_ice_candidate(&candidate).await
        } else {
            self.candidate_queue.push_back(candidate);
            Ok(())
        }
    }

    fn queued(&self) -> usize {
        self.candidate_queue.len()
    }
}

/// All peer links owned by one local client
pub struct PeerLinkRegistry {
    links: DashMap<ClientId, Arc<Mutex<PeerLink>>>,
    factory: Arc<dyn PeerConnectorFactory>,
}

impl PeerLinkRegistry {
    pub fn new(factory: Arc<dyn PeerConnectorFactory>) -> Self {
        Self {
            links: DashMap::new(),
            factory,
        }
    }

    /// Broadcaster side: open a link towards a discovered viewer and
    /// produce the offer to relay. An existing link for the same remote
    /// is closed and replaced (renegotiation).
    pub async fn initiate(&self, remote: &ClientId) -> Result<String> {
        if let Some((_, old)) = self.links.remove(remote) {
            Self::close_link(&old).await;
        }

        let connector = self.factory.connect(remote).await?;
        let link = Arc::new(Mutex::new(PeerLink::new(remote.clone(), connector)));
        self.links.insert(remote.clone(), link.clone());

        let mut guard = link.lock().await;
        let sdp = match guard.connector.create_offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                drop(guard);
                self.fail_link(remote).await;
                return Err(Error::NegotiationFailed(format!(
                    "offer creation for {remote} failed: {e}"
                )));
            }
        };
        guard.state = NegotiationState::OfferSent;

        debug!(remote = %remote, "Peer link initiated, offer created");
        Ok(sdp)
    }

    /// Viewer side: accept an incoming offer and produce the answer to
    /// relay back. An existing link for the same remote is replaced.
    pub async fn handle_offer(&self, remote: &ClientId, sdp: &str) -> Result<String> {
        if let Some((_, old)) = self.links.remove(remote) {
            Self::close_link(&old).await;
        }

        let connector = self.factory.connect(remote).await?;
        let link = Arc::new(Mutex::new(PeerLink::new(remote.clone(), connector)));
        self.links.insert(remote.clone(), link.clone());

        let mut guard = link.lock().await;

        if let Err(e) = guard.apply_remote_description(sdp).await {
            drop(guard);
            self.fail_link(remote).await;
            return Err(Error::NegotiationFailed(format!(
                "applying offer from {remote} failed: {e}"
            )));
        }

        let answer = match guard.connector.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                drop(guard);
                self.fail_link(remote).await;
                return Err(Error::NegotiationFailed(format!(
                    "answer creation for {remote} failed: {e}"
                )));
            }
        };
        guard.state = NegotiationState::AnswerSent;

        debug!(remote = %remote, "Offer applied, answer created");
        Ok(answer)
    }

    /// Broadcaster side: apply the viewer's answer. Queued candidates are
    /// drained in arrival order and the link becomes `Stable`.
    pub async fn handle_answer(&self, remote: &ClientId, sdp: &str) -> Result<()> {
        let link = self
            .links
            .get(remote)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound(format!("no peer link for client {remote}")))?;

        let mut guard = link.lock().await;
        if let Err(e) = guard.apply_remote_description(sdp).await {
            drop(guard);
            self.fail_link(remote).await;
            return Err(Error::NegotiationFailed(format!(
                "applying answer from {remote} failed: {e}"
            )));
        }
        guard.state = NegotiationState::Stable;

        debug!(remote = %remote, "Answer applied, link stable");
        Ok(())
    }

    /// Apply or queue a relayed candidate. A candidate for a remote with
    /// no link is dropped: links are only created by `initiate` or
    /// `handle_offer`, and signaling is best-effort.
    pub async fn handle_candidate(&self, remote: &ClientId, candidate: CandidateInit) -> Result<()> {
        let Some(link) = self.links.get(remote).map(|entry| entry.value().clone()) else {
            trace!(remote = %remote, "Dropping candidate for unknown peer");
            return Ok(());
        };

        let mut guard = link.lock().await;
        if let Err(e) = guard.handle_candidate(candidate).await {
            drop(guard);
            self.fail_link(remote).await;
            return Err(Error::NegotiationFailed(format!(
                "applying candidate from {remote} failed: {e}"
            )));
        }
        Ok(())
    }

    /// Mark a link stable, e.g. once media is flowing on the viewer side
    pub async fn mark_stable(&self, remote: &ClientId) {
        if let Some(link) = self.links.get(remote).map(|entry| entry.value().clone()) {
            link.lock().await.state = NegotiationState::Stable;
        }
    }

    /// Close and remove one link. Closing an unknown remote is a no-op.
    pub async fn close(&self, remote: &ClientId) {
        if let Some((_, link)) = self.links.remove(remote) {
            Self::close_link(&link).await;
            debug!(remote = %remote, "Peer link closed");
        }
    }

    /// Close every link and clear the registry. A failing close never
    /// blocks the remaining ones; failures are collected and returned.
    pub async fn close_all(&self) -> Vec<(ClientId, Error)> {
        let links: Vec<_> = self
            .links
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.links.clear();

        let mut failures = Vec::new();
        for (remote, link) in links {
            let mut guard = link.lock().await;
            guard.state = NegotiationState::Closed;
            if let Err(e) = guard.connector.close().await {
                warn!(remote = %remote, error = %e, "Peer link close failed");
                failures.push((remote, e));
            }
        }
        failures
    }

    pub async fn state_of(&self, remote: &ClientId) -> Option<NegotiationState> {
        match self.links.get(remote).map(|entry| entry.value().clone()) {
            Some(link) => Some(link.lock().await.state),
            None => None,
        }
    }

    /// Number of candidates waiting for the remote description
    pub async fn queued_candidates(&self, remote: &ClientId) -> usize {
        match self.links.get(remote).map(|entry| entry.value().clone()) {
            Some(link) => link.lock().await.queued(),
            None => 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Tear down a link after a fatal negotiation error
    async fn fail_link(&self, remote: &ClientId) {
        if let Some((_, link)) = self.links.remove(remote) {
            Self::close_link(&link).await;
        }
    }

    async fn close_link(link: &Arc<Mutex<PeerLink>>) {
        let mut guard = link.lock().await;
        guard.state = NegotiationState::Closed;
        if let Err(e) = guard.connector.close().await {
            warn!(remote = %guard.remote, error = %e, "Connector close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MockConnector {
        remote_sdp: SyncMutex<Option<String>>,
        applied_candidates: SyncMutex<Vec<String>>,
        fail_candidates: AtomicBool,
        fail_close: AtomicBool,
        closed: AtomicBool,
    }

    #[async_trait]
    impl PeerConnector for MockConnector {
        async fn create_offer(&self) -> Result<String> {
            Ok("offer-sdp".to_string())
        }

        async fn create_answer(&self) -> Result<String> {
            Ok("answer-sdp".to_string())
        }

        async fn set_remote_description(&self, sdp: &str) -> Result<()> {
            *self.remote_sdp.lock() = Some(sdp.to_string());
            Ok(())
        }

        async fn add_ice_candidate(&self, candidate: &CandidateInit) -> Result<()> {
            if self.fail_candidates.load(Ordering::SeqCst) {
                return Err(Error::NegotiationFailed("ice failure".to_string()));
            }
            self.applied_candidates.lock().push(candidate.candidate.clone());
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            if self.fail_close.load(Ordering::SeqCst) {
                return Err(Error::NegotiationFailed("close failure".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockFactory {
        created: SyncMutex<Vec<Arc<MockConnector>>>,
    }

    impl MockFactory {
        fn connector(&self, index: usize) -> Arc<MockConnector> {
            self.created.lock()[index].clone()
        }
    }

    #[async_trait]
    impl PeerConnectorFactory for MockFactory {
        async fn connect(&self, _remote: &ClientId) -> Result<Arc<dyn PeerConnector>> {
            let connector = Arc::new(MockConnector::default());
            self.created.lock().push(connector.clone());
            Ok(connector)
        }
    }

    fn candidate(label: &str) -> CandidateInit {
        CandidateInit {
            candidate: label.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        }
    }

    fn client(name: &str) -> ClientId {
        ClientId::from_string(name.to_string())
    }

    #[tokio::test]
    async fn test_offer_then_answer_reaches_stable() {
        let factory = Arc::new(MockFactory::default());
        let registry = PeerLinkRegistry::new(factory.clone());
        let viewer = client("viewer1");

        let offer = registry.initiate(&viewer).await.unwrap();
        assert_eq!(offer, "offer-sdp");
        assert_eq!(registry.state_of(&viewer).await, Some(NegotiationState::OfferSent));

        registry.handle_answer(&viewer, "answer-from-viewer").await.unwrap();
        assert_eq!(registry.state_of(&viewer).await, Some(NegotiationState::Stable));

        let connector = factory.connector(0);
        assert_eq!(
            connector.remote_sdp.lock().as_deref(),
            Some("answer-from-viewer")
        );
    }

    #[tokio::test]
    async fn test_candidates_queue_until_remote_description() {
        let factory = Arc::new(MockFactory::default());
        let registry = PeerLinkRegistry::new(factory.clone());
        let viewer = client("viewer1");

        registry.initiate(&viewer).await.unwrap();

        registry.handle_candidate(&viewer, candidate("c1")).await.unwrap();
        registry.handle_candidate(&viewer, candidate("c2")).await.unwrap();
        registry.handle_candidate(&viewer, candidate("c3")).await.unwrap();

        let connector = factory.connector(0);
        assert!(connector.applied_candidates.lock().is_empty());
        assert_eq!(registry.queued_candidates(&viewer).await, 3);

        // The answer drains the queue in arrival order
        registry.handle_answer(&viewer, "answer").await.unwrap();
        assert_eq!(*connector.applied_candidates.lock(), vec!["c1", "c2", "c3"]);
        assert_eq!(registry.queued_candidates(&viewer).await, 0);

        // Later candidates apply immediately
        registry.handle_candidate(&viewer, candidate("c4")).await.unwrap();
        assert_eq!(
            *connector.applied_candidates.lock(),
            vec!["c1", "c2", "c3", "c4"]
        );
    }

    #[tokio::test]
    async fn test_viewer_side_answers_offer() {
        let factory = Arc::new(MockFactory::default());
        let registry = PeerLinkRegistry::new(factory.clone());
        let broadcaster = client("b1");

        let answer = registry.handle_offer(&broadcaster, "offer-from-broadcaster").await.unwrap();
        assert_eq!(answer, "answer-sdp");
        assert_eq!(
            registry.state_of(&broadcaster).await,
            Some(NegotiationState::AnswerSent)
        );

        // Remote description is in place, candidates apply directly
        registry.handle_candidate(&broadcaster, candidate("c1")).await.unwrap();
        let connector = factory.connector(0);
        assert_eq!(*connector.applied_candidates.lock(), vec!["c1"]);

        registry.mark_stable(&broadcaster).await;
        assert_eq!(
            registry.state_of(&broadcaster).await,
            Some(NegotiationState::Stable)
        );
    }

    #[tokio::test]
    async fn test_candidate_for_unknown_peer_is_dropped() {
        let factory = Arc::new(MockFactory::default());
        let registry = PeerLinkRegistry::new(factory);

        let result = registry.handle_candidate(&client("ghost"), candidate("c1")).await;
        assert!(result.is_ok());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_answer_without_link_is_not_found() {
        let factory = Arc::new(MockFactory::default());
        let registry = PeerLinkRegistry::new(factory);

        let err = registry.handle_answer(&client("ghost"), "sdp").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_drain_failure_tears_down_link() {
        let factory = Arc::new(MockFactory::default());
        let registry = PeerLinkRegistry::new(factory.clone());
        let viewer = client("viewer1");

        registry.initiate(&viewer).await.unwrap();
        registry.handle_candidate(&viewer, candidate("c1")).await.unwrap();

        factory.connector(0).fail_candidates.store(true, Ordering::SeqCst);

        let err = registry.handle_answer(&viewer, "answer").await.unwrap_err();
        assert!(matches!(err, Error::NegotiationFailed(_)));

        // The failed session is fully torn down
        assert!(registry.is_empty());
        assert!(factory.connector(0).closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_close_all_continues_past_failures() {
        let factory = Arc::new(MockFactory::default());
        let registry = PeerLinkRegistry::new(factory.clone());

        registry.initiate(&client("v1")).await.unwrap();
        registry.initiate(&client("v2")).await.unwrap();
        registry.initiate(&client("v3")).await.unwrap();

        factory.connector(1).fail_close.store(true, Ordering::SeqCst);

        let failures = registry.close_all().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.as_str(), "v2");

        assert!(registry.is_empty());
        for i in 0..3 {
            assert!(factory.connector(i).closed.load(Ordering::SeqCst));
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let factory = Arc::new(MockFactory::default());
        let registry = PeerLinkRegistry::new(factory);
        let viewer = client("v1");

        registry.initiate(&viewer).await.unwrap();
        registry.close(&viewer).await;
        registry.close(&viewer).await;

        assert!(registry.is_empty());
        assert_eq!(registry.state_of(&viewer).await, None);
    }

    #[tokio::test]
    async fn test_initiate_replaces_existing_link() {
        let factory = Arc::new(MockFactory::default());
        let registry = PeerLinkRegistry::new(factory.clone());
        let viewer = client("v1");

        registry.initiate(&viewer).await.unwrap();
        registry.handle_candidate(&viewer, candidate("stale")).await.unwrap();

        registry.initiate(&viewer).await.unwrap();

        // Old connector closed, fresh link with an empty queue
        assert!(factory.connector(0).closed.load(Ordering::SeqCst));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.queued_candidates(&viewer).await, 0);
    }
}
