//! End-to-end scenarios
//!
//! Each scenario drives real session drivers over a `MemoryMesh` and
//! returns a report listing every violated expectation:
//! - Seed exchange between two peers
//! - Survival of a malformed message flood
//! - Recovery after failed publishes
//! - Seed convergence across a full mesh
//! - Heartbeat delivery

use std::time::Duration;

use rand::Rng;

use rayo_core::{RayoError, RayoResult, Topic};
use rayo_runtime::SessionConfig;
use rayo_wire::ChatMessage;

use crate::hostile::HostileGenerator;
use crate::scenario::{MeshScenario, DEFAULT_WAIT};

// ============================================================================
// REPORT
// ============================================================================

/// Outcome of one scenario run
#[derive(Clone, Debug, Default)]
pub struct ScenarioReport {
    /// Messages the display layer received
    pub delivered: usize,

    /// Inbound messages dropped as malformed
    pub malformed_dropped: u64,

    /// Publishes that reported an error
    pub publish_failures: usize,

    /// Seed held by each peer at the end
    pub final_seeds: Vec<i64>,

    /// Expectations that did not hold
    pub violations: Vec<String>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    fn check(&mut self, ok: bool, what: impl Into<String>) {
        if !ok {
            self.violations.push(what.into());
        }
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

/// Two peers: A broadcasts a seed, B displays it attributed to A, and a
/// disconnect empties both connected sets.
pub async fn seed_exchange(seed: i64) -> RayoResult<ScenarioReport> {
    let mut report = ScenarioReport::default();
    let mut scenario = MeshScenario::quiet();
    let a = scenario.add_peer("QmAlicePeer")?;
    let b = scenario.add_peer("QmBobPeer")?;

    scenario.connect(a, b);
    report.check(
        scenario.wait_for_mesh(1, DEFAULT_WAIT).await?,
        "peers did not see each other",
    );

    scenario.peer(a).handle.send(seed).await?;

    let a_id = scenario.peer(a).id().clone();
    match scenario.peer_mut(b).next_message(DEFAULT_WAIT).await {
        Some((author, received)) => {
            report.delivered += 1;
            report.check(received.from == a_id, "message not attributed to sender");
            report.check(author == a_id.short(), "unknown author not shown by short id");
            report.check(
                received.message.data == ChatMessage::Seed(seed),
                format!("expected seed {}, got {}", seed, received.message.data),
            );
        }
        None => report.check(false, "receiver got nothing"),
    }
    report.check(
        scenario.peer(b).wait_for_seed(seed, DEFAULT_WAIT).await?,
        "receiver seed not updated",
    );

    scenario.disconnect(a, b);
    report.check(
        scenario.wait_for_mesh(0, DEFAULT_WAIT).await?,
        "connected set not emptied by disconnect",
    );

    for peer in scenario.peers() {
        report.final_seeds.push(peer.handle.seed().await?.seed);
    }
    scenario.shutdown().await;
    Ok(report)
}

/// Flood B with `count` undecodable payloads, then check a valid message
/// still gets through.
pub async fn malformed_flood(count: usize, rng_seed: u64) -> RayoResult<ScenarioReport> {
    let mut report = ScenarioReport::default();
    let mut scenario = MeshScenario::quiet();
    let a = scenario.add_peer("QmSender")?;
    let b = scenario.add_peer("QmTarget")?;
    scenario.connect(a, b);
    scenario.wait_for_mesh(1, DEFAULT_WAIT).await?;

    let mut generator = HostileGenerator::new(rng_seed);
    let topic = Topic::new(scenario.config().topic.as_str());
    for _ in 0..count {
        let (_, payload) = generator.next_payload();
        scenario.peer(b).node.inject("QmMallory", &topic, payload);
    }

    scenario.peer(a).handle.send(7).await?;
    match scenario.peer_mut(b).next_message(DEFAULT_WAIT).await {
        Some((_, received)) => {
            report.delivered += 1;
            report.check(
                received.message.data == ChatMessage::Seed(7),
                "valid message corrupted after flood",
            );
        }
        None => report.check(false, "valid message lost after flood"),
    }

    let mut sessions = scenario.shutdown().await;
    match sessions.get_mut(b).and_then(Option::take) {
        Some(session) => {
            report.malformed_dropped = session.channel_stats().malformed;
            report.final_seeds.push(session.seed().seed);
        }
        None => report.check(false, "target driver panicked"),
    }
    report.check(
        report.malformed_dropped == count as u64,
        format!("dropped {} of {} malformed", report.malformed_dropped, count),
    );
    Ok(report)
}

/// Publishes fail while the overlay refuses them, and work again once it
/// recovers. The session stays joined throughout.
pub async fn publish_recovery(failures: usize) -> RayoResult<ScenarioReport> {
    let mut report = ScenarioReport::default();
    let mut scenario = MeshScenario::quiet();
    let a = scenario.add_peer("a")?;
    let b = scenario.add_peer("b")?;
    scenario.connect(a, b);
    scenario.wait_for_mesh(1, DEFAULT_WAIT).await?;

    scenario
        .peer(a)
        .node
        .set_publish_failure(Some("overlay refused".to_string()));
    for seed in 0..failures {
        match scenario.peer(a).handle.send(seed as i64).await {
            Err(RayoError::Publish(_)) => report.publish_failures += 1,
            Err(e) => report.check(false, format!("unexpected error {}", e)),
            Ok(()) => report.check(false, "publish succeeded while refused"),
        }
    }

    scenario.peer(a).node.set_publish_failure(None);
    scenario.peer(a).handle.send(1000).await?;
    report.check(
        scenario.peer(b).wait_for_seed(1000, DEFAULT_WAIT).await?,
        "publish after recovery not delivered",
    );
    if scenario.peer_mut(b).next_message(DEFAULT_WAIT).await.is_some() {
        report.delivered += 1;
    }

    for peer in scenario.peers() {
        report.final_seeds.push(peer.handle.seed().await?.seed);
    }
    scenario.shutdown().await;
    Ok(report)
}

/// Random peers of a full mesh roll in turn; every peer must end on the
/// last rolled seed.
pub async fn seed_convergence(peers: usize, rounds: usize) -> RayoResult<ScenarioReport> {
    let mut report = ScenarioReport::default();
    if peers == 0 {
        report.check(rounds == 0, "no peers to roll");
        return Ok(report);
    }

    let mut scenario = MeshScenario::quiet();
    for i in 0..peers {
        scenario.add_peer(format!("QmPeer{:02}", i))?;
    }
    scenario.connect_all();
    report.check(
        scenario.wait_for_mesh(peers.saturating_sub(1), DEFAULT_WAIT).await?,
        "full mesh not formed",
    );

    let mut last = 0;
    for _ in 0..rounds {
        let roller = rand::thread_rng().gen_range(0..peers);
        last = scenario.peer(roller).handle.roll().await?;
    }

    for peer in scenario.peers() {
        let converged = peer.wait_for_seed(last, DEFAULT_WAIT).await?;
        report.check(converged, format!("{} did not converge", peer.id()));
        report.final_seeds.push(peer.handle.seed().await?.seed);
    }
    scenario.shutdown().await;
    Ok(report)
}

/// A heartbeat-enabled peer announces itself to a quiet one
pub async fn heartbeat_presence(interval: Duration) -> RayoResult<ScenarioReport> {
    let mut report = ScenarioReport::default();
    let config = SessionConfig {
        heartbeat_interval: interval,
        ..Default::default()
    };
    let expected = config.heartbeat_text.clone().unwrap_or_default();

    let mut scenario = MeshScenario::quiet();
    let a = scenario.add_peer_with_config("QmBeacon", &config)?;
    let b = scenario.add_peer("QmListener")?;
    scenario.connect(a, b);

    match scenario.peer_mut(b).next_message(DEFAULT_WAIT).await {
        Some((_, received)) => {
            report.delivered += 1;
            report.check(
                received.message.data == ChatMessage::Text(expected),
                "heartbeat text changed in transit",
            );
        }
        None => report.check(false, "no heartbeat within the wait budget"),
    }
    report.check(
        scenario.peer(b).handle.seed().await?.seed == 0,
        "heartbeat touched the seed",
    );
    scenario.shutdown().await;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_exchange() {
        let report = seed_exchange(42).await.unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.final_seeds, vec![42, 42]);
    }

    #[tokio::test]
    async fn test_seed_exchange_negative_seed() {
        let report = seed_exchange(-5).await.unwrap();
        assert!(report.passed(), "{:?}", report.violations);
    }

    #[tokio::test]
    async fn test_malformed_flood() {
        let report = malformed_flood(200, 12345).await.unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.malformed_dropped, 200);
        assert_eq!(report.final_seeds, vec![7]);
    }

    #[tokio::test]
    async fn test_publish_recovery() {
        let report = publish_recovery(5).await.unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.publish_failures, 5);
        assert_eq!(report.final_seeds, vec![1000, 1000]);
    }

    #[tokio::test]
    async fn test_seed_convergence() {
        let report = seed_convergence(5, 20).await.unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        let first = report.final_seeds[0];
        assert!(report.final_seeds.iter().all(|seed| *seed == first));
    }

    #[tokio::test]
    async fn test_seed_convergence_without_peers() {
        let report = seed_convergence(0, 3).await.unwrap();
        assert!(!report.passed());
        assert!(report.final_seeds.is_empty());

        assert!(seed_convergence(0, 0).await.unwrap().passed());
    }

    #[tokio::test]
    async fn test_heartbeat_presence() {
        let report = heartbeat_presence(Duration::from_millis(25)).await.unwrap();
        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.delivered, 1);
    }
}
