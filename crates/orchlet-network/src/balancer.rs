//! Load balancing strategies

use orchlet_core::LoadBalanceStrategy;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::instance::Instance;

/// Picks one instance out of a candidate list
///
/// Balancers are shared by every caller of a service, so any cursor they
/// keep must tolerate concurrent `select` calls.
pub trait LoadBalancer: Send + Sync {
    /// Select an instance, or `None` when there are no candidates
    fn select(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>>;

    /// Get the strategy implemented by this balancer
    fn strategy(&self) -> LoadBalanceStrategy;
}

/// Build a fresh balancer for a newly created service group
pub fn balancer_for(strategy: LoadBalanceStrategy) -> Arc<dyn LoadBalancer> {
    match strategy {
        LoadBalanceStrategy::RoundRobin => Arc::new(RoundRobinBalancer::new()),
        LoadBalanceStrategy::LeastConnections => Arc::new(LeastConnectionsBalancer::new()),
        LoadBalanceStrategy::Random => Arc::new(RandomBalancer),
    }
}

/// Cycles through candidates in order
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    /// Counter for round-robin
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        if instances.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % instances.len();

        debug!(
            strategy = "round-robin",
            selected_index = index,
            total_instances = instances.len(),
            "Selected instance"
        );

        instances.get(index).cloned()
    }

    fn strategy(&self) -> LoadBalanceStrategy {
        LoadBalanceStrategy::RoundRobin
    }
}

/// Picks the candidate with the fewest in-flight requests
///
/// Ties are broken by a rotating start position so equally loaded
/// instances still share traffic.
#[derive(Debug, Default)]
pub struct LeastConnectionsBalancer {
    counter: AtomicUsize,
}

impl LeastConnectionsBalancer {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancer for LeastConnectionsBalancer {
    fn select(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        if instances.is_empty() {
            return None;
        }

        let len = instances.len();
        let start = self.counter.fetch_add(1, Ordering::Relaxed) % len;
        let index = (0..len)
            .map(|offset| (start + offset) % len)
            .min_by_key(|&i| instances[i].in_flight())?;

        debug!(
            strategy = "least-connections",
            selected_index = index,
            in_flight = instances[index].in_flight(),
            total_instances = len,
            "Selected instance"
        );

        instances.get(index).cloned()
    }

    fn strategy(&self) -> LoadBalanceStrategy {
        LoadBalanceStrategy::LeastConnections
    }
}

/// Picks a uniformly random candidate
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomBalancer;

impl LoadBalancer for RandomBalancer {
    fn select(&self, instances: &[Arc<Instance>]) -> Option<Arc<Instance>> {
        if instances.is_empty() {
            return None;
        }

        let index = rand::thread_rng().gen_range(0..instances.len());

        debug!(
            strategy = "random",
            selected_index = index,
            total_instances = instances.len(),
            "Selected instance"
        );

        instances.get(index).cloned()
    }

    fn strategy(&self) -> LoadBalanceStrategy {
        LoadBalanceStrategy::Random
    }
}
