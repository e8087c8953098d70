//! Service registry
//!
//! Maps service names to groups of instances. Groups are created on first
//! registration and never removed.

use orchlet_core::{InstanceSpec, InstanceStatus, LoadBalanceStrategy, ServiceSummary};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::balancer::{balancer_for, LoadBalancer};
use crate::instance::Instance;

type GroupsMap = HashMap<String, Arc<ServiceGroup>>;

/// Instances of one service plus the balancer that picks among them
pub struct ServiceGroup {
    name: String,
    instances: RwLock<Vec<Arc<Instance>>>,
    balancer: Arc<dyn LoadBalancer>,
}

impl ServiceGroup {
    fn new(name: String, balancer: Arc<dyn LoadBalancer>) -> Self {
        Self {
            name,
            instances: RwLock::new(Vec::new()),
            balancer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balancer(&self) -> Arc<dyn LoadBalancer> {
        Arc::clone(&self.balancer)
    }

    /// Snapshot of the instances in registration order
    pub async fn instances(&self) -> Vec<Arc<Instance>> {
        self.instances.read().await.clone()
    }
}

/// Registry of all known services
pub struct ServiceRegistry {
    /// Groups indexed by service name
    groups: RwLock<GroupsMap>,
    /// Strategy for newly created groups
    strategy: LoadBalanceStrategy,
}

impl ServiceRegistry {
    /// Create a new registry
    pub fn new(strategy: LoadBalanceStrategy) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            strategy,
        }
    }

    async fn group(&self, service_name: &str) -> Option<Arc<ServiceGroup>> {
        self.groups.read().await.get(service_name).cloned()
    }

    async fn group_or_insert(&self, service_name: &str) -> Arc<ServiceGroup> {
        if let Some(group) = self.group(service_name).await {
            return group;
        }

        let mut groups = self.groups.write().await;
        Arc::clone(groups.entry(service_name.to_string()).or_insert_with(|| {
            debug!(service = service_name, strategy = ?self.strategy, "Created service group");
            Arc::new(ServiceGroup::new(
                service_name.to_string(),
                balancer_for(self.strategy),
            ))
        }))
    }

    /// Register an instance under its service, creating the group if needed.
    ///
    /// Instance ids are not deduplicated: registering the same id twice
    /// yields two selectable entries.
    pub async fn register(&self, spec: InstanceSpec) -> Arc<Instance> {
        let group = self.group_or_insert(&spec.service_name).await;
        let instance = Arc::new(Instance::new(spec));

        let mut instances = group.instances.write().await;
        if instances.iter().any(|i| i.id() == instance.id()) {
            warn!(
                service = instance.service_name(),
                instance_id = instance.id(),
                "Instance id registered more than once"
            );
        }
        instances.push(Arc::clone(&instance));

        debug!(
            service = instance.service_name(),
            instance_id = instance.id(),
            endpoint = %instance.spec().endpoint,
            total_instances = instances.len(),
            "Registered instance"
        );

        instance
    }

    /// Get all instances of a service, empty if the service is unknown
    pub async fn list_instances(&self, service_name: &str) -> Vec<Arc<Instance>> {
        match self.group(service_name).await {
            Some(group) => group.instances().await,
            None => Vec::new(),
        }
    }

    /// Get the balancer of a service
    pub async fn load_balancer_for(&self, service_name: &str) -> Option<Arc<dyn LoadBalancer>> {
        self.group(service_name).await.map(|g| g.balancer())
    }

    /// Let the service's balancer pick one of its instances.
    ///
    /// Returns the pick together with the group size it was chosen from.
    pub async fn select_instance(&self, service_name: &str) -> Option<(Arc<Instance>, usize)> {
        let group = self.group(service_name).await?;
        let instances = group.instances().await;
        let selected = group.balancer.select(&instances)?;
        Some((selected, instances.len()))
    }

    /// Get every instance across every service
    pub async fn all_instances(&self) -> Vec<Arc<Instance>> {
        let groups: Vec<Arc<ServiceGroup>> = self.groups.read().await.values().cloned().collect();

        let mut all = Vec::new();
        for group in groups {
            all.extend(group.instances().await);
        }
        all
    }

    /// Get the names of all known services, sorted
    pub async fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Status of every instance of a service
    pub async fn instance_statuses(
        &self,
        service_name: &str,
        breaker_timeout: Duration,
    ) -> Vec<InstanceStatus> {
        let mut statuses = Vec::new();
        for instance in self.list_instances(service_name).await {
            statuses.push(instance.status(breaker_timeout).await);
        }
        statuses
    }

    /// Summaries of all services, sorted by name
    pub async fn summaries(&self, breaker_timeout: Duration) -> Vec<ServiceSummary> {
        let mut summaries = Vec::new();
        for name in self.service_names().await {
            let statuses = self.instance_statuses(&name, breaker_timeout).await;
            summaries.push(ServiceSummary::from_statuses(name, &statuses));
        }
        summaries
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(LoadBalanceStrategy::RoundRobin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn spec(service: &str, id: &str, port: u16) -> InstanceSpec {
        InstanceSpec::new(service, id, "127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let registry = ServiceRegistry::default();
        registry.register(spec("billing", "billing-1", 7000)).await;

        let instances = registry.list_instances("billing").await;
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].spec().endpoint.port, 7000);
        assert_eq!(instances[0].service_name(), "billing");
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let registry = ServiceRegistry::default();
        assert!(registry.list_instances("missing").await.is_empty());
        assert!(registry.load_balancer_for("missing").await.is_none());
        assert!(registry.select_instance("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_group_keeps_one_balancer() {
        let registry = ServiceRegistry::new(LoadBalanceStrategy::LeastConnections);
        registry.register(spec("billing", "billing-1", 7000)).await;
        let first = registry.load_balancer_for("billing").await.unwrap();
        registry.register(spec("billing", "billing-2", 7001)).await;
        let second = registry.load_balancer_for("billing").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.strategy(), LoadBalanceStrategy::LeastConnections);
    }

    #[tokio::test]
    async fn test_select_follows_registration_order() {
        let registry = ServiceRegistry::default();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            registry.register(spec("search", id, 7000 + i as u16)).await;
        }

        let mut picked = Vec::new();
        for _ in 0..6 {
            let (instance, group_size) = registry.select_instance("search").await.unwrap();
            assert_eq!(group_size, 3);
            picked.push(instance.id().to_string());
        }
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_kept() {
        let registry = ServiceRegistry::default();
        registry.register(spec("billing", "billing-1", 7000)).await;
        registry.register(spec("billing", "billing-1", 7000)).await;

        assert_eq!(registry.list_instances("billing").await.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_loses_nothing() {
        let registry = Arc::new(ServiceRegistry::default());

        let handles: Vec<_> = (0..50u16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .register(spec("billing", &format!("billing-{}", i), 7000 + i))
                        .await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let instances = registry.list_instances("billing").await;
        assert_eq!(instances.len(), 50);
        assert!(instances.iter().all(|i| i.service_name() == "billing"));
        assert_eq!(registry.service_names().await, vec!["billing".to_string()]);
    }

    #[tokio::test]
    async fn test_all_instances_and_summaries() {
        let registry = ServiceRegistry::default();
        registry.register(spec("billing", "billing-1", 7000)).await;
        registry.register(spec("billing", "billing-2", 7001)).await;
        registry.register(spec("search", "search-1", 7100)).await;

        assert_eq!(registry.all_instances().await.len(), 3);

        let summaries = registry.summaries(TIMEOUT).await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].service_name, "billing");
        assert_eq!(summaries[0].instances, 2);
        assert_eq!(summaries[1].service_name, "search");
        assert_eq!(summaries[1].healthy_instances, 1);
    }
}
