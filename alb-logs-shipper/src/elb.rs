//! Ownership labels of load balancers, resolved from their tags.
//!
//! The AWS Load Balancer Controller tags every load balancer it creates with the ingress it
//! serves. The lookup happens once per load balancer and the result is kept for the lifetime
//! of the process; restart the shipper to pick up retagged load balancers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::SdkConfig;
use aws_sdk_elasticloadbalancingv2::error::DisplayErrorContext;
use aws_sdk_elasticloadbalancingv2::Client as ElbClient;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::{RoleMap, StaticLabels};
use crate::error::LookupError;

/// `<namespace>/<ingress>` of the ingress the load balancer belongs to.
pub const OWNERSHIP_TAG: &str = "ingress.k8s.aws/stack";
pub const CLUSTER_TAG: &str = "cluster-id";

pub const ROLE_SESSION_NAME: &str = "alb-logs-shipper";

/// Labels attached to every line shipped from one load balancer.
pub type OwnershipLabels = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ownership {
    pub namespace: String,
    pub ingress: String,
    pub cluster: Option<String>,
}

impl Ownership {
    /// Missing tags leave the corresponding values empty.
    pub fn from_tags(tags: &HashMap<String, String>) -> Result<Self, LookupError> {
        let mut ownership = Ownership::default();
        if let Some(stack) = tags.get(OWNERSHIP_TAG) {
            match stack.split('/').collect::<Vec<_>>().as_slice() {
                [namespace, ingress] if !namespace.is_empty() && !ingress.is_empty() => {
                    ownership.namespace = namespace.to_string();
                    ownership.ingress = ingress.to_string();
                }
                _ => return Err(LookupError::MalformedOwnershipTag(stack.clone())),
            }
        }
        ownership.cluster = tags.get(CLUSTER_TAG).filter(|c| !c.is_empty()).cloned();
        Ok(ownership)
    }

    /// Derived labels overlaid with the operator's static ones.
    pub fn labels(&self, static_labels: &StaticLabels) -> OwnershipLabels {
        let mut labels = OwnershipLabels::new();
        labels.insert("namespace".to_owned(), self.namespace.clone());
        labels.insert("ingress".to_owned(), self.ingress.clone());
        if let Some(cluster) = &self.cluster {
            labels.insert("cluster".to_owned(), cluster.clone());
            labels.insert("index".to_owned(), format!("{cluster}-{}", self.namespace));
        }
        for (key, value) in &static_labels.0 {
            labels.insert(key.clone(), value.clone());
        }
        labels
    }
}

#[async_trait]
pub trait TagSource: Send + Sync {
    /// Tags of the load balancer named `load_balancer` in `account_id`.
    async fn tags(
        &self,
        account_id: &str,
        load_balancer: &str,
    ) -> Result<HashMap<String, String>, LookupError>;
}

/// Looks tags up through the ELBv2 API, assuming the configured role for accounts that have one.
pub struct ElbTagSource {
    base: SdkConfig,
    roles: RoleMap,
    clients: DashMap<String, ElbClient>,
}

impl ElbTagSource {
    pub fn new(base: SdkConfig, roles: RoleMap) -> Self {
        Self {
            base,
            roles,
            clients: DashMap::new(),
        }
    }

    async fn client(&self, account_id: &str) -> ElbClient {
        if let Some(client) = self.clients.get(account_id) {
            return client.clone();
        }

        let client = match self.roles.get(account_id) {
            Some(role_arn) => {
                info!(account_id, role_arn, "assuming role for load balancer lookups");
                let provider = AssumeRoleProvider::builder(role_arn)
                    .session_name(ROLE_SESSION_NAME)
                    .configure(&self.base)
                    .build()
                    .await;
                let config = aws_sdk_elasticloadbalancingv2::config::Builder::from(&self.base)
                    .credentials_provider(provider)
                    .build();
                ElbClient::from_conf(config)
            }
            None => ElbClient::new(&self.base),
        };
        self.clients.insert(account_id.to_owned(), client.clone());
        client
    }
}

#[async_trait]
impl TagSource for ElbTagSource {
    async fn tags(
        &self,
        account_id: &str,
        load_balancer: &str,
    ) -> Result<HashMap<String, String>, LookupError> {
        let client = self.client(account_id).await;

        let described = client
            .describe_load_balancers()
            .names(load_balancer)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_load_balancer_not_found_exception())
                {
                    LookupError::NotFound(load_balancer.to_owned())
                } else {
                    LookupError::Remote(DisplayErrorContext(&err).to_string())
                }
            })?;

        let Some(arn) = described
            .load_balancers()
            .first()
            .and_then(|lb| lb.load_balancer_arn())
        else {
            return Err(LookupError::NotFound(load_balancer.to_owned()));
        };

        let described = client
            .describe_tags()
            .resource_arns(arn)
            .send()
            .await
            .map_err(|err| LookupError::Remote(DisplayErrorContext(&err).to_string()))?;

        Ok(described
            .tag_descriptions()
            .iter()
            .flat_map(|description| description.tags())
            .filter_map(|tag| {
                // the key is required by the API, the value is not
                let key: Option<&str> = tag.key().into();
                let value: Option<&str> = tag.value().into();
                Some((key?.to_owned(), value.unwrap_or_default().to_owned()))
            })
            .collect())
    }
}

/// Tags served from memory, for running the pipeline without AWS.
#[derive(Default)]
pub struct StaticTagSource {
    tags: HashMap<(String, String), HashMap<String, String>>,
    calls: AtomicUsize,
}

impl StaticTagSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_balancer(
        mut self,
        account_id: &str,
        load_balancer: &str,
        tags: &[(&str, &str)],
    ) -> Self {
        self.tags.insert(
            (account_id.to_owned(), load_balancer.to_owned()),
            tags.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    /// Number of lookups served, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagSource for StaticTagSource {
    async fn tags(
        &self,
        account_id: &str,
        load_balancer: &str,
    ) -> Result<HashMap<String, String>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tags
            .get(&(account_id.to_owned(), load_balancer.to_owned()))
            .cloned()
            .ok_or_else(|| LookupError::NotFound(load_balancer.to_owned()))
    }
}

/// Process lifetime cache of ownership labels keyed by (account id, load balancer name).
///
/// Entries are never invalidated. Two workers missing on the same key at once both look it up
/// and store the same value.
pub struct MetadataCache {
    source: Arc<dyn TagSource>,
    static_labels: StaticLabels,
    entries: DashMap<(String, String), OwnershipLabels>,
}

impl MetadataCache {
    pub fn new(source: Arc<dyn TagSource>, static_labels: StaticLabels) -> Self {
        Self {
            source,
            static_labels,
            entries: DashMap::new(),
        }
    }

    pub async fn resolve(
        &self,
        account_id: &str,
        load_balancer: &str,
    ) -> Result<OwnershipLabels, LookupError> {
        let key = (account_id.to_owned(), load_balancer.to_owned());
        if let Some(labels) = self.entries.get(&key) {
            return Ok(labels.clone());
        }

        let tags = self.source.tags(account_id, load_balancer).await?;
        let labels = Ownership::from_tags(&tags)?.labels(&self.static_labels);
        debug!(account_id, load_balancer, ?labels, "resolved load balancer labels");

        self.entries.insert(key, labels.clone());
        Ok(labels)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
