//! Swarm 层：专长、Agent、集群配置与生成

pub mod agent;
pub mod cluster;
pub mod configurator;
pub mod spawner;
pub mod specialization;

pub use agent::{Agent, AgentId, AgentStatus, ResourceUsage};
pub use cluster::{ClusterId, SwarmCluster};
pub use configurator::{
    AgentRequirement, CoordinationMode, SafetyLevel, SwarmConfiguration, SwarmConfigurator,
};
pub use spawner::ClusterSpawner;
pub use specialization::{DisplayMeta, PolicyTemplate, Specialization};
