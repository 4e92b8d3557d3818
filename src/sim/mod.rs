//! The environment and everything it steps: redispatching, storage, the
//! copper-plate backend, game rules, rewards and agents.

pub mod agent;
pub mod backend;
mod builder;
mod env;
/// Episode summary computed from step records.
pub mod kpi;
mod multi_env;
pub mod redispatch;
pub mod reward;
pub mod rules;
pub mod storage;
pub mod types;

pub use agent::{Agent, AgentKind, DoNothingAgent, RandomRedispatchAgent, ScriptedAgent};
pub use backend::{Backend, BackendError, CopperPlate};
pub use builder::{EnvBuilder, make};
pub use env::{EnvError, Environment};
pub use kpi::EpisodeSummary;
pub use multi_env::{MultiEnvError, MultiEnvironment};
pub use redispatch::{RedispatchError, Redispatcher};
pub use reward::{EconomicReward, FlatReward, RedispReward, Reward, RewardKind};
pub use rules::GameRules;
pub use storage::StorageState;
pub use types::{EnvParameters, Observation, StepInfo, StepOutcome, StepRecord};
