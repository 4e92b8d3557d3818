//! Actions on the grid: building them from keyword requests, checking
//! their consistency, combining them and describing their effect.

mod ambiguity;
mod base;
mod combine;
mod error;
mod impact;
mod space;
mod update;

pub use base::{ActionRecord, BaseAction, Effect, ElementRef, Injection, Modified};
pub use error::{ActionError, AmbiguousAction, IllegalAction};
pub use impact::{
    ActionImpact, BusChange, ForceLineImpact, GenRedispatch, InjectionChange, InjectionImpact,
    LineList, RedispatchImpact, StorageChange, StorageImpact, TopologicalImpact, TopologyImpact,
};
pub use space::{ActionProfile, ActionSpace};
pub use update::{
    ActionUpdate, BusSelection, ChangeBus, ElementKey, InjectionUpdate, SetBus, Toggle, Values,
};
