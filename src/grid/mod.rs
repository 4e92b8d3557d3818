//! Grid description: substations, elements and their place in the
//! topology vector.

mod objects;
pub mod presets;
mod types;

pub use objects::{GridDescription, GridObjects};
pub use types::{
    ConnectedObjects, GenType, GeneratorData, GridError, NominalInjections, ObjectType,
    StorageData, TopoObject,
};
