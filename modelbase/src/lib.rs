pub mod batch;
pub mod error;
pub mod migration;
pub mod object;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod system_db;
pub mod validation;
pub mod value;
pub mod workflow;

pub use batch::{BatchReport, Mutation};
pub use error::{ModelbaseError, Result};
pub use object::DataObject;
pub use registry::{Model, ModelRegistry, PropertyType};
pub use store::{ObjectInput, ObjectUpdate, Store};
pub use value::RawValue;
pub use workflow::{Workflow, WorkflowSet};
