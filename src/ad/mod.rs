pub mod decision;
pub mod pod;
pub mod slate;
pub mod vast;

pub use decision::DecisionEngine;
pub use pod::{InMemoryPodStore, PodStore};
pub use slate::SlateProvider;
