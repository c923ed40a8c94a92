pub mod reference;
pub mod workflow;
