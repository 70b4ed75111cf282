// Domain layer - Core export types and naming rules

pub mod model;
pub mod naming;
