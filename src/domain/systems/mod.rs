// Pure per-tick rules: local movement, reconciliation, and remote interpolation.

pub mod interpolation;
pub mod movement;
pub mod reconciliation;
