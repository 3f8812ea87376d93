// Domain layer: models, manifest document and ports (interfaces).

pub mod manifest;
pub mod model;
pub mod ports;
