// Domain layer: core models, ports (interfaces) and the built-in scenario catalogue.

pub mod model;
pub mod ports;
pub mod scenarios;
