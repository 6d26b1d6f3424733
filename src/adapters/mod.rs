// Adapters layer: concrete implementations for external systems (inference servers).

pub mod ollama;
