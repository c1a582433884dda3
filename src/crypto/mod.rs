mod engine;

pub use engine::Vault;
